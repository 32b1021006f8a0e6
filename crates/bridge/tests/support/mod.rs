//! In-memory fakes for the gateway and conversation-source seams.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    threadmirror_bridge::{
        ChatGateway, ConversationSource, FilePayload, QuestionOutcome, QuestionRequest,
        RankedConversation, ThreadSnapshot,
    },
    threadmirror_common::{Error, Result},
};

#[derive(Debug, Clone)]
pub struct FakeThread {
    pub name: String,
    pub archived: bool,
    pub auto_archive_minutes: u16,
}

#[derive(Default)]
pub struct GatewayState {
    next_thread: u32,
    pub threads: HashMap<String, FakeThread>,
    /// Thread ids the service reports as gone.
    pub missing: HashSet<String>,
    pub posts: Vec<(String, String)>,
    pub renames: Vec<(String, String)>,
    pub invites: Vec<(String, String)>,
    pub unarchived: Vec<String>,
    pub archived_calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeGateway {
    pub state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pre-seed a thread under a known id.
    pub fn add_thread(&self, id: &str, name: &str, archived: bool) {
        let mut state = self.state.lock().unwrap();
        state.threads.insert(
            id.to_string(),
            FakeThread {
                name: name.to_string(),
                archived,
                auto_archive_minutes: 10_080,
            },
        );
    }

    pub fn mark_missing(&self, id: &str) {
        self.state.lock().unwrap().missing.insert(id.to_string());
    }

    pub fn thread(&self, id: &str) -> Option<FakeThread> {
        self.state.lock().unwrap().threads.get(id).cloned()
    }

    pub fn rename_count(&self) -> usize {
        self.state.lock().unwrap().renames.len()
    }

    pub fn unarchive_count(&self) -> usize {
        self.state.lock().unwrap().unarchived.len()
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    fn is_connected(&self) -> bool {
        true
    }

    async fn create_thread(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_thread += 1;
        let id = format!("T{}", state.next_thread);
        state.threads.insert(
            id.clone(),
            FakeThread {
                name: name.to_string(),
                archived: false,
                auto_archive_minutes: 10_080,
            },
        );
        Ok(id)
    }

    async fn post_to_thread(&self, thread_id: &str, text: &str, _as_embed: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.posts.push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_file_to_thread(&self, _thread_id: &str, _file: FilePayload) -> Result<()> {
        Ok(())
    }

    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.missing.contains(thread_id) {
            return Err(Error::not_found(format!("thread {thread_id}")));
        }
        let Some(thread) = state.threads.get_mut(thread_id) else {
            return Err(Error::not_found(format!("thread {thread_id}")));
        };
        if thread.name != name {
            thread.name = name.to_string();
            state
                .renames
                .push((thread_id.to_string(), name.to_string()));
        }
        Ok(())
    }

    async fn archive_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.archived_calls.push(thread_id.to_string());
        if let Some(thread) = state.threads.get_mut(thread_id) {
            thread.archived = true;
        }
        Ok(())
    }

    async fn unarchive_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.unarchived.push(thread_id.to_string());
        if let Some(thread) = state.threads.get_mut(thread_id) {
            thread.archived = false;
        }
        Ok(())
    }

    async fn thread_snapshot(&self, thread_id: &str) -> Result<Option<ThreadSnapshot>> {
        let state = self.state.lock().unwrap();
        if state.missing.contains(thread_id) {
            return Ok(None);
        }
        Ok(state.threads.get(thread_id).map(|t| ThreadSnapshot {
            id: thread_id.to_string(),
            name: t.name.clone(),
            archived: t.archived,
            auto_archive_minutes: t.auto_archive_minutes,
        }))
    }

    async fn invite_user(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .invites
            .push((thread_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn start_typing(&self, _thread_id: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_typing(&self, _thread_id: &str) {}

    async fn ask_question(&self, _request: QuestionRequest) -> Result<QuestionOutcome> {
        Err(Error::Timeout)
    }
}

#[derive(Default)]
pub struct SourceState {
    pub ids: Vec<String>,
    pub names: HashMap<String, String>,
    pub archived: HashSet<String>,
    pub ranked: Vec<RankedConversation>,
}

#[derive(Default)]
pub struct FakeSource {
    pub state: Mutex<SourceState>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_conversation(&self, id: &str, name: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.ids.push(id.to_string());
        if let Some(name) = name {
            state.names.insert(id.to_string(), name.to_string());
        }
    }

    pub fn set_name(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .names
            .insert(id.to_string(), name.to_string());
    }

    pub fn set_archived(&self, id: &str, archived: bool) {
        let mut state = self.state.lock().unwrap();
        if archived {
            state.archived.insert(id.to_string());
        } else {
            state.archived.remove(id);
        }
    }

    pub fn set_ranked(&self, ranked: Vec<RankedConversation>) {
        self.state.lock().unwrap().ranked = ranked;
    }
}

#[async_trait]
impl ConversationSource for FakeSource {
    async fn all_ids(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().ids.clone())
    }

    async fn name(&self, conversation_id: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .names
            .get(conversation_id)
            .cloned())
    }

    async fn all_names(&self) -> Result<HashMap<String, String>> {
        Ok(self.state.lock().unwrap().names.clone())
    }

    async fn archived_ids(&self) -> Result<HashSet<String>> {
        Ok(self.state.lock().unwrap().archived.clone())
    }

    async fn active_ranked_by_recency(&self) -> Result<Vec<RankedConversation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ranked
            .iter()
            .map(|r| RankedConversation {
                conversation_id: r.conversation_id.clone(),
                last_updated_at: r.last_updated_at,
                position: r.position,
            })
            .collect())
    }
}

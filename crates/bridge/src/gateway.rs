//! The chat-gateway seam.
//!
//! The control plane only ever talks to Discord through this trait; the
//! serenity-backed implementation lives in `threadmirror-discord`, and the
//! scenario tests run against an in-memory fake.

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    threadmirror_common::Result,
};

/// A guild visible to the bot.
#[derive(Debug, Clone)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
}

/// A channel or category inside a guild.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// Point-in-time view of a thread, as the chat service reports it.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub id: String,
    pub name: String,
    pub archived: bool,
    /// Auto-archive duration in minutes, as carried by the thread itself.
    pub auto_archive_minutes: u16,
}

/// File payload for `sendFileToThread`.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub bytes: Vec<u8>,
    pub name: String,
    pub description: Option<String>,
}

/// One selectable option of an interactive question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
}

/// An interactive prompt posted into a thread.
#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub thread_id: String,
    pub question: String,
    pub options: Vec<QuestionOption>,
    pub allow_multiple: bool,
    pub timeout: Duration,
}

impl QuestionRequest {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
}

/// How a question was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionResponseType {
    /// One or more option buttons.
    Option,
    /// A free-text reply in the thread.
    Text,
}

/// The single resolution of an interactive question.
#[derive(Debug, Clone)]
pub struct QuestionOutcome {
    pub response_type: QuestionResponseType,
    pub selected_option_ids: Vec<String>,
    pub text_response: Option<String>,
}

/// Wire-level chat operations the control plane needs.
///
/// Implementations own the connection state; every operation fails with
/// `Error::NotConnected` when no gateway session is live.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Create a public thread with the service-side defaults (7-day
    /// auto-archive) in the configured channel. Returns the thread id.
    async fn create_thread(&self, name: &str) -> Result<String>;

    /// Post `text` into a thread. The implementation applies chunking and
    /// the ping-prefix policy, and records outbound activity.
    async fn post_to_thread(&self, thread_id: &str, text: &str, as_embed: bool) -> Result<()>;

    async fn send_file_to_thread(&self, thread_id: &str, file: FilePayload) -> Result<()>;

    /// Rename a thread. No-op when the name is already equal; names are
    /// truncated to the service limit before the call goes out.
    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<()>;

    async fn archive_thread(&self, thread_id: &str) -> Result<()>;

    async fn unarchive_thread(&self, thread_id: &str) -> Result<()>;

    /// `Ok(None)` means the thread is definitively gone; `Err` means the
    /// service could not be asked (treat as unknown).
    async fn thread_snapshot(&self, thread_id: &str) -> Result<Option<ThreadSnapshot>>;

    /// Add a user to a thread's member list.
    async fn invite_user(&self, thread_id: &str, user_id: &str) -> Result<()>;

    async fn start_typing(&self, thread_id: &str) -> Result<()>;

    /// Idempotent; stopping a thread with no active indicator succeeds.
    async fn stop_typing(&self, thread_id: &str);

    /// Post an interactive prompt and await its single resolution.
    async fn ask_question(&self, request: QuestionRequest) -> Result<QuestionOutcome>;
}

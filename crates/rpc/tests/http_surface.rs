//! RPC surface tests: wire shapes, preflight policy, and the strict
//! thread-id rule.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    },
    serde_json::{Value, json},
    threadmirror_actuator::{Actuator, KeystrokeDriver},
    threadmirror_bridge::{
        ChatGateway, ConversationSource, FilePayload, PendingComposer, QuestionOutcome,
        QuestionRequest, RankedConversation, ThreadResolver, ThreadService, ThreadSnapshot,
    },
    threadmirror_common::{Error, Result},
    threadmirror_config::{GlobalConfig, ProjectConfig},
    threadmirror_rpc::{AppState, router},
    threadmirror_state::{Mapping, MappingRegistry, StateStore},
    tower::ServiceExt,
};

#[derive(Default)]
struct RecordingGateway {
    posts: Mutex<Vec<(String, String)>>,
    files: Mutex<Vec<(String, String)>>,
    renames: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    fn is_connected(&self) -> bool {
        true
    }

    async fn create_thread(&self, _name: &str) -> Result<String> {
        Ok("T_new".to_string())
    }

    async fn post_to_thread(&self, thread_id: &str, text: &str, _as_embed: bool) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_file_to_thread(&self, thread_id: &str, file: FilePayload) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .push((thread_id.to_string(), file.name));
        Ok(())
    }

    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<()> {
        self.renames
            .lock()
            .unwrap()
            .push((thread_id.to_string(), name.to_string()));
        Ok(())
    }

    async fn archive_thread(&self, _thread_id: &str) -> Result<()> {
        Ok(())
    }

    async fn unarchive_thread(&self, _thread_id: &str) -> Result<()> {
        Ok(())
    }

    async fn thread_snapshot(&self, _thread_id: &str) -> Result<Option<ThreadSnapshot>> {
        Ok(None)
    }

    async fn invite_user(&self, _thread_id: &str, _user_id: &str) -> Result<()> {
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

struct EmptySource;

#[async_trait]
impl ConversationSource for EmptySource {
    async fn all_ids(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn name(&self, _conversation_id: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn all_names(&self) -> Result<std::collections::HashMap<String, String>> {
        Ok(std::collections::HashMap::new())
    }
    async fn archived_ids(&self) -> Result<std::collections::HashSet<String>> {
        Ok(std::collections::HashSet::new())
    }
    async fn active_ranked_by_recency(&self) -> Result<Vec<RankedConversation>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingDriver {
    pasted: Mutex<Vec<String>>,
}

#[async_trait]
impl KeystrokeDriver for RecordingDriver {
    async fn focus_window(&self, _label: &str) -> Result<()> {
        Ok(())
    }
    async fn open_conversation(&self, _conversation_id: &str) -> Result<()> {
        Ok(())
    }
    async fn focus_composer_input(&self) -> Result<()> {
        Ok(())
    }
    async fn paste(&self, text: &str) -> Result<()> {
        self.pasted.lock().unwrap().push(text.to_string());
        Ok(())
    }
    async fn press_enter(&self) -> Result<()> {
        Ok(())
    }
}

struct Fixture {
    state: AppState,
    gateway: Arc<RecordingGateway>,
    registry: MappingRegistry,
}

async fn fixture() -> Fixture {
    let gateway = Arc::new(RecordingGateway::default());
    let store = Arc::new(StateStore::open_in_memory().await.unwrap());
    let registry = MappingRegistry::new(Arc::clone(&store));
    let source = Arc::new(EmptySource);
    let threads = Arc::new(ThreadService::new(
        gateway.clone(),
        registry.clone(),
        store,
        GlobalConfig::default(),
        "demo",
    ));
    let resolver = Arc::new(ThreadResolver::new(
        source,
        Arc::clone(&threads),
        registry.clone(),
        Arc::new(PendingComposer::new()),
    ));
    let state = AppState {
        gateway: gateway.clone(),
        resolver,
        threads,
        actuator: Arc::new(Actuator::new(Box::new(RecordingDriver::default()), "demo")),
        reconnector: None,
        workspace_folders: vec!["/home/u/demo".to_string()],
        workspace_name: "demo".to_string(),
        global_config: GlobalConfig::default(),
        project_config: ProjectConfig::default(),
        setup_required: false,
    };
    Fixture {
        state,
        gateway,
        registry,
    }
}

async fn call(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_workspace_and_connection() {
    let fx = fixture().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(fx.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["workspaceFolders"][0], json!("/home/u/demo"));
    assert_eq!(body["discordConnected"], json!(true));
}

#[tokio::test]
async fn get_active_thread_claims_latest_unclaimed() {
    let fx = fixture().await;
    fx.registry
        .put(Mapping::new("C1", "T1", "demo"))
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/api/get-active-thread-id")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(fx.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["threadId"], json!("T1"));
    assert_eq!(body["chatId"], json!("C1"));
    assert_eq!(body["method"], json!("latest_unclaimed"));

    assert!(
        fx.registry
            .get("C1")
            .await
            .unwrap()
            .unwrap()
            .claimed_at
            .is_some()
    );
}

#[tokio::test]
async fn post_to_thread_requires_thread_id() {
    let fx = fixture().await;
    let (status, body) = call(
        fx.state,
        post_json("/api/post-to-thread", json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("threadId"));
    assert!(fx.gateway.posts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn post_to_thread_delivers() {
    let fx = fixture().await;
    let (status, body) = call(
        fx.state,
        post_json(
            "/api/post-to-thread",
            json!({ "threadId": "T9", "message": "done" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        fx.gateway.posts.lock().unwrap().as_slice(),
        &[("T9".to_string(), "done".to_string())]
    );
}

#[tokio::test]
async fn typing_without_thread_id_is_noop_success() {
    let fx = fixture().await;
    let (status, body) = call(fx.state, post_json("/api/start-typing", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["noop"], json!(true));
}

#[tokio::test]
async fn rename_thread_requires_both_parameters() {
    let fx = fixture().await;
    let (status, _) = call(
        fx.state.clone(),
        post_json("/api/rename-thread", json!({ "threadId": "T1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        fx.state,
        post_json(
            "/api/rename-thread",
            json!({ "threadId": "T1", "name": "Renamed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        fx.gateway.renames.lock().unwrap().as_slice(),
        &[("T1".to_string(), "Renamed".to_string())]
    );
}

#[tokio::test]
async fn send_file_accepts_base64_payload() {
    let fx = fixture().await;
    let (status, body) = call(
        fx.state,
        post_json(
            "/api/send-file-to-thread",
            json!({
                "threadId": "T1",
                "fileContentBase64": "aGVsbG8=",
                "fileName": "hello.txt",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        fx.gateway.files.lock().unwrap().as_slice(),
        &[("T1".to_string(), "hello.txt".to_string())]
    );
}

#[tokio::test]
async fn send_file_refuses_missing_local_path() {
    let fx = fixture().await;
    let (status, body) = call(
        fx.state,
        post_json(
            "/api/send-file-to-thread",
            json!({ "threadId": "T1", "filePath": "/definitely/not/here.bin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("fileContentBase64"));
}

#[tokio::test]
async fn forward_user_prompt_posts_formatted_message() {
    let fx = fixture().await;
    let (_, body) = call(
        fx.state,
        post_json(
            "/api/forward-user-prompt",
            json!({ "threadId": "T1", "prompt": "run the tests" }),
        ),
    )
    .await;
    assert_eq!(body["success"], json!(true));
    let posts = fx.gateway.posts.lock().unwrap();
    assert!(posts[0].1.contains("User prompt"));
    assert!(posts[0].1.contains("> run the tests"));
}

#[tokio::test]
async fn message_endpoint_drives_the_actuator() {
    let fx = fixture().await;
    let (status, body) = call(
        fx.state,
        post_json(
            "/message",
            json!({
                "conversationId": "C1",
                "message": "ship it",
                "threadId": "T1",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn create_thread_returns_mapping() {
    let fx = fixture().await;
    let (status, body) = call(
        fx.state,
        post_json(
            "/api/create-thread",
            json!({ "conversationId": "C7", "name": "Build cache" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["threadId"], json!("T_new"));
    assert_eq!(
        fx.registry.get("C7").await.unwrap().unwrap().thread_id,
        "T_new"
    );
}

//! Loopback HTTP surface for the tool-protocol adapter.
//!
//! Binds the first free port in the discovery range on 127.0.0.1. Every
//! thread-addressed operation requires an explicit `threadId` — there is no
//! "current thread" fallback, which keeps concurrent agents from posting
//! into each other's threads.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    base64::Engine,
    serde::Deserialize,
    serde_json::json,
    threadmirror_actuator::Actuator,
    threadmirror_bridge::{
        ChatGateway, FilePayload, QuestionOption, QuestionRequest, ThreadResolver, ThreadService,
    },
    threadmirror_common::{Error, Result},
    threadmirror_config::{GlobalConfig, ProjectConfig},
    tokio::net::TcpListener,
    tower_http::cors::{Any, CorsLayer},
    tracing::{info, warn},
};

/// First port probed by adapters.
pub const PORT_RANGE_START: u16 = 19876;

/// Number of ports in the discovery range.
pub const PORT_RANGE_LEN: u16 = 10;

/// Re-establishes the gateway session from the stored credential.
#[async_trait::async_trait]
pub trait Reconnector: Send + Sync {
    async fn reconnect(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn ChatGateway>,
    pub resolver: Arc<ThreadResolver>,
    pub threads: Arc<ThreadService>,
    pub actuator: Arc<Actuator>,
    pub reconnector: Option<Arc<dyn Reconnector>>,
    pub workspace_folders: Vec<String>,
    pub workspace_name: String,
    pub global_config: GlobalConfig,
    pub project_config: ProjectConfig,
    /// No bot credential stored yet; `/health` reports `setup-required`.
    pub setup_required: bool,
}

/// Bind the first free port in the discovery range.
pub async fn bind_loopback() -> Result<(TcpListener, u16)> {
    for port in PORT_RANGE_START..PORT_RANGE_START + PORT_RANGE_LEN {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                info!(port, "rpc surface bound");
                return Ok((listener, port));
            },
            Err(e) => {
                warn!(port, error = %e, "port taken; trying next");
            },
        }
    }
    Err(Error::invalid_input(format!(
        "no free port in [{PORT_RANGE_START}, {})",
        PORT_RANGE_START + PORT_RANGE_LEN
    )))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/config", get(config_handler))
        .route("/api/get-active-thread-id", get(get_active_thread_handler))
        .route("/api/post-to-thread", post(post_to_thread_handler))
        .route("/api/send-file-to-thread", post(send_file_handler))
        .route("/api/start-typing", post(start_typing_handler))
        .route("/api/stop-typing", post(stop_typing_handler))
        .route("/api/create-thread", post(create_thread_handler))
        .route("/api/rename-thread", post(rename_thread_handler))
        .route("/api/forward-user-prompt", post(forward_user_prompt_handler))
        .route("/api/ask-question", post(ask_question_handler))
        .route("/api/reconnect", post(reconnect_handler))
        .route("/message", post(message_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve until the listener is torn down.
pub async fn serve(state: AppState, listener: TcpListener) -> Result<()> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::external("rpc server", e))
}

// ── Response helpers ────────────────────────────────────────────────────────

fn ok_json(value: serde_json::Value) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

/// Domain failures are HTTP 200 with `success:false`; only malformed
/// requests get a 4xx and only unexpected faults a 5xx.
fn domain_error(e: &Error) -> Response {
    ok_json(json!({
        "success": false,
        "error": e.to_string(),
        "permissionError": e.is_permission(),
    }))
}

fn preflight_error(name: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": format!("missing required parameter: {name}"),
        })),
    )
        .into_response()
}

fn require(value: Option<&str>, name: &str) -> std::result::Result<String, Response> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(preflight_error(name)),
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Response {
    let status = if state.setup_required {
        "setup-required"
    } else {
        "ok"
    };
    ok_json(json!({
        "status": status,
        "workspaceFolders": state.workspace_folders,
        "workspaceName": state.workspace_name,
        "discordConnected": state.gateway.is_connected(),
    }))
}

async fn config_handler(State(state): State<AppState>) -> Response {
    ok_json(json!({
        "success": true,
        "workspaceName": state.workspace_name,
        "guildId": state.global_config.guild_id,
        "channelId": state.project_config.channel_id,
        "channelName": state.project_config.channel_name,
        "messagePingMode": state.global_config.message_ping_mode,
        "threadCreationNotify": state.global_config.thread_creation_notify,
    }))
}

async fn get_active_thread_handler(State(state): State<AppState>) -> Response {
    match state.resolver.resolve().await {
        Ok(resolution) => ok_json(json!({
            "success": true,
            "threadId": resolution.mapping.thread_id,
            "chatId": resolution.mapping.conversation_id,
            "method": resolution.method,
        })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PostToThreadRequest {
    thread_id: Option<String>,
    message: Option<String>,
    as_embed: bool,
}

async fn post_to_thread_handler(
    State(state): State<AppState>,
    Json(req): Json<PostToThreadRequest>,
) -> Response {
    let thread_id = match require(req.thread_id.as_deref(), "threadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = match require(req.message.as_deref(), "message") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state
        .gateway
        .post_to_thread(&thread_id, &message, req.as_embed)
        .await
    {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SendFileRequest {
    thread_id: Option<String>,
    file_path: Option<String>,
    file_content_base64: Option<String>,
    file_name: Option<String>,
    description: Option<String>,
}

async fn send_file_handler(
    State(state): State<AppState>,
    Json(req): Json<SendFileRequest>,
) -> Response {
    let thread_id = match require(req.thread_id.as_deref(), "threadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Base64 payloads win: when the adapter runs on another host, the path
    // in the request is not our path and must never be dereferenced.
    let (bytes, default_name) = if let Some(encoded) = req.file_content_base64.as_deref() {
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => (bytes, "file".to_string()),
            Err(e) => return domain_error(&Error::invalid_input(format!("bad base64: {e}"))),
        }
    } else if let Some(path) = req.file_path.as_deref() {
        let path = std::path::Path::new(path);
        if !path.exists() {
            return domain_error(&Error::not_found(format!(
                "file does not exist locally: {} (remote adapters must send fileContentBase64)",
                path.display()
            )));
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                (bytes, name)
            },
            Err(e) => return domain_error(&Error::from(e)),
        }
    } else {
        return preflight_error("filePath or fileContentBase64");
    };

    let payload = FilePayload {
        bytes,
        name: req.file_name.unwrap_or(default_name),
        description: req.description,
    };
    match state.gateway.send_file_to_thread(&thread_id, payload).await {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TypingRequest {
    thread_id: Option<String>,
}

async fn start_typing_handler(
    State(state): State<AppState>,
    Json(req): Json<TypingRequest>,
) -> Response {
    // Without a thread id this is a no-op success, not an error.
    let Some(thread_id) = req.thread_id.filter(|t| !t.trim().is_empty()) else {
        return ok_json(json!({ "success": true, "noop": true }));
    };
    match state.gateway.start_typing(&thread_id).await {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

async fn stop_typing_handler(
    State(state): State<AppState>,
    Json(req): Json<TypingRequest>,
) -> Response {
    let Some(thread_id) = req.thread_id.filter(|t| !t.trim().is_empty()) else {
        return ok_json(json!({ "success": true, "noop": true }));
    };
    state.gateway.stop_typing(&thread_id).await;
    ok_json(json!({ "success": true }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CreateThreadRequest {
    conversation_id: Option<String>,
    name: Option<String>,
}

async fn create_thread_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateThreadRequest>,
) -> Response {
    let conversation_id = match require(req.conversation_id.as_deref(), "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require(req.name.as_deref(), "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state
        .threads
        .create_thread_for_conversation(&conversation_id, &name)
        .await
    {
        Ok(mapping) => ok_json(json!({
            "success": true,
            "threadId": mapping.thread_id,
            "chatId": mapping.conversation_id,
        })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RenameThreadRequest {
    thread_id: Option<String>,
    name: Option<String>,
}

async fn rename_thread_handler(
    State(state): State<AppState>,
    Json(req): Json<RenameThreadRequest>,
) -> Response {
    let thread_id = match require(req.thread_id.as_deref(), "threadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require(req.name.as_deref(), "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.gateway.rename_thread(&thread_id, &name).await {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ForwardUserPromptRequest {
    thread_id: Option<String>,
    prompt: Option<String>,
}

/// Distinctive rendering for prompts the user typed into the IDE.
fn format_user_prompt(prompt: &str) -> String {
    format!("🧭 **User prompt**\n> {}", prompt.replace('\n', "\n> "))
}

async fn forward_user_prompt_handler(
    State(state): State<AppState>,
    Json(req): Json<ForwardUserPromptRequest>,
) -> Response {
    let thread_id = match require(req.thread_id.as_deref(), "threadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let prompt = match require(req.prompt.as_deref(), "prompt") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state
        .gateway
        .post_to_thread(&thread_id, &format_user_prompt(&prompt), false)
        .await
    {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AskQuestionRequest {
    thread_id: Option<String>,
    question: Option<String>,
    options: Vec<QuestionOption>,
    allow_multiple: bool,
    timeout_ms: Option<u64>,
}

async fn ask_question_handler(
    State(state): State<AppState>,
    Json(req): Json<AskQuestionRequest>,
) -> Response {
    let thread_id = match require(req.thread_id.as_deref(), "threadId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let question = match require(req.question.as_deref(), "question") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = QuestionRequest {
        thread_id,
        question,
        options: req.options,
        allow_multiple: req.allow_multiple,
        timeout: req
            .timeout_ms
            .map_or(QuestionRequest::DEFAULT_TIMEOUT, Duration::from_millis),
    };
    match state.gateway.ask_question(request).await {
        Ok(outcome) => ok_json(json!({
            "success": true,
            "responseType": outcome.response_type,
            "selectedOptionIds": outcome.selected_option_ids,
            "textResponse": outcome.text_response,
        })),
        Err(e) => domain_error(&e),
    }
}

async fn reconnect_handler(State(state): State<AppState>) -> Response {
    let Some(reconnector) = state.reconnector.as_ref() else {
        return domain_error(&Error::invalid_input("no credential stored"));
    };
    match reconnector.reconnect().await {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MessageRequest {
    conversation_id: Option<String>,
    message: Option<String>,
    thread_id: Option<String>,
}

async fn message_handler(
    State(state): State<AppState>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let conversation_id = match require(req.conversation_id.as_deref(), "conversationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = match require(req.message.as_deref(), "message") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state
        .actuator
        .deliver(&conversation_id, &message, req.thread_id.as_deref())
        .await
    {
        Ok(()) => ok_json(json!({ "success": true })),
        Err(e) => domain_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_format_quotes_every_line() {
        let formatted = format_user_prompt("first\nsecond");
        assert!(formatted.contains("**User prompt**"));
        assert!(formatted.contains("> first"));
        assert!(formatted.contains("> second"));
    }

    #[test]
    fn require_rejects_blank_values() {
        assert!(require(Some("  "), "threadId").is_err());
        assert!(require(None, "threadId").is_err());
        assert_eq!(require(Some("T1"), "threadId").unwrap(), "T1");
    }
}

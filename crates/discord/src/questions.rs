//! Interactive questions posted into threads.
//!
//! A question is a message with one button per option (plus Submit in
//! multi-select mode) that resolves exactly once: on a button click, on a
//! free-text reply in the same thread, or on timeout. The registry mutex
//! guards the open-question table, so the sink and timer are cleared
//! atomically.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use {
    serenity::{
        all::{
            ButtonStyle, ComponentInteraction, CreateActionRow, CreateButton,
            CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
            EditMessage, MessageId,
        },
        http::Http,
        model::id::ChannelId,
    },
    threadmirror_bridge::{QuestionOption, QuestionOutcome, QuestionRequest, QuestionResponseType},
    threadmirror_common::{Error, Result},
    tokio::sync::{Mutex, oneshot},
    tracing::{debug, info, warn},
};

use crate::errors::map_api_err;

/// Custom-id namespace for question buttons.
const CUSTOM_ID_PREFIX: &str = "q";

/// Discord rejects more than five rows of five buttons; one slot is kept
/// for Submit.
const MAX_OPTIONS: usize = 24;

const BUTTON_LABEL_LIMIT: usize = 80;

enum QuestionResolution {
    Answered(QuestionOutcome),
    TimedOut,
}

struct OpenQuestion {
    thread_id: String,
    channel: ChannelId,
    question: String,
    options: Vec<QuestionOption>,
    allow_multiple: bool,
    selected: HashSet<String>,
    sink: oneshot::Sender<QuestionResolution>,
    timeout: tokio::task::JoinHandle<()>,
    http: Arc<Http>,
}

/// Tracks every open question, keyed by the prompt's message id.
#[derive(Default)]
pub struct InteractionManager {
    open: Mutex<HashMap<u64, OpenQuestion>>,
}

impl InteractionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a question and await its single resolution.
    pub async fn ask(
        self: Arc<Self>,
        http: Arc<Http>,
        request: QuestionRequest,
    ) -> Result<QuestionOutcome> {
        if request.options.is_empty() {
            return Err(Error::invalid_input("a question needs at least one option"));
        }
        if request.options.len() > MAX_OPTIONS {
            return Err(Error::invalid_input(format!(
                "too many options: {} (max {MAX_OPTIONS})",
                request.options.len()
            )));
        }
        let channel = parse_channel(&request.thread_id)?;

        // Post a placeholder first: the buttons embed their own message id
        // so the component handler can route back without extra state.
        let placeholder = channel
            .send_message(&http, CreateMessage::new().content("…"))
            .await
            .map_err(|e| map_api_err("question post", e))?;
        let mid = placeholder.id;

        let content = render_open(&request.question, &request.options, request.allow_multiple);
        let components = build_buttons(
            mid.get(),
            &request.options,
            &HashSet::new(),
            request.allow_multiple,
            true,
        );
        channel
            .edit_message(
                &http,
                mid,
                EditMessage::new().content(content).components(components),
            )
            .await
            .map_err(|e| map_api_err("question render", e))?;

        let (tx, rx) = oneshot::channel();
        let timeout = {
            let manager = Arc::clone(&self);
            let timeout = request.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                manager.expire(mid.get()).await;
            })
        };

        {
            let mut open = self.open.lock().await;
            open.insert(
                mid.get(),
                OpenQuestion {
                    thread_id: request.thread_id.clone(),
                    channel,
                    question: request.question.clone(),
                    options: request.options.clone(),
                    allow_multiple: request.allow_multiple,
                    selected: HashSet::new(),
                    sink: tx,
                    timeout,
                    http: Arc::clone(&http),
                },
            );
        }
        info!(thread_id = %request.thread_id, message_id = mid.get(), "question posted");

        match rx.await {
            Ok(QuestionResolution::Answered(outcome)) => Ok(outcome),
            Ok(QuestionResolution::TimedOut) | Err(_) => Err(Error::Timeout),
        }
    }

    /// Route a button interaction whose custom id carries our prefix.
    pub async fn handle_component(&self, http: &Arc<Http>, interaction: &ComponentInteraction) {
        let custom_id = interaction.data.custom_id.as_str();
        let Some(rest) = custom_id.strip_prefix(&format!("{CUSTOM_ID_PREFIX}:")) else {
            return;
        };
        let Some((mid_str, action)) = rest.split_once(':') else {
            return;
        };
        let Ok(mid) = mid_str.parse::<u64>() else {
            return;
        };

        let mut open = self.open.lock().await;
        let Some(question) = open.get_mut(&mid) else {
            drop(open);
            let _ = interaction
                .create_response(http, ephemeral("This question has expired."))
                .await;
            return;
        };

        if action == "submit" {
            if !question.allow_multiple || question.selected.is_empty() {
                drop(open);
                let _ = interaction
                    .create_response(http, ephemeral("Select at least one option first."))
                    .await;
                return;
            }
            let Some(question) = open.remove(&mid) else {
                return;
            };
            drop(open);
            let selected = ordered_selection(&question.options, &question.selected);
            let response = CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .content(render_answered(
                        &question.question,
                        &question.options,
                        &question.selected,
                    ))
                    .components(Vec::new()),
            );
            let _ = interaction.create_response(http, response).await;
            resolve(
                question,
                QuestionOutcome {
                    response_type: QuestionResponseType::Option,
                    selected_option_ids: selected,
                    text_response: None,
                },
            );
            return;
        }

        if !question.options.iter().any(|o| o.id == action) {
            drop(open);
            let _ = interaction
                .create_response(http, ephemeral("Unknown option."))
                .await;
            return;
        }

        if question.allow_multiple {
            // Toggle and re-render in place; resolution waits for Submit.
            if !question.selected.remove(action) {
                question.selected.insert(action.to_string());
            }
            let response = CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new().components(build_buttons(
                    mid,
                    &question.options,
                    &question.selected,
                    true,
                    true,
                )),
            );
            drop(open);
            let _ = interaction.create_response(http, response).await;
            return;
        }

        let Some(question) = open.remove(&mid) else {
            return;
        };
        drop(open);
        let selected: HashSet<String> = std::iter::once(action.to_string()).collect();
        let response = CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .content(render_answered(
                    &question.question,
                    &question.options,
                    &selected,
                ))
                .components(Vec::new()),
        );
        let _ = interaction.create_response(http, response).await;
        resolve(
            question,
            QuestionOutcome {
                response_type: QuestionResponseType::Option,
                selected_option_ids: vec![action.to_string()],
                text_response: None,
            },
        );
    }

    /// Resolve the open question on `thread_id` with a free-text reply.
    /// Returns `true` when a question consumed the message (it must then
    /// not be forwarded to the IDE).
    pub async fn try_resolve_text(&self, thread_id: &str, text: &str) -> bool {
        let mut open = self.open.lock().await;
        let Some(mid) = open
            .iter()
            .find(|(_, q)| q.thread_id == thread_id)
            .map(|(mid, _)| *mid)
        else {
            return false;
        };
        let Some(question) = open.remove(&mid) else {
            return false;
        };
        drop(open);

        let rendered = render_answered(&question.question, &question.options, &question.selected);
        if let Err(e) = question
            .channel
            .edit_message(
                &question.http,
                MessageId::new(mid),
                EditMessage::new().content(rendered).components(Vec::new()),
            )
            .await
        {
            warn!(thread_id = %thread_id, error = %e, "answered re-render failed");
        }
        resolve(
            question,
            QuestionOutcome {
                response_type: QuestionResponseType::Text,
                selected_option_ids: Vec::new(),
                text_response: Some(text.to_string()),
            },
        );
        true
    }

    async fn expire(&self, mid: u64) {
        let Some(question) = self.open.lock().await.remove(&mid) else {
            return;
        };
        debug!(thread_id = %question.thread_id, message_id = mid, "question timed out");
        let rendered = format!("**{}**\n\n_Timed out without an answer._", question.question);
        let disabled = build_buttons(
            mid,
            &question.options,
            &question.selected,
            question.allow_multiple,
            false,
        );
        if let Err(e) = question
            .channel
            .edit_message(
                &question.http,
                MessageId::new(mid),
                EditMessage::new().content(rendered).components(disabled),
            )
            .await
        {
            warn!(message_id = mid, error = %e, "timeout re-render failed");
        }
        let _ = question.sink.send(QuestionResolution::TimedOut);
    }

    /// Fail every open question (shutdown path).
    pub async fn resolve_all_timed_out(&self) {
        let drained: Vec<OpenQuestion> = {
            let mut open = self.open.lock().await;
            open.drain().map(|(_, q)| q).collect()
        };
        for question in drained {
            question.timeout.abort();
            let _ = question.sink.send(QuestionResolution::TimedOut);
        }
    }

    #[must_use]
    pub async fn open_count(&self) -> usize {
        self.open.lock().await.len()
    }
}

fn resolve(question: OpenQuestion, outcome: QuestionOutcome) {
    question.timeout.abort();
    let _ = question.sink.send(QuestionResolution::Answered(outcome));
}

fn parse_channel(thread_id: &str) -> Result<ChannelId> {
    thread_id
        .parse::<u64>()
        .map(ChannelId::new)
        .map_err(|_| Error::invalid_input(format!("not a thread id: {thread_id}")))
}

fn ephemeral(text: &str) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(text)
            .ephemeral(true),
    )
}

/// Selected ids in their original option order.
fn ordered_selection(options: &[QuestionOption], selected: &HashSet<String>) -> Vec<String> {
    options
        .iter()
        .filter(|o| selected.contains(&o.id))
        .map(|o| o.id.clone())
        .collect()
}

fn render_open(question: &str, options: &[QuestionOption], allow_multiple: bool) -> String {
    let mut out = format!("**{question}**\n\n");
    for option in options {
        out.push_str(&format!("• {}\n", option.label));
    }
    if allow_multiple {
        out.push_str("\n_Pick any that apply, then press Submit — or just reply with a message._");
    } else {
        out.push_str("\n_Click a button — or just reply with a message._");
    }
    out
}

fn render_answered(question: &str, options: &[QuestionOption], selected: &HashSet<String>) -> String {
    let mut out = format!("**{question}**\n\n");
    for option in options {
        let marker = if selected.contains(&option.id) {
            "☑"
        } else {
            "☐"
        };
        out.push_str(&format!("{marker} {}\n", option.label));
    }
    out
}

fn build_buttons(
    mid: u64,
    options: &[QuestionOption],
    selected: &HashSet<String>,
    allow_multiple: bool,
    enabled: bool,
) -> Vec<CreateActionRow> {
    let mut buttons: Vec<CreateButton> = options
        .iter()
        .map(|option| {
            let style = if selected.contains(&option.id) {
                ButtonStyle::Success
            } else {
                ButtonStyle::Primary
            };
            let label: String = option.label.chars().take(BUTTON_LABEL_LIMIT).collect();
            CreateButton::new(format!("{CUSTOM_ID_PREFIX}:{mid}:{}", option.id))
                .label(label)
                .style(style)
                .disabled(!enabled)
        })
        .collect();
    if allow_multiple {
        buttons.push(
            CreateButton::new(format!("{CUSTOM_ID_PREFIX}:{mid}:submit"))
                .label("Submit")
                .style(ButtonStyle::Secondary)
                .disabled(!enabled || selected.is_empty()),
        );
    }
    buttons
        .chunks(5)
        .map(|chunk| CreateActionRow::Buttons(chunk.to_vec()))
        .collect()
}

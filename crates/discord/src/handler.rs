//! Discord event handler for serenity.
//!
//! Receives gateway events and routes them into the bridge: inbound thread
//! messages to the IDE (or an open question), archived-flag transitions to
//! the lifecycle store, button clicks to the interaction manager.

use std::sync::{Arc, atomic::Ordering};

use {
    serenity::{
        all::{Context, EventHandler, GatewayIntents, Interaction, Message, ReactionType, Ready},
        async_trait,
        model::channel::GuildChannel,
    },
    threadmirror_bridge::lifecycle,
    tracing::{debug, info, warn},
};

use crate::{client::GatewayShared, sink::InboundSink};

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    pub(crate) shared: Arc<GatewayShared>,
    pub(crate) sink: Arc<dyn InboundSink>,
}

impl DiscordHandler {
    /// Required gateway intents for the bridge bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.shared.bot_user_id.store(ready.user.id.get(), Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);
        info!(
            bot_name = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord gateway ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Skip bot messages to prevent loops.
        if msg.author.bot {
            return;
        }

        let thread_id = msg.channel_id.to_string();
        let mapping = match self.shared.registry.get_by_thread(&thread_id).await {
            Ok(Some(mapping)) => mapping,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "mapping lookup failed for inbound message");
                return;
            },
        };

        if let Err(e) = lifecycle::note_inbound_activity(&self.shared.store, &thread_id).await {
            warn!(thread_id = %thread_id, error = %e, "activity update failed");
        }

        // An open question on this thread consumes the message entirely.
        if self
            .shared
            .questions
            .try_resolve_text(&thread_id, &msg.content)
            .await
        {
            return;
        }

        self.shared
            .active
            .record(&thread_id, &msg.author.id.to_string());

        match self
            .sink
            .deliver(&mapping.conversation_id, &msg.content, &thread_id)
            .await
        {
            Ok(()) => {
                let _ = msg
                    .react(&ctx.http, ReactionType::Unicode("✅".to_string()))
                    .await;
            },
            Err(e) => {
                warn!(
                    conversation_id = %mapping.conversation_id,
                    error = %e,
                    "delivery to IDE failed"
                );
                let _ = msg
                    .reply(&ctx.http, format!("Could not deliver to the IDE: {e}"))
                    .await;
            },
        }
    }

    async fn thread_update(&self, _ctx: Context, old: Option<GuildChannel>, new: GuildChannel) {
        let thread_id = new.id.to_string();
        match self.shared.registry.get_by_thread(&thread_id).await {
            Ok(Some(_)) => {},
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "mapping lookup failed for thread update");
                return;
            },
        }
        let Some(metadata) = new.thread_metadata else {
            return;
        };
        let was_archived = old
            .as_ref()
            .and_then(|o| o.thread_metadata.as_ref())
            .is_some_and(|m| m.archived);
        if was_archived == metadata.archived {
            return;
        }

        let minutes = u16::from(metadata.auto_archive_duration);
        if let Err(e) = lifecycle::apply_archive_transition(
            &self.shared.store,
            &thread_id,
            metadata.archived,
            minutes,
        )
        .await
        {
            warn!(thread_id = %thread_id, error = %e, "archive transition handling failed");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            self.shared
                .questions
                .handle_component(&ctx.http, &component)
                .await;
        }
    }
}

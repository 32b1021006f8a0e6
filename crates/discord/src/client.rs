//! The serenity-backed chat gateway.
//!
//! Owns the gateway session, the current-channel selection for thread
//! creation, and the wire-level implementations of every `ChatGateway`
//! operation.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use {
    async_trait::async_trait,
    serenity::{
        all::{
            AutoArchiveDuration, Channel, ChannelType, Client, CreateAttachment, CreateChannel,
            CreateEmbed, CreateMessage, CreateThread, EditThread, Permissions, RoleId, UserId,
        },
        gateway::ShardManager,
        http::Http,
        model::id::{ChannelId, GuildId},
    },
    threadmirror_bridge::{
        ChannelInfo, ChatGateway, FilePayload, GuildInfo, QuestionOutcome, QuestionRequest,
        ThreadSnapshot,
    },
    threadmirror_common::{Error, Result, now_ms, text},
    threadmirror_config::{BotToken, GlobalConfig, invite_url},
    threadmirror_state::{ActiveConversations, MappingRegistry, StateStore},
    tracing::{info, warn},
};

use crate::{
    errors::map_api_err,
    handler::DiscordHandler,
    ping,
    questions::InteractionManager,
    sink::InboundSink,
    typing::TypingManager,
};

/// Permission check result for a guild.
#[derive(Debug, Clone)]
pub struct PermissionReport {
    pub ok: bool,
    pub missing: Vec<String>,
    /// Reinstall hint, present when permissions are missing.
    pub invite_url: Option<String>,
}

/// The capabilities the bridge needs in a guild.
const REQUIRED_PERMISSIONS: &[(Permissions, &str)] = &[
    (Permissions::SEND_MESSAGES, "Send Messages"),
    (Permissions::CREATE_PUBLIC_THREADS, "Create Public Threads"),
    (Permissions::SEND_MESSAGES_IN_THREADS, "Send Messages in Threads"),
    (Permissions::MANAGE_CHANNELS, "Manage Channels"),
    (Permissions::VIEW_CHANNEL, "View Channels"),
    (Permissions::READ_MESSAGE_HISTORY, "Read Message History"),
    (Permissions::ADD_REACTIONS, "Add Reactions"),
];

/// State shared between the gateway facade and the event handler.
pub(crate) struct GatewayShared {
    pub(crate) http: RwLock<Option<Arc<Http>>>,
    pub(crate) shard_manager: RwLock<Option<Arc<ShardManager>>>,
    pub(crate) connected: AtomicBool,
    pub(crate) bot_user_id: AtomicU64,
    pub(crate) current_channel: RwLock<Option<ChannelId>>,
    pub(crate) config: GlobalConfig,
    pub(crate) store: Arc<StateStore>,
    pub(crate) registry: MappingRegistry,
    pub(crate) active: Arc<ActiveConversations>,
    pub(crate) typing: TypingManager,
    pub(crate) questions: Arc<InteractionManager>,
}

/// Serenity-backed [`ChatGateway`].
pub struct DiscordGateway {
    shared: Arc<GatewayShared>,
}

impl DiscordGateway {
    #[must_use]
    pub fn new(
        config: GlobalConfig,
        store: Arc<StateStore>,
        registry: MappingRegistry,
        active: Arc<ActiveConversations>,
    ) -> Self {
        Self {
            shared: Arc::new(GatewayShared {
                http: RwLock::new(None),
                shard_manager: RwLock::new(None),
                connected: AtomicBool::new(false),
                bot_user_id: AtomicU64::new(0),
                current_channel: RwLock::new(None),
                config,
                store,
                registry,
                active,
                typing: TypingManager::new(),
                questions: Arc::new(InteractionManager::new()),
            }),
        }
    }

    /// Open an HTTP-only session: enough for REST operations like the
    /// permission check, without starting the gateway event loop.
    pub async fn connect_http_only(&self, token: &BotToken) -> Result<()> {
        let http = Arc::new(Http::new(token.expose()));
        let user = http
            .get_current_user()
            .await
            .map_err(|e| map_api_err("identify bot", e))?;
        self.shared.bot_user_id.store(user.id.get(), Ordering::SeqCst);
        *write_lock(&self.shared.http) = Some(http);
        Ok(())
    }

    /// Establish a gateway session and start receiving events.
    pub async fn connect(&self, token: &BotToken, sink: Arc<dyn InboundSink>) -> Result<()> {
        let handler = DiscordHandler {
            shared: Arc::clone(&self.shared),
            sink,
        };
        let mut client = Client::builder(token.expose(), DiscordHandler::intents())
            .event_handler(handler)
            .await
            .map_err(|e| Error::external("gateway session", e))?;

        *write_lock(&self.shared.http) = Some(Arc::clone(&client.http));
        *write_lock(&self.shared.shard_manager) = Some(Arc::clone(&client.shard_manager));

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                warn!(error = %e, "gateway session ended");
            }
            shared.connected.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Tear the session down: watchers first, then the shard runner.
    pub async fn disconnect(&self) {
        self.shared.typing.stop_all();
        self.shared.questions.resolve_all_timed_out().await;
        let manager = write_lock(&self.shared.shard_manager).take();
        if let Some(manager) = manager {
            manager.shutdown_all().await;
        }
        *write_lock(&self.shared.http) = None;
        self.shared.connected.store(false, Ordering::SeqCst);
        info!("gateway session destroyed");
    }

    /// Reconnect with a fresh session.
    pub async fn reconnect(&self, token: &BotToken, sink: Arc<dyn InboundSink>) -> Result<()> {
        self.disconnect().await;
        self.connect(token, sink).await
    }

    /// Set the channel new threads are created under.
    pub fn select_channel(&self, channel_id: &str) -> Result<()> {
        let channel = parse_channel(channel_id)?;
        *write_lock(&self.shared.current_channel) = Some(channel);
        Ok(())
    }

    #[must_use]
    pub fn bot_user_id(&self) -> Option<String> {
        match self.shared.bot_user_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id.to_string()),
        }
    }

    pub async fn list_guilds(&self) -> Result<Vec<GuildInfo>> {
        let http = self.http()?;
        let guilds = http
            .get_guilds(None, None)
            .await
            .map_err(|e| map_api_err("list guilds", e))?;
        Ok(guilds
            .into_iter()
            .map(|g| GuildInfo {
                id: g.id.to_string(),
                name: g.name,
            })
            .collect())
    }

    pub async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelInfo>> {
        self.guild_channels_of_kind(guild_id, ChannelType::Text).await
    }

    pub async fn list_categories(&self, guild_id: &str) -> Result<Vec<ChannelInfo>> {
        self.guild_channels_of_kind(guild_id, ChannelType::Category).await
    }

    async fn guild_channels_of_kind(
        &self,
        guild_id: &str,
        kind: ChannelType,
    ) -> Result<Vec<ChannelInfo>> {
        let http = self.http()?;
        let guild = parse_guild(guild_id)?;
        let channels = http
            .get_channels(guild)
            .await
            .map_err(|e| map_api_err("list channels", e))?;
        Ok(channels
            .into_iter()
            .filter(|c| c.kind == kind)
            .map(|c| ChannelInfo {
                id: c.id.to_string(),
                name: c.name,
            })
            .collect())
    }

    /// Create a text channel with a sanitized name, optionally under a
    /// category.
    pub async fn create_channel(
        &self,
        guild_id: &str,
        name: &str,
        category_id: Option<&str>,
    ) -> Result<ChannelInfo> {
        let http = self.http()?;
        let guild = parse_guild(guild_id)?;
        let sanitized = text::sanitize_channel_name(name);
        if sanitized.is_empty() {
            return Err(Error::invalid_input("channel name sanitizes to nothing"));
        }
        let mut builder = CreateChannel::new(&sanitized).kind(ChannelType::Text);
        if let Some(category) = category_id {
            builder = builder.category(parse_channel(category)?);
        }
        let channel = guild
            .create_channel(&http, builder)
            .await
            .map_err(|e| map_api_err("create channel", e))?;
        info!(channel_id = %channel.id, name = %sanitized, "created channel");
        Ok(ChannelInfo {
            id: channel.id.to_string(),
            name: channel.name,
        })
    }

    /// Verify the bot holds every capability the bridge needs in a guild.
    pub async fn check_permissions(&self, guild_id: &str) -> Result<PermissionReport> {
        let http = self.http()?;
        let guild_id = parse_guild(guild_id)?;
        let bot_id = self.shared.bot_user_id.load(Ordering::SeqCst);
        if bot_id == 0 {
            return Err(Error::NotConnected);
        }
        let guild = http
            .get_guild(guild_id)
            .await
            .map_err(|e| map_api_err("fetch guild", e))?;
        let member = http
            .get_member(guild_id, UserId::new(bot_id))
            .await
            .map_err(|e| map_api_err("fetch bot member", e))?;

        // Everyone role shares the guild's id; member roles stack on top.
        let mut granted = guild
            .roles
            .get(&RoleId::new(guild_id.get()))
            .map_or_else(Permissions::empty, |r| r.permissions);
        for role_id in &member.roles {
            if let Some(role) = guild.roles.get(role_id) {
                granted |= role.permissions;
            }
        }

        Ok(permission_report(granted, &bot_id.to_string()))
    }

    fn http(&self) -> Result<Arc<Http>> {
        read_lock(&self.shared.http)
            .clone()
            .ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn create_thread(&self, name: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("thread name must not be empty"));
        }
        let http = self.http()?;
        let channel = read_lock(&self.shared.current_channel)
            .ok_or_else(|| Error::invalid_input("no channel selected for this workspace"))?;
        let thread_name = text::truncate_thread_name(name);
        let thread = channel
            .create_thread(
                &http,
                CreateThread::new(thread_name)
                    .kind(ChannelType::PublicThread)
                    .auto_archive_duration(AutoArchiveDuration::OneWeek),
            )
            .await
            .map_err(|e| map_api_err("create thread", e))?;
        Ok(thread.id.to_string())
    }

    async fn post_to_thread(&self, thread_id: &str, post: &str, as_embed: bool) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        let plan = ping::plan(&self.shared.config, &self.shared.active, thread_id);
        let chunks = text::split_message(post);

        for (i, chunk) in chunks.iter().enumerate() {
            let body = match (&plan.prefix, i) {
                (Some(prefix), 0) => format!("{prefix} {chunk}"),
                _ => chunk.clone(),
            };
            let message = if as_embed {
                CreateMessage::new().embed(CreateEmbed::new().description(body))
            } else {
                CreateMessage::new().content(body)
            };
            channel
                .send_message(&http, message)
                .await
                .map_err(|e| map_api_err("post to thread", e))?;
        }

        if plan.consume_active {
            self.shared.active.consume(thread_id);
        }
        self.shared.store.record_activity(thread_id, now_ms()).await?;
        Ok(())
    }

    async fn send_file_to_thread(&self, thread_id: &str, file: FilePayload) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        let mut attachment = CreateAttachment::bytes(file.bytes, file.name);
        if let Some(description) = file.description {
            attachment = attachment.description(description);
        }
        channel
            .send_message(&http, CreateMessage::new().add_file(attachment))
            .await
            .map_err(|e| map_api_err("send file", e))?;
        self.shared.store.record_activity(thread_id, now_ms()).await?;
        Ok(())
    }

    async fn rename_thread(&self, thread_id: &str, name: &str) -> Result<()> {
        let thread_name = text::truncate_thread_name(name);
        match self.thread_snapshot(thread_id).await? {
            None => return Err(Error::not_found(format!("thread {thread_id}"))),
            Some(snapshot) if snapshot.name == thread_name => return Ok(()),
            Some(_) => {},
        }
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        channel
            .edit_thread(&http, EditThread::new().name(thread_name))
            .await
            .map_err(|e| map_api_err("rename thread", e))?;
        Ok(())
    }

    async fn archive_thread(&self, thread_id: &str) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        channel
            .edit_thread(&http, EditThread::new().archived(true))
            .await
            .map_err(|e| map_api_err("archive thread", e))?;
        Ok(())
    }

    async fn unarchive_thread(&self, thread_id: &str) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        channel
            .edit_thread(&http, EditThread::new().archived(false))
            .await
            .map_err(|e| map_api_err("unarchive thread", e))?;
        Ok(())
    }

    async fn thread_snapshot(&self, thread_id: &str) -> Result<Option<ThreadSnapshot>> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        match http.get_channel(channel).await {
            Ok(Channel::Guild(guild_channel)) => {
                Ok(guild_channel.thread_metadata.map(|metadata| ThreadSnapshot {
                    id: thread_id.to_string(),
                    name: guild_channel.name.clone(),
                    archived: metadata.archived,
                    auto_archive_minutes: u16::from(metadata.auto_archive_duration),
                }))
            },
            Ok(_) => Ok(None),
            Err(e) => match map_api_err("fetch thread", e) {
                Error::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn invite_user(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        let user = user_id
            .parse::<u64>()
            .map(UserId::new)
            .map_err(|_| Error::invalid_input(format!("not a user id: {user_id}")))?;
        channel
            .add_thread_member(&http, user)
            .await
            .map_err(|e| map_api_err("invite user", e))?;
        Ok(())
    }

    async fn start_typing(&self, thread_id: &str) -> Result<()> {
        let http = self.http()?;
        let channel = parse_channel(thread_id)?;
        self.shared.typing.start(http, thread_id, channel);
        Ok(())
    }

    async fn stop_typing(&self, thread_id: &str) {
        self.shared.typing.stop(thread_id);
    }

    async fn ask_question(&self, request: QuestionRequest) -> Result<QuestionOutcome> {
        let http = self.http()?;
        Arc::clone(&self.shared.questions).ask(http, request).await
    }
}

/// Compare granted permissions against the required set; failures carry
/// the reinstall URL so the caller can surface it.
fn permission_report(granted: Permissions, bot_user_id: &str) -> PermissionReport {
    let missing: Vec<String> = if granted.contains(Permissions::ADMINISTRATOR) {
        Vec::new()
    } else {
        REQUIRED_PERMISSIONS
            .iter()
            .filter(|(p, _)| !granted.contains(*p))
            .map(|(_, label)| (*label).to_string())
            .collect()
    };
    let ok = missing.is_empty();
    PermissionReport {
        ok,
        invite_url: (!ok).then(|| invite_url(bot_user_id)),
        missing,
    }
}

fn parse_channel(id: &str) -> Result<ChannelId> {
    id.parse::<u64>()
        .map(ChannelId::new)
        .map_err(|_| Error::invalid_input(format!("not a channel id: {id}")))
}

fn parse_guild(id: &str) -> Result<GuildId> {
    id.parse::<u64>()
        .map(GuildId::new)
        .map_err(|_| Error::invalid_input(format!("not a guild id: {id}")))
}

fn read_lock<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_required() -> Permissions {
        REQUIRED_PERMISSIONS
            .iter()
            .fold(Permissions::empty(), |acc, (p, _)| acc | *p)
    }

    #[test]
    fn full_grant_passes_without_invite_url() {
        let report = permission_report(all_required(), "42");
        assert!(report.ok);
        assert!(report.missing.is_empty());
        assert!(report.invite_url.is_none());
    }

    #[test]
    fn administrator_bypasses_the_capability_list() {
        let report = permission_report(Permissions::ADMINISTRATOR, "42");
        assert!(report.ok);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn missing_capabilities_carry_the_invite_url() {
        let granted = Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNEL;
        let report = permission_report(granted, "42");
        assert!(!report.ok);
        assert!(report.missing.contains(&"Create Public Threads".to_string()));
        assert!(report.missing.contains(&"Manage Channels".to_string()));
        assert!(!report.missing.contains(&"Send Messages".to_string()));
        let url = report.invite_url.unwrap();
        assert!(url.contains("client_id=42"));
        assert!(url.contains("permissions="));
    }

    #[test]
    fn empty_grant_misses_everything() {
        let report = permission_report(Permissions::empty(), "42");
        assert_eq!(report.missing.len(), REQUIRED_PERMISSIONS.len());
    }
}

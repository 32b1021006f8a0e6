//! Component wiring and the daemon lifecycle.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, anyhow},
    async_trait::async_trait,
    threadmirror_actuator::Actuator,
    threadmirror_bridge::{
        ChatGateway, ChatWatcher, ConversationSource, NameSyncWatcher, PendingComposer,
        ThreadResolver, ThreadService,
    },
    threadmirror_common::Result,
    threadmirror_composer::{ComposerStore, locate_for_workspace, storage_base_dir},
    threadmirror_config::{BotToken, GlobalConfig, ProjectConfig},
    threadmirror_discord::{DiscordGateway, InboundSink, PermissionReport},
    threadmirror_rpc::{
        AppState, PORT_RANGE_LEN, PORT_RANGE_START, Reconnector, adapter_config_path,
        bind_loopback, ensure_adapter_registered, serve,
    },
    threadmirror_state::{
        ActiveConversations, MappingRegistry, StateStore, keys, paths::workspace_state_path,
    },
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

/// Delivers inbound thread messages through the keystroke actuator.
struct ActuatorSink {
    actuator: Arc<Actuator>,
}

#[async_trait]
impl InboundSink for ActuatorSink {
    async fn deliver(&self, conversation_id: &str, text: &str, thread_id: &str) -> Result<()> {
        self.actuator
            .deliver(conversation_id, text, Some(thread_id))
            .await
    }
}

/// Re-establishes the gateway session from the stored credential.
struct GatewayReconnector {
    gateway: Arc<DiscordGateway>,
    token: BotToken,
    sink: Arc<dyn InboundSink>,
}

#[async_trait]
impl Reconnector for GatewayReconnector {
    async fn reconnect(&self) -> Result<()> {
        self.gateway
            .reconnect(&self.token, Arc::clone(&self.sink))
            .await
    }
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    data_dir
        .or_else(dirs_next::data_dir)
        .ok_or_else(|| anyhow!("no data directory available on this host"))
}

async fn load_json_config<T: serde::de::DeserializeOwned + Default>(
    store: &StateStore,
    key: &str,
) -> T {
    match store.kv_get(key).await {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "stored config unreadable; using defaults");
            T::default()
        }),
        _ => T::default(),
    }
}

/// Start the daemon for one workspace and serve until interrupted.
pub async fn run(workspace: PathBuf, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let workspace = workspace
        .canonicalize()
        .with_context(|| format!("workspace root {} not accessible", workspace.display()))?;
    let label = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    info!(workspace = %workspace.display(), label = %label, "starting bridge daemon");

    let data_dir = resolve_data_dir(data_dir)?;
    let store = Arc::new(StateStore::open(&workspace_state_path(&data_dir, &workspace)).await?);
    let registry = MappingRegistry::new(Arc::clone(&store));
    let active = Arc::new(ActiveConversations::new());

    let mut global_config: GlobalConfig = load_json_config(&store, keys::GLOBAL_CONFIG).await;
    global_config.normalize();
    let project_config: ProjectConfig = load_json_config(&store, keys::PROJECT_CONFIG).await;
    let token = store
        .kv_get(keys::BOT_TOKEN)
        .await?
        .filter(|t| !t.trim().is_empty())
        .map(BotToken::new);
    let setup_required = token.is_none();
    if setup_required {
        warn!("no bot token stored; staying in setup-required state");
    }

    let gateway = Arc::new(DiscordGateway::new(
        global_config.clone(),
        Arc::clone(&store),
        registry.clone(),
        Arc::clone(&active),
    ));
    let gateway_dyn: Arc<dyn ChatGateway> = gateway.clone();

    let actuator = Arc::new(Actuator::for_host(label.clone()));
    let sink: Arc<dyn InboundSink> = Arc::new(ActuatorSink {
        actuator: Arc::clone(&actuator),
    });

    let mut reconnector: Option<Arc<dyn Reconnector>> = None;
    if let Some(token) = token {
        gateway.connect(&token, Arc::clone(&sink)).await?;
        if let Some(channel_id) = project_config.channel_id.as_deref() {
            gateway.select_channel(channel_id)?;
        } else {
            warn!("no channel configured for this workspace; thread creation will fail");
        }
        reconnector = Some(Arc::new(GatewayReconnector {
            gateway: Arc::clone(&gateway),
            token,
            sink: Arc::clone(&sink),
        }));
    }

    let threads = Arc::new(ThreadService::new(
        Arc::clone(&gateway_dyn),
        registry.clone(),
        Arc::clone(&store),
        global_config.clone(),
        label.clone(),
    ));
    let pending = Arc::new(PendingComposer::new());

    // IDE storage discovery; without it the RPC surface still runs, but
    // conversation mirroring stays off.
    let storage = storage_base_dir()
        .map(|base| locate_for_workspace(&base, &workspace))
        .transpose()?
        .flatten();

    let mut watcher_tasks: Vec<JoinHandle<()>> = Vec::new();
    let source: Arc<dyn ConversationSource> = match &storage {
        Some(storage) => {
            let composer = Arc::new(ComposerStore::new(storage.db_path.clone()));
            let watcher = Arc::new(ChatWatcher::new(
                composer.clone(),
                Arc::clone(&threads),
                registry.clone(),
                Arc::clone(&store),
                Arc::clone(&pending),
                global_config.clone(),
            ));
            watcher.hydrate().await?;
            watcher_tasks.push(Arc::clone(&watcher).spawn());

            let name_sync = Arc::new(NameSyncWatcher::new(
                composer.clone(),
                Arc::clone(&gateway_dyn),
                registry.clone(),
            ));
            if let Err(e) = name_sync.initialize().await {
                warn!(error = %e, "name-sync seeding failed");
            }
            watcher_tasks.extend(name_sync.spawn(storage.watch_paths()));
            composer
        },
        None => {
            warn!("IDE workspace storage not found; conversation mirroring disabled");
            Arc::new(EmptyConversationSource)
        },
    };

    let resolver = Arc::new(ThreadResolver::new(
        Arc::clone(&source),
        Arc::clone(&threads),
        registry.clone(),
        Arc::clone(&pending),
    ));

    // Keep the adapter registration current so the IDE can reach us.
    if let Some(config_path) = adapter_config_path() {
        match adapter_bundle_path() {
            Some(adapter_path) => {
                match ensure_adapter_registered(&config_path, &adapter_path) {
                    Ok(true) => info!("adapter config updated; reload the IDE to pick it up"),
                    Ok(false) => {},
                    Err(e) => warn!(error = %e, "adapter registration failed"),
                }
            },
            None => warn!("bundled adapter not found next to the executable"),
        }
    }

    let state = AppState {
        gateway: gateway_dyn,
        resolver,
        threads,
        actuator,
        reconnector,
        workspace_folders: vec![workspace.to_string_lossy().into_owned()],
        workspace_name: label,
        global_config,
        project_config,
        setup_required,
    };

    let (listener, port) = bind_loopback().await?;
    info!(port, "bridge daemon ready");

    tokio::select! {
        result = serve(state, listener) => {
            result?;
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        },
    }

    for task in watcher_tasks {
        task.abort();
    }
    gateway.disconnect().await;
    Ok(())
}

/// The bundled tool-protocol adapter ships next to the daemon binary.
fn adapter_bundle_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let path = exe.parent()?.join("adapter").join("index.js");
    path.exists().then_some(path)
}

/// Conversation source used when the IDE storage cannot be located.
struct EmptyConversationSource;

#[async_trait]
impl ConversationSource for EmptyConversationSource {
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
    async fn active_ranked_by_recency(
        &self,
    ) -> Result<Vec<threadmirror_bridge::RankedConversation>> {
        Ok(Vec::new())
    }
}

/// Probe the discovery range and print every responding instance.
pub async fn status() -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut found = 0;
    for port in PORT_RANGE_START..PORT_RANGE_START + PORT_RANGE_LEN {
        let url = format!("http://127.0.0.1:{port}/health");
        let response = client
            .get(&url)
            .timeout(std::time::Duration::from_millis(750))
            .send()
            .await;
        let Ok(response) = response else {
            continue;
        };
        let Ok(health) = response.json::<serde_json::Value>().await else {
            continue;
        };
        found += 1;
        println!(
            "port {port}: {} — workspace {} (discord: {})",
            health["status"].as_str().unwrap_or("?"),
            health["workspaceName"].as_str().unwrap_or("?"),
            health["discordConnected"]
        );
    }
    if found == 0 {
        println!(
            "no bridge daemon responding on ports {PORT_RANGE_START}-{}",
            PORT_RANGE_START + PORT_RANGE_LEN - 1
        );
    }
    Ok(())
}

/// Sanity-check storage discovery, credential, and configuration.
pub async fn doctor(workspace: PathBuf, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let workspace = workspace.canonicalize()?;
    println!("workspace: {}", workspace.display());

    match storage_base_dir() {
        Some(base) => {
            println!("storage base: {}", base.display());
            match locate_for_workspace(&base, &workspace)? {
                Some(storage) => {
                    println!("storage folder: {}", storage.dir.display());
                    println!(
                        "database: {} ({})",
                        storage.db_path.display(),
                        if storage.db_path.exists() {
                            "present"
                        } else {
                            "missing"
                        }
                    );
                },
                None => println!("storage folder: NOT FOUND for this workspace"),
            }
        },
        None => println!("storage base: platform config dir unavailable"),
    }

    let data_dir = resolve_data_dir(data_dir)?;
    let state_path = workspace_state_path(&data_dir, &workspace);
    println!("state db: {}", state_path.display());
    let store = Arc::new(StateStore::open(&state_path).await?);

    let token = store
        .kv_get(keys::BOT_TOKEN)
        .await?
        .filter(|t| !t.trim().is_empty());
    println!(
        "bot token: {}",
        if token.is_some() {
            "stored"
        } else {
            "MISSING (setup required)"
        }
    );
    let global: GlobalConfig = load_json_config(&store, keys::GLOBAL_CONFIG).await;
    let project: ProjectConfig = load_json_config(&store, keys::PROJECT_CONFIG).await;
    println!("guild: {}", global.guild_name.as_deref().unwrap_or("unset"));
    println!(
        "channel: {}",
        project.channel_name.as_deref().unwrap_or("unset")
    );
    println!(
        "implicit archive: top {} or touched within {} h",
        global.implicit_archive_count, global.implicit_archive_hours
    );

    match (token, global.guild_id.as_deref()) {
        (Some(token), Some(guild_id)) => {
            let gateway = DiscordGateway::new(
                global.clone(),
                Arc::clone(&store),
                MappingRegistry::new(Arc::clone(&store)),
                Arc::new(ActiveConversations::new()),
            );
            match check_bot_permissions(&gateway, &BotToken::new(token), guild_id).await {
                Ok(report) if report.ok => println!("permissions: ok"),
                Ok(report) => {
                    println!("permissions: MISSING {}", report.missing.join(", "));
                    if let Some(url) = report.invite_url {
                        println!("reinvite the bot with: {url}");
                    }
                },
                Err(e) => println!("permissions: check failed ({e})"),
            }
        },
        (None, _) => println!("permissions: not checked (no bot token)"),
        (Some(_), None) => println!("permissions: not checked (no guild configured)"),
    }
    Ok(())
}

async fn check_bot_permissions(
    gateway: &DiscordGateway,
    token: &BotToken,
    guild_id: &str,
) -> Result<PermissionReport> {
    gateway.connect_http_only(token).await?;
    gateway.check_permissions(guild_id).await
}

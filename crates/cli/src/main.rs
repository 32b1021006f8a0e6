mod daemon;

use {
    clap::{Parser, Subcommand},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "threadmirror",
    about = "threadmirror — mirror IDE agent conversations into Discord threads"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Workspace root to serve (defaults to the current directory).
    #[arg(long, global = true, env = "THREADMIRROR_WORKSPACE")]
    workspace: Option<std::path::PathBuf>,

    /// Custom data directory (overrides the platform default).
    #[arg(long, global = true, env = "THREADMIRROR_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge daemon (default when no subcommand is provided).
    Run,
    /// Probe the local discovery range and print each instance's health.
    Status,
    /// Check IDE storage discovery, stored credential, and configuration.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    let workspace = match &cli.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => daemon::run(workspace, cli.data_dir).await,
        Commands::Status => daemon::status().await,
        Commands::Doctor => daemon::doctor(workspace, cli.data_dir).await,
    }
}

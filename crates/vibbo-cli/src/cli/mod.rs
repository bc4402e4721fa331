//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use vibbo_core::config::Config;

mod commands;

#[derive(Parser)]
#[command(name = "vibbo")]
#[command(version = "0.2")]
#[command(about = "Vibbo community feed bridge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in with an SMS one-time code and pick an organization
    Login,

    /// Log out (clear stored sessions)
    Logout {
        /// Only log out of this organization
        #[arg(long, value_name = "SLUG")]
        org: Option<String>,
    },

    /// List organizations discovered for the stored session
    Orgs {
        /// Re-run organization discovery against the portal
        #[arg(long)]
        refresh: bool,

        /// Organization to act on (defaults to the only configured one)
        #[arg(long, value_name = "SLUG")]
        org: Option<String>,
    },

    /// Poll the feed and print sensor updates until interrupted
    Run {
        /// Organization to poll (defaults to the only configured one)
        #[arg(long, value_name = "SLUG")]
        org: Option<String>,
    },

    /// Show stored session state without touching the network
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Set the poll interval in minutes (minimum 5)
    SetInterval {
        #[arg(value_name = "MINUTES")]
        minutes: u64,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

/// Logs go to stderr; VIBBO_LOG controls the filter (default: warn).
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("VIBBO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load().context("load config")?;

    match cli.command {
        Commands::Login => commands::auth::login(&config).await,
        Commands::Logout { org } => commands::auth::logout(org.as_deref()),
        Commands::Orgs { refresh, org } => {
            commands::orgs::run(&config, refresh, org.as_deref()).await
        }
        Commands::Run { org } => commands::run::run(&config, org.as_deref()).await,
        Commands::Status => commands::status::run(&config),
        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::SetInterval { minutes } => commands::config::set_interval(minutes),
        },
    }
}

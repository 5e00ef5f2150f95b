use std::sync::LazyLock;

use clap::{Args, Parser, Subcommand};

/// Version with build time and, when available, the git revision.
pub static LONG_VERSION: LazyLock<String> = LazyLock::new(|| {
    let mut version = format!("{} (built {})", env!("CARGO_PKG_VERSION"), env!("BUILD_TIMESTAMP"));
    if let Some(hash) = option_env!("GIT_HASH") {
        version.push_str(&format!(" git {}", hash));
    }
    version
});

#[derive(Parser)]
#[command(
    name = "indexguard",
    version,
    long_version = LONG_VERSION.as_str(),
    about = "Indexer health monitoring with automatic remediation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the agents and the HTTP API
    Serve(ServeArgs),
    /// Run one agent cycle and print the result
    Run(RunArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// Show persisted health check history
    History(HistoryArgs),
    /// Query a running server's agent status
    Status(StatusArgs),
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// YAML configuration file
    #[arg(short, long, default_value = "indexguard.yaml")]
    pub config: String,

    /// Override the configured listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Override the configured listen port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Agent name (health, autoheal or discovery when enabled)
    pub agent: String,

    /// YAML configuration file
    #[arg(short, long, default_value = "indexguard.yaml")]
    pub config: String,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}

#[derive(Args, Clone)]
pub struct HistoryArgs {
    /// SQLite database path
    #[arg(long, default_value = "./data/indexguard.db")]
    pub db: String,

    /// Only records for this service
    #[arg(long)]
    pub service: Option<String>,

    /// Only records for this indexer id
    #[arg(long)]
    pub target_id: Option<i64>,

    /// Maximum number of records
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct StatusArgs {
    /// Base URL of a running server
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

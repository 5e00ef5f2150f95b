use clap::Parser;
use tracing_subscriber::EnvFilter;

use indexguard::cli::{self, Cli, Commands};
use indexguard::errors::GuardError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .init();
    }

    let result = match cli.command {
        Commands::Serve(args) => cli::serve::handle_serve(args).await,
        Commands::Run(args) => cli::run::handle_run(args).await,
        Commands::Validate(args) => cli::validate::handle_validate(args).await,
        Commands::History(args) => cli::history::handle_history(args).await,
        Commands::Status(args) => cli::status::handle_status(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let exit_code = match &e {
            GuardError::Config(_) => 2,
            GuardError::UnknownAgent(_) => 3,
            GuardError::AgentBusy(_) => 4,
            _ => 1,
        };
        std::process::exit(exit_code);
    }
}

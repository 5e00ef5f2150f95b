use std::path::PathBuf;

use crate::app::App;
use crate::cli::commands::RunArgs;
use crate::config::parse_config;
use crate::errors::GuardError;
use tracing::info;

/// One synchronous cycle. A failed run still prints its result and exits 0;
/// only orchestrator errors (unknown, busy, disabled) fail the command.
pub async fn handle_run(args: RunArgs) -> Result<(), GuardError> {
    let config = parse_config(&PathBuf::from(&args.config)).await?;
    let app = App::build(config)?;

    let result = app.orchestrator.run_now(&args.agent).await?;
    info!(
        agent = %args.agent,
        success = result.success,
        duration_ms = result.duration_ms(),
        "Run complete"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

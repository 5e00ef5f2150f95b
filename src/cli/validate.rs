use std::path::PathBuf;

use crate::cli::commands::ValidateArgs;
use crate::config::parse_config;
use crate::errors::GuardError;

pub async fn handle_validate(args: ValidateArgs) -> Result<(), GuardError> {
    let config = parse_config(&PathBuf::from(&args.config)).await?;
    println!("Configuration is valid: {}", args.config);
    for svc in &config.services {
        println!("  {} ({}) {}", svc.name, svc.kind.as_str(), svc.url);
    }
    let discovery = &config.agents.discovery;
    if discovery.enabled {
        let sink = discovery.add_to.as_deref().unwrap_or("report only");
        println!("  discovery: {} source(s), {}", discovery.sources.len(), sink);
    }
    Ok(())
}

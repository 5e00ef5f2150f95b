use std::path::Path;

use crate::errors::GuardError;
use super::schema::CONFIG_SCHEMA;
use super::types::GuardConfig;
use tracing::{debug, warn};

const MAX_CONFIG_BYTES: u64 = 1_048_576;

/// Load, check and validate a configuration file. Missing API keys are
/// filled in from `<SERVICE>_API_KEY` before validation.
pub async fn parse_config(path: &Path) -> Result<GuardConfig, GuardError> {
    if !path.exists() {
        return Err(GuardError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(GuardError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<GuardConfig, GuardError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    validate_schema(&yaml)?;

    let mut config: GuardConfig = serde_yaml::from_value(yaml)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_semantics(&config)?;
    Ok(config)
}

/// Structural check against the embedded schema. Advisory only.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), GuardError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| GuardError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| GuardError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }
    Ok(())
}

/// Fill in missing API keys from the environment.
pub(crate) fn apply_env_overrides<F>(config: &mut GuardConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for service in &mut config.services {
        let missing = service.api_key.as_deref().map_or(true, |k| k.trim().is_empty());
        if !missing {
            continue;
        }
        let var = service.api_key_env();
        if let Some(value) = lookup(&var).filter(|v| !v.trim().is_empty()) {
            debug!(service = %service.name, env = %var, "API key taken from environment");
            service.api_key = Some(value);
        }
    }
}

fn is_placeholder(key: &str) -> bool {
    let lower = key.trim().to_ascii_lowercase();
    lower.starts_with("your_") || lower.starts_with("your-") || lower == "change_me" || lower == "changeme"
}

pub(crate) fn validate_semantics(config: &GuardConfig) -> Result<(), GuardError> {
    if config.services.is_empty() {
        return Err(GuardError::Config("At least one service must be configured".into()));
    }

    let mut seen = std::collections::HashSet::new();
    for service in &config.services {
        if service.name.trim().is_empty() {
            return Err(GuardError::Config("Service name must not be empty".into()));
        }
        if !seen.insert(service.name.as_str()) {
            return Err(GuardError::Config(format!("Duplicate service name '{}'", service.name)));
        }
        if service.url.trim().is_empty() {
            return Err(GuardError::Config(format!("Service '{}' has no url", service.name)));
        }
        match service.api_key.as_deref() {
            None | Some("") => {
                return Err(GuardError::Config(format!(
                    "Service '{}' has no api_key (set it in the file or via {})",
                    service.name,
                    service.api_key_env()
                )));
            }
            Some(key) if is_placeholder(key) => {
                return Err(GuardError::Config(format!(
                    "Service '{}' api_key is a placeholder",
                    service.name
                )));
            }
            Some(_) => {}
        }
        if service.timeout_secs == 0 {
            return Err(GuardError::Config(format!("Service '{}' timeout_secs must be > 0", service.name)));
        }
    }

    let discovery = &config.agents.discovery;
    if discovery.enabled {
        if discovery.sources.is_empty() {
            return Err(GuardError::Config(
                "agents.discovery is enabled but has no sources".into(),
            ));
        }
        if let Some(bad) = discovery
            .sources
            .iter()
            .find(|s| !(s.starts_with("http://") || s.starts_with("https://")))
        {
            return Err(GuardError::Config(format!("Discovery source '{}' is not an http(s) URL", bad)));
        }
    }
    if let Some(sink) = &discovery.add_to {
        if !config.services.iter().any(|s| &s.name == sink) {
            return Err(GuardError::Config(format!(
                "agents.discovery.add_to names unknown service '{}'",
                sink
            )));
        }
    }

    let positive: [(&str, u64); 13] = [
        ("agents.health.interval_secs", config.agents.health.interval_secs),
        ("agents.autoheal.interval_secs", config.agents.autoheal.interval_secs),
        ("agents.autoheal.disable_after_failures", config.agents.autoheal.disable_after_failures as u64),
        ("resilience.failure_threshold", config.resilience.failure_threshold as u64),
        ("resilience.reset_timeout_secs", config.resilience.reset_timeout_secs),
        ("resilience.max_attempts", config.resilience.max_attempts as u64),
        ("resilience.call_timeout_secs", config.resilience.call_timeout_secs),
        ("resilience.fan_out", config.resilience.fan_out as u64),
        ("cache.capacity", config.cache.capacity as u64),
        ("events.max_events", config.events.max_events as u64),
        ("events.unhealthy_threshold", config.events.unhealthy_threshold),
        ("agents.discovery.interval_secs", config.agents.discovery.interval_secs),
        ("agents.discovery.timeout_secs", config.agents.discovery.timeout_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(GuardError::Config(format!("{} must be greater than 0", field)));
        }
    }
    if config.cache.ttl_secs == 0 {
        return Err(GuardError::Config("cache.ttl_secs must be greater than 0".into()));
    }
    if config.database.enabled && config.database.path.trim().is_empty() {
        return Err(GuardError::Config("database.path must be set when the database is enabled".into()));
    }

    Ok(())
}

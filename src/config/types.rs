use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::{AutoHealPolicy, HealthAgentConfig};
use crate::cache::CacheConfig;
use crate::errors::RetryConfig;
use crate::models::AgentPriority;
use crate::resilience::BreakerConfig;
use crate::services::ServiceKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            services: Vec::new(),
            agents: AgentsConfig::default(),
            resilience: ResilienceConfig::default(),
            cache: CacheSettings::default(),
            events: EventsConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

fn default_app_name() -> String {
    "indexguard".to_string()
}

/// One Radarr, Sonarr or Prowlarr instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    pub kind: ServiceKind,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

impl ServiceConfig {
    /// Environment variable consulted when `api_key` is missing.
    pub fn api_key_env(&self) -> String {
        let name: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}_API_KEY", name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_service_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub autoheal: AutoHealSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_health_priority")]
    pub priority: AgentPriority,
    #[serde(default)]
    pub fail_on_target_failure: bool,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval(),
            priority: default_health_priority(),
            fail_on_target_failure: false,
        }
    }
}

impl HealthSettings {
    pub fn agent_config(&self) -> HealthAgentConfig {
        HealthAgentConfig {
            fail_on_target_failure: self.fail_on_target_failure,
        }
    }
}

fn default_health_interval() -> u64 {
    1800
}

fn default_health_priority() -> AgentPriority {
    AgentPriority::High
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutoHealSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_autoheal_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub priority: AgentPriority,
    #[serde(default = "default_disable_after")]
    pub disable_after_failures: u32,
}

impl Default for AutoHealSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_autoheal_interval(),
            priority: AgentPriority::Normal,
            disable_after_failures: default_disable_after(),
        }
    }
}

impl AutoHealSettings {
    pub fn policy(&self) -> AutoHealPolicy {
        AutoHealPolicy {
            disable_after_failures: self.disable_after_failures,
        }
    }
}

fn default_autoheal_interval() -> u64 {
    7200
}

fn default_disable_after() -> u32 {
    1
}

/// Indexer discovery from external lists. Off unless enabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoverySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_discovery_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_discovery_priority")]
    pub priority: AgentPriority,
    /// HTTP(S) URLs serving a JSON list or one base URL per line.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Service that receives new indexers. Unset means report only.
    #[serde(default)]
    pub add_to: Option<String>,
    #[serde(default = "default_discovery_timeout")]
    pub timeout_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_discovery_interval(),
            priority: default_discovery_priority(),
            sources: Vec::new(),
            add_to: None,
            timeout_secs: default_discovery_timeout(),
        }
    }
}

impl DiscoverySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_discovery_interval() -> u64 {
    86400
}

fn default_discovery_priority() -> AgentPriority {
    AgentPriority::Low
}

fn default_discovery_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            call_timeout_secs: default_call_timeout(),
            fan_out: default_fan_out(),
        }
    }
}

impl ResilienceConfig {
    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: true,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_call_timeout() -> u64 {
    30
}

fn default_fan_out() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.capacity,
            ttl: Duration::from_secs(self.ttl_secs),
        }
    }
}

fn default_cache_capacity() -> usize {
    10_000
}

fn default_cache_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// In-memory window; the database keeps full history.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Consecutive failed runs before an agent is reported unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

fn default_max_events() -> usize {
    1000
}

fn default_unhealthy_threshold() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "./data/indexguard.db".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

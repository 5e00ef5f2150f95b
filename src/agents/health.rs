use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::cache::ResultCache;
use crate::errors::GuardError;
use crate::models::{AgentRunResult, Target, TargetOutcome};
use crate::services::TargetService;
use super::probe::{cacheable, from_cached, Prober};
use super::Agent;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct HealthAgentConfig {
    /// Mark the whole run failed when any target fails.
    pub fail_on_target_failure: bool,
}

/// Read-only prober. Uses cached outcomes while they are fresh and writes
/// new results back.
pub struct HealthAgent {
    name: String,
    services: Vec<Arc<dyn TargetService>>,
    prober: Arc<Prober>,
    cache: Arc<ResultCache>,
    config: HealthAgentConfig,
}

impl HealthAgent {
    pub fn new(
        name: &str,
        services: Vec<Arc<dyn TargetService>>,
        prober: Arc<Prober>,
        cache: Arc<ResultCache>,
        config: HealthAgentConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            services,
            prober,
            cache,
            config,
        }
    }

    async fn check(&self, service: &dyn TargetService, target: &Target) -> TargetOutcome {
        if let Some(cached) = self.cache.get(service.name(), target.id) {
            return from_cached(service.name(), target, cached);
        }
        let outcome = self.prober.probe(service, target).await;
        if let Some(payload) = cacheable(&outcome) {
            self.cache.set(service.name(), target.id, payload);
        }
        outcome
    }
}

#[async_trait]
impl Agent for HealthAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<AgentRunResult, GuardError> {
        let started_at = Utc::now();
        let scan = self.prober.scan(&self.services).await;

        let checks: Vec<_> = scan
            .targets
            .iter()
            .map(|(service, target)| self.check(service.as_ref(), target))
            .collect();
        let outcomes: Vec<TargetOutcome> = self.prober.fan_out(checks).await;

        let failed = outcomes.iter().filter(|o| !o.success).count();
        let cache_hits = outcomes.iter().filter(|o| o.from_cache).count();
        let success = scan.service_errors.is_empty()
            && (!self.config.fail_on_target_failure || failed == 0);

        info!(
            agent = %self.name,
            targets = outcomes.len(),
            failed,
            cache_hits,
            skipped_disabled = scan.skipped_disabled,
            "Health check complete"
        );

        let mut metadata: HashMap<String, Value> = HashMap::new();
        metadata.insert("targets".into(), json!(outcomes.len()));
        metadata.insert("failed".into(), json!(failed));
        metadata.insert("cache_hits".into(), json!(cache_hits));
        metadata.insert("skipped_disabled".into(), json!(scan.skipped_disabled));
        if !scan.service_errors.is_empty() {
            metadata.insert("service_errors".into(), json!(scan.service_errors));
        }

        Ok(AgentRunResult::new(&self.name, started_at, success, outcomes, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::agents::testing::MockService;
    use crate::cache::CacheConfig;
    use crate::errors::{ErrorKind, RetryConfig};
    use crate::resilience::{BreakerConfig, CircuitBreakerRegistry, ResilientCaller};

    fn parts(threshold: u32) -> (Arc<Prober>, Arc<ResultCache>) {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(60),
        }));
        let caller = Arc::new(ResilientCaller::new(
            breakers,
            RetryConfig { max_attempts: 1, ..Default::default() },
            Duration::from_secs(30),
        ));
        (Arc::new(Prober::new(caller, 8)), Arc::new(ResultCache::new(CacheConfig::default())))
    }

    fn agent(svc: Arc<MockService>, threshold: u32, config: HealthAgentConfig) -> HealthAgent {
        let (prober, cache) = parts(threshold);
        HealthAgent::new("health", vec![svc as Arc<dyn TargetService>], prober, cache, config)
    }

    #[tokio::test]
    async fn test_target_failure_does_not_fail_run_by_default() {
        let svc = Arc::new(
            MockService::new("radarr")
                .with_target(Target::new(1, "A", true))
                .with_target(Target::new(2, "B", true))
                .with_probe_failure(2, "Unable to connect"),
        );
        let result = agent(svc, 5, HealthAgentConfig::default()).run().await.unwrap();
        assert!(result.success);
        assert_eq!(result.outcomes.len(), 2);
        assert!(result.outcomes[0].success);
        assert!(!result.outcomes[1].success);
        assert_eq!(result.outcomes[1].message.as_deref(), Some("Unable to connect"));
    }

    #[tokio::test]
    async fn test_fail_on_target_failure() {
        let svc = Arc::new(
            MockService::new("radarr")
                .with_target(Target::new(1, "A", true))
                .with_probe_failure(1, "down"),
        );
        let config = HealthAgentConfig { fail_on_target_failure: true };
        let result = agent(svc, 5, config).run().await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_served_from_cache() {
        let svc = Arc::new(MockService::new("radarr").with_target(Target::new(1, "A", true)));
        let health = agent(svc.clone(), 5, HealthAgentConfig::default());

        health.run().await.unwrap();
        let second = health.run().await.unwrap();
        assert_eq!(svc.test_calls(), 1);
        assert!(second.outcomes[0].from_cache);
        assert_eq!(second.metadata["cache_hits"], 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        health.run().await.unwrap();
        assert_eq!(svc.test_calls(), 2);
    }

    #[tokio::test]
    async fn test_skips_disabled_targets() {
        let svc = Arc::new(
            MockService::new("sonarr")
                .with_target(Target::new(1, "A", true))
                .with_target(Target::new(2, "B", false)),
        );
        let result = agent(svc.clone(), 5, HealthAgentConfig::default()).run().await.unwrap();
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.metadata["skipped_disabled"], 1);
        assert_eq!(svc.test_calls(), 1);
    }

    #[tokio::test]
    async fn test_service_listing_failure_fails_run() {
        let svc = Arc::new(MockService::new("radarr").failing_list());
        let result = agent(svc, 5, HealthAgentConfig::default()).run().await.unwrap();
        assert!(!result.success);
        assert!(result.metadata.contains_key("service_errors"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_reported_distinctly() {
        let svc = Arc::new(
            MockService::new("radarr")
                .with_target(Target::new(1, "A", true))
                .with_probe_error(1, || GuardError::Network("refused".into())),
        );
        let (prober, _) = parts(1);
        let cache = Arc::new(ResultCache::new(CacheConfig {
            capacity: 100,
            ttl: Duration::from_secs(10),
        }));
        let health = HealthAgent::new(
            "health",
            vec![svc.clone() as Arc<dyn TargetService>],
            prober,
            cache,
            HealthAgentConfig::default(),
        );

        let first = health.run().await.unwrap();
        assert_eq!(first.outcomes[0].error_kind, Some(ErrorKind::Transient));

        // Past the cache TTL, still inside the breaker's reset window.
        tokio::time::advance(Duration::from_secs(11)).await;
        let second = health.run().await.unwrap();
        assert!(second.outcomes[0].is_circuit_open());
        assert!(!second.outcomes[0].from_cache);
        assert_eq!(svc.test_calls(), 1);
    }
}

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::cache::CachedProbe;
use crate::models::{ProbeResult, Target, TargetKey, TargetOutcome};
use crate::resilience::ResilientCaller;
use crate::services::TargetService;
use tracing::{debug, warn};

/// Targets gathered from every service at the start of a run.
pub struct TargetScan {
    pub targets: Vec<(Arc<dyn TargetService>, Target)>,
    pub skipped_disabled: usize,
    pub service_errors: Vec<String>,
}

/// Listing and probing shared by the health and autoheal agents.
pub struct Prober {
    caller: Arc<ResilientCaller>,
    fan_out: usize,
}

impl Prober {
    pub fn new(caller: Arc<ResilientCaller>, fan_out: usize) -> Self {
        Self {
            caller,
            fan_out: fan_out.max(1),
        }
    }

    pub fn caller(&self) -> &Arc<ResilientCaller> {
        &self.caller
    }

    /// List every service's targets. Disabled targets are counted and left
    /// out; a service that cannot be listed is reported, not fatal.
    pub async fn scan(&self, services: &[Arc<dyn TargetService>]) -> TargetScan {
        let listings = futures::future::join_all(services.iter().map(|service| async move {
            let listed = self
                .caller
                .call_unguarded("list_targets", || service.list_targets())
                .await;
            (service.clone(), listed)
        }))
        .await;

        let mut scan = TargetScan {
            targets: Vec::new(),
            skipped_disabled: 0,
            service_errors: Vec::new(),
        };
        for (service, listed) in listings {
            match listed {
                Ok(targets) => {
                    debug!(service = service.name(), count = targets.len(), "Listed targets");
                    for target in targets {
                        if target.enabled {
                            scan.targets.push((service.clone(), target));
                        } else {
                            scan.skipped_disabled += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(service = service.name(), error = %e, "Failed to list targets");
                    scan.service_errors.push(format!("{}: {}", service.name(), e));
                }
            }
        }
        scan
    }

    /// Test one target through its circuit breaker. Never fails; every error
    /// becomes part of the outcome.
    pub async fn probe(&self, service: &dyn TargetService, target: &Target) -> TargetOutcome {
        let key = TargetKey::new(service.name(), target.id);
        let result = self
            .caller
            .call_judged(&key, "test_target", || service.test_target(target.id), |p: &ProbeResult| p.success)
            .await;
        match result {
            Ok(probe) => TargetOutcome::from_probe(service.name(), target, probe),
            Err(e) => TargetOutcome::from_error(service.name(), target, &e),
        }
    }

    /// Drive `pending` with at most `fan_out` in flight, keeping input order.
    ///
    /// Takes futures rather than a closure: a borrowing closure held across
    /// this await fails the `Send` bound on `Agent::run`.
    pub async fn fan_out<Fut>(&self, pending: Vec<Fut>) -> Vec<Fut::Output>
    where
        Fut: Future,
    {
        stream::iter(pending).buffered(self.fan_out).collect().await
    }
}

/// Cache payload for an outcome. Breaker rejections carry no new
/// information and are never cached.
pub fn cacheable(outcome: &TargetOutcome) -> Option<CachedProbe> {
    if outcome.is_circuit_open() {
        return None;
    }
    Some(CachedProbe::new(outcome.success, outcome.message.clone(), outcome.error_kind))
}

/// Rebuild an outcome from a cache hit.
pub fn from_cached(service: &str, target: &Target, cached: CachedProbe) -> TargetOutcome {
    TargetOutcome {
        service: service.to_string(),
        target_id: target.id,
        target_name: target.display_name(),
        success: cached.success,
        error_kind: cached.error_kind,
        message: cached.message,
        from_cache: true,
        action: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use crate::agents::testing::MockService;
    use crate::errors::{ErrorKind, RetryConfig};
    use crate::resilience::{BreakerConfig, CircuitBreakerRegistry};

    fn prober(fan_out: usize) -> Prober {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default()));
        let retry = RetryConfig { max_attempts: 1, ..Default::default() };
        Prober::new(Arc::new(ResilientCaller::new(breakers, retry, Duration::from_secs(30))), fan_out)
    }

    #[tokio::test]
    async fn test_scan_skips_disabled_and_reports_service_errors() {
        let good: Arc<dyn TargetService> = Arc::new(
            MockService::new("radarr")
                .with_target(Target::new(1, "A", true))
                .with_target(Target::new(2, "B", false)),
        );
        let broken: Arc<dyn TargetService> = Arc::new(MockService::new("sonarr").failing_list());

        let scan = prober(4).scan(&[good, broken]).await;
        assert_eq!(scan.targets.len(), 1);
        assert_eq!(scan.skipped_disabled, 1);
        assert_eq!(scan.service_errors.len(), 1);
        assert!(scan.service_errors[0].starts_with("sonarr"));
    }

    #[tokio::test]
    async fn test_check_folds_errors_into_outcome() {
        let svc = MockService::new("radarr")
            .with_target(Target::new(1, "A", true))
            .with_probe_error(1, || crate::errors::GuardError::NotFound("indexer 1".into()));
        let outcome = prober(1).probe(&svc, &Target::new(1, "A", true)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Permanent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_is_bounded_and_ordered() {
        let p = prober(2);
        let in_flight = Arc::new(Mutex::new((0usize, 0usize)));
        let pending: Vec<_> = (0..6u64)
            .map(|i| {
                let in_flight = in_flight.clone();
                async move {
                    {
                        let mut g = in_flight.lock().await;
                        g.0 += 1;
                        g.1 = g.1.max(g.0);
                    }
                    tokio::time::sleep(Duration::from_millis(10 * (6 - i))).await;
                    in_flight.lock().await.0 -= 1;
                    i
                }
            })
            .collect();
        let results = p.fan_out(pending).await;
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(in_flight.lock().await.1, 2);
    }

    #[test]
    fn test_circuit_open_outcome_not_cacheable() {
        let target = Target::new(1, "A", true);
        let err = crate::errors::GuardError::CircuitOpen("radarr:1".into());
        let outcome = TargetOutcome::from_error("radarr", &target, &err);
        assert!(cacheable(&outcome).is_none());
    }
}

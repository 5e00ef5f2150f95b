use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::{json, Value};

use crate::cache::ResultCache;
use crate::db::{AuditRecord, AuditStore, HealthRecord};
use crate::errors::GuardError;
use crate::models::{AgentRunResult, RemediationAction, Target, TargetKey, TargetOutcome};
use crate::services::TargetService;
use super::control::{ControlOutcome, ControlPrimitive};
use super::probe::{cacheable, Prober};
use super::Agent;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct AutoHealPolicy {
    /// Consecutive failing cycles before a target is disabled.
    pub disable_after_failures: u32,
}

impl Default for AutoHealPolicy {
    fn default() -> Self {
        Self { disable_after_failures: 1 }
    }
}

/// Re-tests every enabled target and disables the ones that keep failing.
///
/// Probes bypass cached results; fresh results are still written back so the
/// health agent benefits. Each target's remediation is isolated: an error or
/// panic while disabling one target is recorded on that target's outcome only.
pub struct AutoHealAgent {
    name: String,
    services: Vec<Arc<dyn TargetService>>,
    prober: Arc<Prober>,
    cache: Arc<ResultCache>,
    control: Arc<ControlPrimitive>,
    store: Option<Arc<dyn AuditStore>>,
    policy: AutoHealPolicy,
    streaks: DashMap<TargetKey, u32>,
}

impl AutoHealAgent {
    pub fn new(
        name: &str,
        services: Vec<Arc<dyn TargetService>>,
        prober: Arc<Prober>,
        cache: Arc<ResultCache>,
        control: Arc<ControlPrimitive>,
        policy: AutoHealPolicy,
    ) -> Self {
        Self {
            name: name.to_string(),
            services,
            prober,
            cache,
            control,
            store: None,
            policy,
            streaks: DashMap::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Current failure streak for a target.
    pub fn streak(&self, service: &str, target_id: i64) -> u32 {
        self.streaks
            .get(&TargetKey::new(service, target_id))
            .map(|s| *s)
            .unwrap_or(0)
    }

    async fn probe_fresh(&self, service: &dyn TargetService, target: &Target) -> TargetOutcome {
        let outcome = self.prober.probe(service, target).await;
        if let Some(payload) = cacheable(&outcome) {
            self.cache.set(service.name(), target.id, payload);
        }
        outcome
    }

    /// Decide and apply remediation for one probed target.
    async fn remediate(&self, service: &dyn TargetService, target: &Target, outcome: &mut TargetOutcome) {
        let key = TargetKey::new(service.name(), target.id);

        if outcome.success {
            self.streaks.remove(&key);
            return;
        }
        // A breaker rejection is not fresh evidence either way.
        if outcome.is_circuit_open() {
            return;
        }

        let streak = {
            let mut entry = self.streaks.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if streak < self.policy.disable_after_failures {
            info!(
                target_key = %key,
                streak,
                threshold = self.policy.disable_after_failures,
                "Target failing, below disable threshold"
            );
            return;
        }

        let attempt = AssertUnwindSafe(self.control.disable(service, target))
            .catch_unwind()
            .await;
        let action = match attempt {
            Ok(Ok(ControlOutcome::Changed)) => {
                warn!(target_key = %key, target_name = %outcome.target_name, "Disabled failing target");
                self.streaks.remove(&key);
                RemediationAction::Disabled
            }
            Ok(Ok(ControlOutcome::Unchanged)) => RemediationAction::AlreadyDisabled,
            Ok(Err(e)) => {
                error!(target_key = %key, error = %e, "Failed to disable target");
                RemediationAction::DisableFailed(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(target_key = %key, panic = %reason, "Disable call panicked");
                RemediationAction::DisableFailed(format!("disable panicked: {}", reason))
            }
        };
        outcome.action = Some(action);
    }

    async fn persist(&self, outcomes: &[TargetOutcome]) -> Vec<String> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let checked_at = Utc::now();
        let mut errors = Vec::new();
        for outcome in outcomes {
            let record = HealthRecord::from_outcome(&self.name, outcome, checked_at);
            if let Err(e) = store.append(AuditRecord::Health(record)).await {
                warn!(
                    agent = %self.name,
                    service = %outcome.service,
                    target_id = outcome.target_id,
                    error = %e,
                    "Failed to persist health record"
                );
                errors.push(format!("{}:{}: {}", outcome.service, outcome.target_id, e));
            }
        }
        errors
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Agent for AutoHealAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<AgentRunResult, GuardError> {
        let started_at = Utc::now();
        info!(agent = %self.name, "Starting autoheal cycle");
        let scan = self.prober.scan(&self.services).await;
        for (service, target) in &scan.targets {
            self.control.observe(service.name(), target);
        }

        let probes: Vec<_> = scan
            .targets
            .iter()
            .map(|(service, target)| self.probe_fresh(service.as_ref(), target))
            .collect();
        let mut outcomes: Vec<TargetOutcome> = self.prober.fan_out(probes).await;

        for ((service, target), outcome) in scan.targets.iter().zip(outcomes.iter_mut()) {
            self.remediate(service.as_ref(), target, outcome).await;
        }

        let persistence_errors = self.persist(&outcomes).await;

        let count = |pred: fn(&TargetOutcome) -> bool| outcomes.iter().filter(|o| pred(o)).count();
        let failed = count(|o| !o.success);
        let disabled = count(|o| o.action == Some(RemediationAction::Disabled));
        let disable_failures = count(|o| matches!(o.action, Some(RemediationAction::DisableFailed(_))));
        let success = scan.service_errors.is_empty() && disable_failures == 0;

        info!(
            agent = %self.name,
            tested = outcomes.len(),
            failed,
            disabled,
            disable_failures,
            "Autoheal cycle complete"
        );

        let mut metadata: HashMap<String, Value> = HashMap::new();
        metadata.insert("targets".into(), json!(outcomes.len()));
        metadata.insert("failed".into(), json!(failed));
        metadata.insert("disabled".into(), json!(disabled));
        metadata.insert("disable_failures".into(), json!(disable_failures));
        metadata.insert("skipped_disabled".into(), json!(scan.skipped_disabled));
        if !scan.service_errors.is_empty() {
            metadata.insert("service_errors".into(), json!(scan.service_errors));
        }
        if !persistence_errors.is_empty() {
            metadata.insert("persistence_errors".into(), json!(persistence_errors));
        }

        Ok(AgentRunResult::new(&self.name, started_at, success, outcomes, metadata))
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{AgentMetrics, AgentRunResult, Event, EventType, RemediationAction, TargetOutcome};
use super::event_log::EventLog;

pub const DEFAULT_UNHEALTHY_THRESHOLD: u64 = 3;

/// Change in an agent's health caused by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthTransition {
    BecameUnhealthy(u64),
    Recovered,
}

/// Fleet-level view of agent health.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub total_agents: usize,
    pub healthy_agents: usize,
    pub unhealthy_agents: usize,
    pub health_percentage: f64,
    pub unhealthy: Vec<String>,
    pub total_events_logged: usize,
    pub recent_events: Vec<Event>,
    pub agents: BTreeMap<String, AgentMetrics>,
}

/// Per-agent run accounting plus the events that describe each run.
pub struct MetricsRegistry {
    metrics: DashMap<String, AgentMetrics>,
    events: Arc<EventLog>,
    unhealthy_threshold: u64,
}

impl MetricsRegistry {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            metrics: DashMap::new(),
            events,
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
        }
    }

    /// Consecutive failed runs after which an agent is marked unhealthy.
    pub fn with_unhealthy_threshold(mut self, threshold: u64) -> Self {
        self.unhealthy_threshold = threshold.max(1);
        self
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Create a zeroed entry so an agent shows up before its first run.
    pub fn ensure(&self, agent_name: &str) {
        self.metrics.entry(agent_name.to_string()).or_default();
    }

    /// Fold a completed run into the agent's metrics and append the run
    /// summary plus one event per failed or remediated target.
    pub async fn record_run(&self, result: &AgentRunResult) {
        let name = result.agent_name.as_str();
        let transition = {
            let mut entry = self.metrics.entry(name.to_string()).or_default();
            entry.record(result.success, result.duration_ms(), result.finished_at, result.error_summary());
            update_health(&mut entry, self.unhealthy_threshold, result.finished_at)
        };

        self.events.record(summary_event(result)).await;

        match transition {
            Some(HealthTransition::BecameUnhealthy(failures)) => {
                warn!(agent = name, failures, "Agent marked unhealthy");
                let event = Event::error(
                    EventType::AgentUnhealthy,
                    format!("Agent {} marked unhealthy: {} consecutive failures", name, failures),
                )
                .for_agent(name)
                .with_meta("consecutive_failures", failures);
                self.events.record(event).await;
            }
            Some(HealthTransition::Recovered) => {
                info!(agent = name, "Agent healthy again");
                let event = Event::info(EventType::AgentRecovered, format!("Agent {} recovered", name))
                    .for_agent(name);
                self.events.record(event).await;
            }
            None => {}
        }

        for outcome in &result.outcomes {
            if let Some(event) = outcome_event(name, outcome) {
                self.events.record(event).await;
            }
        }

        if let Some(Value::Array(errors)) = result.metadata.get("persistence_errors") {
            for err in errors {
                let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
                let event = Event::error(EventType::PersistenceFailed, format!("Audit write failed: {}", message))
                    .for_agent(name)
                    .with_meta("run_id", result.id.to_string());
                self.events.record(event).await;
            }
        }
    }

    pub fn get(&self, agent_name: &str) -> Option<AgentMetrics> {
        self.metrics.get(agent_name).map(|m| m.value().clone())
    }

    /// Every agent's metrics, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, AgentMetrics> {
        self.metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Names of agents currently marked unhealthy, sorted.
    pub fn unhealthy_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .metrics
            .iter()
            .filter(|e| !e.value().is_healthy())
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn summary(&self, recent: usize) -> MonitorSummary {
        let agents = self.snapshot();
        let unhealthy: Vec<String> = agents
            .iter()
            .filter(|(_, m)| !m.is_healthy())
            .map(|(name, _)| name.clone())
            .collect();
        let total = agents.len();
        let healthy = total - unhealthy.len();
        MonitorSummary {
            total_agents: total,
            healthy_agents: healthy,
            unhealthy_agents: unhealthy.len(),
            health_percentage: if total == 0 { 0.0 } else { healthy as f64 / total as f64 * 100.0 },
            unhealthy,
            total_events_logged: self.events.len(),
            recent_events: self.events.recent(recent),
            agents,
        }
    }
}

/// Flip the health flag when a run crosses the threshold or ends a streak.
/// Only the crossing run reports a transition.
fn update_health(metrics: &mut AgentMetrics, threshold: u64, at: DateTime<Utc>) -> Option<HealthTransition> {
    if metrics.consecutive_failures == 0 {
        return metrics.unhealthy_since.take().map(|_| HealthTransition::Recovered);
    }
    if metrics.consecutive_failures >= threshold && metrics.unhealthy_since.is_none() {
        metrics.unhealthy_since = Some(at);
        return Some(HealthTransition::BecameUnhealthy(metrics.consecutive_failures));
    }
    None
}

fn summary_event(result: &AgentRunResult) -> Event {
    let total = result.outcomes.len();
    let failed = result.failed_outcomes().count();
    let event = if result.success {
        Event::info(
            EventType::RunCompleted,
            format!("Agent {} completed: {}/{} targets healthy", result.agent_name, total - failed, total),
        )
    } else {
        let reason = result.error_summary().unwrap_or_default();
        Event::error(
            EventType::RunFailed,
            format!("Agent {} failed: {}", result.agent_name, reason),
        )
    };
    event
        .for_agent(&result.agent_name)
        .with_meta("run_id", result.id.to_string())
        .with_meta("duration_ms", result.duration_ms())
        .with_meta("targets", total)
        .with_meta("failed", failed)
}

fn outcome_event(agent_name: &str, outcome: &TargetOutcome) -> Option<Event> {
    let identity = format!("{} indexer {} ({})", outcome.service, outcome.target_name, outcome.target_id);
    let reason = outcome.message.clone().unwrap_or_else(|| "unknown error".to_string());

    let event = match &outcome.action {
        Some(RemediationAction::Disabled) => Event::warning(
            EventType::TargetDisabled,
            format!("Disabled {}: {}", identity, reason),
        ),
        Some(RemediationAction::DisableFailed(err)) => Event::error(
            EventType::DisableFailed,
            format!("Failed to disable {}: {}", identity, err),
        )
        .with_meta("disable_error", err.clone()),
        Some(RemediationAction::AlreadyDisabled) | None => {
            if outcome.success {
                return None;
            }
            if outcome.is_circuit_open() {
                Event::info(EventType::TargetFailed, format!("Skipped {}: circuit open", identity))
            } else {
                Event::warning(EventType::TargetFailed, format!("{} failed: {}", identity, reason))
            }
        }
    };

    let mut event = event
        .for_agent(agent_name)
        .with_meta("service", outcome.service.clone())
        .with_meta("target_id", outcome.target_id)
        .with_meta("target_name", outcome.target_name.clone())
        .with_meta("reason", reason);
    if let Some(kind) = outcome.error_kind {
        event = event.with_meta("error_kind", kind.as_str());
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use chrono::Utc;
    use crate::models::{ProbeResult, Severity, Target};

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(Arc::new(EventLog::new(100)))
    }

    fn outcome(id: i64, success: bool) -> TargetOutcome {
        let target = Target::new(id, &format!("T{}", id), true);
        let probe = if success { ProbeResult::passed() } else { ProbeResult::failed("unreachable") };
        TargetOutcome::from_probe("radarr", &target, probe)
    }

    #[tokio::test]
    async fn test_record_run_updates_metrics() {
        let reg = registry();
        let ok = AgentRunResult::new("health", Utc::now(), true, vec![outcome(1, true)], HashMap::new());
        let bad = AgentRunResult::failure("health", Utc::now(), "boom");
        reg.record_run(&ok).await;
        reg.record_run(&bad).await;

        let m = reg.get("health").unwrap();
        assert_eq!(m.total_runs, 2);
        assert_eq!(m.successful_runs, 1);
        assert_eq!(m.failed_runs, 1);
        assert!(m.last_run_at.is_some());
        assert_eq!(m.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_failed_run_appends_error_event() {
        let reg = registry();
        reg.record_run(&AgentRunResult::failure("autoheal", Utc::now(), "panicked")).await;
        let events = reg.events().recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::RunFailed);
        assert_eq!(events[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_remediation_events() {
        let reg = registry();
        let mut disabled = outcome(2, false);
        disabled.action = Some(RemediationAction::Disabled);
        let mut crashed = outcome(3, false);
        crashed.action = Some(RemediationAction::DisableFailed("503".into()));
        let result = AgentRunResult::new(
            "autoheal",
            Utc::now(),
            true,
            vec![outcome(1, true), disabled, crashed],
            HashMap::new(),
        );
        reg.record_run(&result).await;

        let disabled_events = reg.events().query(None, Some(EventType::TargetDisabled), 10);
        assert_eq!(disabled_events.len(), 1);
        assert_eq!(disabled_events[0].severity, Severity::Warning);
        assert_eq!(disabled_events[0].metadata["target_id"], 2);
        assert_eq!(disabled_events[0].metadata["reason"], "unreachable");

        let failed = reg.events().query(None, Some(EventType::DisableFailed), 10);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_persistence_errors_become_events() {
        let reg = registry();
        let mut metadata = HashMap::new();
        metadata.insert("persistence_errors".to_string(), serde_json::json!(["disk full"]));
        let result = AgentRunResult::new("autoheal", Utc::now(), true, Vec::new(), metadata);
        reg.record_run(&result).await;

        let events = reg.events().query(None, Some(EventType::PersistenceFailed), 10);
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains("disk full"));
    }

    #[tokio::test]
    async fn test_unhealthy_after_threshold_fires_once() {
        let reg = registry();
        for _ in 0..2 {
            reg.record_run(&AgentRunResult::failure("health", Utc::now(), "down")).await;
        }
        assert!(reg.get("health").unwrap().is_healthy());
        assert!(reg.unhealthy_agents().is_empty());

        for _ in 0..3 {
            reg.record_run(&AgentRunResult::failure("health", Utc::now(), "down")).await;
        }
        assert!(!reg.get("health").unwrap().is_healthy());
        assert_eq!(reg.unhealthy_agents(), vec!["health".to_string()]);

        let marked = reg.events().query(Some("health"), Some(EventType::AgentUnhealthy), 10);
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].severity, Severity::Error);
        assert_eq!(marked[0].metadata["consecutive_failures"], 3);
    }

    #[tokio::test]
    async fn test_success_recovers_unhealthy_agent() {
        let reg = MetricsRegistry::new(Arc::new(EventLog::new(100))).with_unhealthy_threshold(1);
        reg.record_run(&AgentRunResult::failure("autoheal", Utc::now(), "down")).await;
        assert_eq!(reg.unhealthy_agents(), vec!["autoheal".to_string()]);

        let ok = AgentRunResult::new("autoheal", Utc::now(), true, Vec::new(), HashMap::new());
        reg.record_run(&ok).await;
        assert!(reg.get("autoheal").unwrap().is_healthy());
        assert_eq!(reg.events().query(None, Some(EventType::AgentRecovered), 10).len(), 1);

        reg.record_run(&ok).await;
        assert_eq!(reg.events().query(None, Some(EventType::AgentRecovered), 10).len(), 1);
    }

    #[tokio::test]
    async fn test_summary_counts_health() {
        let reg = MetricsRegistry::new(Arc::new(EventLog::new(100))).with_unhealthy_threshold(1);
        reg.ensure("health");
        reg.record_run(&AgentRunResult::failure("autoheal", Utc::now(), "down")).await;

        let summary = reg.summary(5);
        assert_eq!(summary.total_agents, 2);
        assert_eq!(summary.healthy_agents, 1);
        assert_eq!(summary.unhealthy_agents, 1);
        assert!((summary.health_percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.unhealthy, vec!["autoheal".to_string()]);
        assert_eq!(summary.total_events_logged, 2);
        assert_eq!(summary.recent_events.len(), 2);
    }

    #[test]
    fn test_empty_summary() {
        let summary = registry().summary(10);
        assert_eq!(summary.total_agents, 0);
        assert_eq!(summary.health_percentage, 0.0);
    }

    #[test]
    fn test_snapshot_sorted_and_ensure() {
        let reg = registry();
        reg.ensure("zeta");
        reg.ensure("alpha");
        let names: Vec<_> = reg.snapshot().into_keys().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(reg.get("alpha").unwrap().total_runs, 0);
    }
}

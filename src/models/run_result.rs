use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{ErrorKind, GuardError};
use super::target::{ProbeResult, Target};

/// What the remediation step did for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum RemediationAction {
    Disabled,
    AlreadyDisabled,
    DisableFailed(String),
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::AlreadyDisabled => "already_disabled",
            Self::DisableFailed(_) => "disable_failed",
        }
    }
}

/// Result for a single target within one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub service: String,
    pub target_id: i64,
    pub target_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RemediationAction>,
}

impl TargetOutcome {
    /// Outcome of a probe that reached the service.
    pub fn from_probe(service: &str, target: &Target, probe: ProbeResult) -> Self {
        Self {
            service: service.to_string(),
            target_id: target.id,
            target_name: target.display_name(),
            success: probe.success,
            // A reachable target that reports a failing test is a permanent
            // failure for this cycle; nothing about it is retryable.
            error_kind: if probe.success { None } else { Some(ErrorKind::Permanent) },
            message: probe.error_message,
            from_cache: false,
            action: None,
        }
    }

    /// Outcome of a probe that never produced a service answer.
    pub fn from_error(service: &str, target: &Target, err: &GuardError) -> Self {
        Self {
            service: service.to_string(),
            target_id: target.id,
            target_name: target.display_name(),
            success: false,
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
            from_cache: false,
            action: None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        self.error_kind == Some(ErrorKind::CircuitOpen)
    }
}

/// One completed agent cycle. Immutable once returned by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub id: Uuid,
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub outcomes: Vec<TargetOutcome>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AgentRunResult {
    pub fn new(
        agent_name: &str,
        started_at: DateTime<Utc>,
        success: bool,
        outcomes: Vec<TargetOutcome>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name: agent_name.to_string(),
            started_at,
            finished_at: Utc::now(),
            success,
            outcomes,
            metadata,
        }
    }

    /// A failed run with no per-target outcomes, used when the agent itself
    /// errored or panicked.
    pub fn failure(agent_name: &str, started_at: DateTime<Utc>, error: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), Value::String(error.to_string()));
        Self::new(agent_name, started_at, false, Vec::new(), metadata)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn failed_outcomes(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Short error description for metrics, if the run failed.
    pub fn error_summary(&self) -> Option<String> {
        if self.success {
            return None;
        }
        if let Some(Value::String(err)) = self.metadata.get("error") {
            return Some(err.clone());
        }
        let failed = self.failed_outcomes().count();
        if failed > 0 {
            return Some(format!("{} of {} targets failed", failed, self.outcomes.len()));
        }
        if let Some(Value::Array(errors)) = self.metadata.get("service_errors") {
            if let Some(Value::String(first)) = errors.first() {
                return Some(first.clone());
            }
        }
        Some("run failed".to_string())
    }
}

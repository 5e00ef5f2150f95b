use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunCompleted,
    RunFailed,
    TickSkipped,
    TargetFailed,
    TargetDisabled,
    DisableFailed,
    PersistenceFailed,
    AgentUnhealthy,
    AgentRecovered,
    OrchestratorStarted,
    OrchestratorStopped,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunCompleted => "run_completed",
            Self::RunFailed => "run_failed",
            Self::TickSkipped => "tick_skipped",
            Self::TargetFailed => "target_failed",
            Self::TargetDisabled => "target_disabled",
            Self::DisableFailed => "disable_failed",
            Self::PersistenceFailed => "persistence_failed",
            Self::AgentUnhealthy => "agent_unhealthy",
            Self::AgentRecovered => "agent_recovered",
            Self::OrchestratorStarted => "orchestrator_started",
            Self::OrchestratorStopped => "orchestrator_stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "run_completed" => Some(Self::RunCompleted),
            "run_failed" => Some(Self::RunFailed),
            "tick_skipped" => Some(Self::TickSkipped),
            "target_failed" => Some(Self::TargetFailed),
            "target_disabled" => Some(Self::TargetDisabled),
            "disable_failed" => Some(Self::DisableFailed),
            "persistence_failed" => Some(Self::PersistenceFailed),
            "agent_unhealthy" => Some(Self::AgentUnhealthy),
            "agent_recovered" => Some(Self::AgentRecovered),
            "orchestrator_started" => Some(Self::OrchestratorStarted),
            "orchestrator_stopped" => Some(Self::OrchestratorStopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            agent_name: None,
            severity,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn info(event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(event_type, Severity::Info, message)
    }

    pub fn warning(event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(event_type, Severity::Warning, message)
    }

    pub fn error(event_type: EventType, message: impl Into<String>) -> Self {
        Self::new(event_type, Severity::Error, message)
    }

    pub fn for_agent(mut self, agent_name: &str) -> Self {
        self.agent_name = Some(agent_name.to_string());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

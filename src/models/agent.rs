use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution priority. Lower value runs first when ordering is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPriority {
    Critical = 1,
    High = 2,
    #[default]
    Normal = 3,
    Low = 4,
}

impl AgentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for AgentPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration record for an agent. Immutable once handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub priority: AgentPriority,
    pub enabled: bool,
    /// Timer period. `None` registers an on-demand agent with no timer.
    #[serde(with = "interval_secs")]
    pub interval: Option<Duration>,
}

impl AgentDescriptor {
    pub fn new(name: &str, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            priority: AgentPriority::Normal,
            enabled: true,
            interval: Some(interval),
        }
    }

    pub fn on_demand(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: AgentPriority::Normal,
            enabled: true,
            interval: None,
        }
    }

    pub fn with_priority(mut self, priority: AgentPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

mod interval_secs {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}

/// Whether an agent currently has a run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
}

/// Per-agent accumulator. Counters only ever grow while the process lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub consecutive_failures: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_duration_ms: u64,
    pub average_duration_ms: f64,
    pub last_error: Option<String>,
    /// Set when consecutive failures reach the unhealthy threshold, cleared
    /// by the next successful run.
    pub unhealthy_since: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    /// Fold one completed run into the accumulator.
    pub fn record(&mut self, success: bool, duration_ms: u64, finished_at: DateTime<Utc>, error: Option<String>) {
        self.total_runs += 1;
        if success {
            self.successful_runs += 1;
            self.consecutive_failures = 0;
        } else {
            self.failed_runs += 1;
            self.consecutive_failures += 1;
            self.last_error = error;
        }
        self.last_run_at = Some(finished_at);
        self.last_duration_ms = duration_ms;
        // Cumulative mean over every run so far.
        let n = self.total_runs as f64;
        self.average_duration_ms += (duration_ms as f64 - self.average_duration_ms) / n;
    }

    pub fn is_healthy(&self) -> bool {
        self.unhealthy_since.is_none()
    }

    /// Success rate as a percentage; 0 before the first run.
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }
        self.successful_runs as f64 / self.total_runs as f64 * 100.0
    }
}

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::GuardError;
use crate::models::TargetKey;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected without touching the network.
    Open,
    /// One trial call is allowed to probe recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial is allowed.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Mutable state for one target key. Only touched under its own mutex.
#[derive(Debug)]
struct BreakerCell {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    opened_at: Option<Instant>,
    open_until: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl BreakerCell {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            open_until: None,
            trial_in_flight: false,
        }
    }

    fn open(&mut self, reset_timeout: Duration) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.open_until = chrono::Duration::from_std(reset_timeout)
            .ok()
            .map(|d| Utc::now() + d);
        self.trial_in_flight = false;
    }
}

/// Point-in-time view of a breaker, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub target_id: i64,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub open_until: Option<DateTime<Utc>>,
}

/// Per-target circuit breakers.
///
/// The map is sharded and every breaker has its own mutex, so calls to
/// unrelated targets never wait on each other.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    cells: DashMap<TargetKey, Arc<Mutex<BreakerCell>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            cells: DashMap::new(),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn cell(&self, key: &TargetKey) -> Arc<Mutex<BreakerCell>> {
        if let Some(existing) = self.cells.get(key) {
            return existing.value().clone();
        }
        self.cells
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(BreakerCell::new())))
            .value()
            .clone()
    }

    fn lock(cell: &Mutex<BreakerCell>) -> MutexGuard<'_, BreakerCell> {
        cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask permission to call `key`.
    ///
    /// Returns `CircuitOpen` while the circuit is open, and while a half-open
    /// trial is already in flight. A rejection is not a failure and leaves the
    /// counter untouched. The trial slot is held by the returned permit until
    /// it is settled or dropped.
    pub fn try_acquire(&self, key: &TargetKey) -> Result<BreakerPermit<'_>, GuardError> {
        let cell = self.cell(key);
        let mut cell = Self::lock(&cell);
        let trial = match cell.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = cell
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if !elapsed {
                    debug!(target_key = %key, "Circuit open, rejecting call");
                    return Err(GuardError::CircuitOpen(key.to_string()));
                }
                info!(target_key = %key, "Circuit breaker half-open, allowing trial call");
                cell.state = CircuitState::HalfOpen;
                true
            }
            CircuitState::HalfOpen => {
                if cell.trial_in_flight {
                    debug!(target_key = %key, "Half-open trial in flight, rejecting call");
                    return Err(GuardError::CircuitOpen(key.to_string()));
                }
                true
            }
        };
        if trial {
            cell.trial_in_flight = true;
        }
        Ok(BreakerPermit {
            registry: self,
            key: key.clone(),
            trial,
            settled: false,
        })
    }

    pub fn record_success(&self, key: &TargetKey) {
        let cell = self.cell(key);
        let mut cell = Self::lock(&cell);
        if cell.state != CircuitState::Closed {
            info!(target_key = %key, from = %cell.state, "Circuit breaker closing after successful call");
        }
        cell.state = CircuitState::Closed;
        cell.consecutive_failures = 0;
        cell.opened_at = None;
        cell.open_until = None;
        cell.trial_in_flight = false;
    }

    pub fn record_failure(&self, key: &TargetKey) {
        let cell = self.cell(key);
        let mut cell = Self::lock(&cell);
        cell.consecutive_failures = cell.consecutive_failures.saturating_add(1);
        cell.last_failure_at = Some(Utc::now());

        match cell.state {
            CircuitState::Closed => {
                if cell.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        target_key = %key,
                        failures = cell.consecutive_failures,
                        reset_secs = self.config.reset_timeout.as_secs(),
                        "Circuit breaker opening due to failures"
                    );
                    cell.open(self.config.reset_timeout);
                }
            }
            CircuitState::HalfOpen => {
                warn!(target_key = %key, "Circuit breaker re-opening after failed trial");
                cell.open(self.config.reset_timeout);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, without triggering the open to half-open transition.
    pub fn state(&self, key: &TargetKey) -> CircuitState {
        match self.cells.get(key) {
            Some(cell) => Self::lock(cell.value()).state,
            None => CircuitState::Closed,
        }
    }

    pub fn snapshot(&self, key: &TargetKey) -> Option<BreakerSnapshot> {
        let cell = self.cells.get(key)?.value().clone();
        let cell = Self::lock(&cell);
        Some(BreakerSnapshot {
            service: key.service.clone(),
            target_id: key.target_id,
            state: cell.state,
            consecutive_failures: cell.consecutive_failures,
            last_failure_at: cell.last_failure_at,
            open_until: cell.open_until,
        })
    }

    /// Every known breaker, sorted by key.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut keys: Vec<TargetKey> = self.cells.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys.iter().filter_map(|k| self.snapshot(k)).collect()
    }

    /// Force a breaker back to closed.
    pub fn reset(&self, key: &TargetKey) {
        if let Some(cell) = self.cells.get(key) {
            let mut cell = Self::lock(cell.value());
            *cell = BreakerCell::new();
            info!(target_key = %key, "Circuit breaker reset");
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Admission granted by [`CircuitBreakerRegistry::try_acquire`].
///
/// Settle it with the call's outcome. A half-open trial permit dropped
/// without an outcome (the caller was cancelled or panicked) counts as a
/// failed trial and re-opens the circuit.
#[must_use = "settle the permit with the call's outcome"]
pub struct BreakerPermit<'a> {
    registry: &'a CircuitBreakerRegistry,
    key: TargetKey,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit holds the single half-open trial slot.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeeded(mut self) {
        self.settled = true;
        self.registry.record_success(&self.key);
    }

    pub fn failed(mut self) {
        self.settled = true;
        self.registry.record_failure(&self.key);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.settled || !self.trial {
            return;
        }
        warn!(target_key = %self.key, "Half-open trial abandoned without a result");
        self.registry.record_failure(&self.key);
    }
}

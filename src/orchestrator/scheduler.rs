use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::agents::autoheal::panic_message;
use crate::agents::Agent;
use crate::audit::{EventLog, MetricsRegistry};
use crate::errors::GuardError;
use crate::models::{AgentDescriptor, AgentMetrics, AgentRunResult, Event, EventType, RunState};
use super::slot::{AgentSlot, RunGuard};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    #[serde(flatten)]
    pub descriptor: AgentDescriptor,
    pub state: RunState,
    pub metrics: AgentMetrics,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub name: String,
    pub running: bool,
    pub uptime_seconds: Option<f64>,
    pub agents: Vec<AgentStatus>,
}

/// Executes one claimed run and records it. Cloned into every task.
#[derive(Clone)]
struct Runner {
    metrics: Arc<MetricsRegistry>,
    tracker: TaskTracker,
}

impl Runner {
    /// Run on a tracked task so the run finishes even if the caller goes away.
    async fn spawn_run(&self, guard: RunGuard) -> Result<AgentRunResult, GuardError> {
        let runner = self.clone();
        let name = guard.slot().descriptor.name.clone();
        self.tracker
            .spawn(async move { runner.execute(guard).await })
            .await
            .map_err(|e| GuardError::Internal(format!("Run task for {} failed: {}", name, e)))
    }

    async fn execute(&self, guard: RunGuard) -> AgentRunResult {
        let slot = guard.slot().clone();
        let name = slot.descriptor.name.as_str();
        let started_at = Utc::now();
        let clock = Instant::now();
        debug!(agent = %name, "Agent run starting");

        let mut result = match AssertUnwindSafe(slot.agent.run()).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!(agent = %name, error = %e, "Agent run returned an error");
                AgentRunResult::failure(name, started_at, &e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(agent = %name, panic = %reason, "Agent run panicked");
                AgentRunResult::failure(name, started_at, &format!("agent panicked: {}", reason))
            }
        };
        result.agent_name = name.to_string();

        // Hold the guard until the run is recorded so runs of one agent are
        // recorded in the order they ran.
        self.metrics.record_run(&result).await;
        drop(guard);
        info!(
            agent = %name,
            success = result.success,
            targets = result.outcomes.len(),
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "Agent run finished"
        );
        result
    }
}

/// Owns registered agents, their timers and the one-run-per-agent guarantee.
pub struct Orchestrator {
    name: String,
    agents: DashMap<String, Arc<AgentSlot>>,
    runner: Runner,
    events: Arc<EventLog>,
    cancel: CancellationToken,
    started: AtomicBool,
    started_at: Mutex<Option<Instant>>,
}

impl Orchestrator {
    pub fn new(name: &str, metrics: Arc<MetricsRegistry>) -> Self {
        let events = metrics.events().clone();
        Self {
            name: name.to_string(),
            agents: DashMap::new(),
            runner: Runner {
                metrics,
                tracker: TaskTracker::new(),
            },
            events,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            started_at: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.runner.metrics
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }

    /// Register an agent under its descriptor's name. Registering after
    /// `start` schedules it immediately.
    pub fn register(&self, descriptor: AgentDescriptor, agent: Arc<dyn Agent>) -> Result<(), GuardError> {
        let name = descriptor.name.clone();
        let slot = match self.agents.entry(name.clone()) {
            Entry::Occupied(_) => return Err(GuardError::DuplicateAgent(name)),
            Entry::Vacant(v) => v.insert(Arc::new(AgentSlot::new(descriptor, agent))).value().clone(),
        };
        self.runner.metrics.ensure(&name);
        info!(
            agent = %name,
            priority = %slot.descriptor.priority,
            interval_secs = slot.descriptor.interval.map(|d| d.as_secs_f64()),
            enabled = slot.descriptor.enabled,
            "Agent registered"
        );

        if self.is_running() {
            self.schedule(slot);
        }
        Ok(())
    }

    /// Start one timer loop per enabled agent with an interval.
    pub async fn start(&self) {
        if self.cancel.is_cancelled() {
            warn!(orchestrator = %self.name, "Orchestrator already shut down, not starting");
            return;
        }
        if self.started.swap(true, Ordering::AcqRel) {
            debug!(orchestrator = %self.name, "Orchestrator already started");
            return;
        }
        *lock(&self.started_at) = Some(Instant::now());

        let slots: Vec<Arc<AgentSlot>> = self.agents.iter().map(|e| e.value().clone()).collect();
        for slot in slots {
            self.schedule(slot);
        }

        self.events
            .record(
                Event::info(EventType::OrchestratorStarted, format!("Orchestrator {} started", self.name))
                    .with_meta("agents", self.agents.len()),
            )
            .await;
    }

    fn schedule(&self, slot: Arc<AgentSlot>) {
        let Some(period) = slot.descriptor.interval else {
            debug!(agent = %slot.descriptor.name, "On-demand agent, no timer");
            return;
        };
        if !slot.descriptor.enabled {
            info!(agent = %slot.descriptor.name, "Agent disabled, not scheduling");
            return;
        }
        // `register` and `start` can both reach here for the same slot.
        if !slot.claim_schedule() {
            debug!(agent = %slot.descriptor.name, "Agent already scheduled");
            return;
        }
        let runner = self.runner.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        self.runner
            .tracker
            .spawn(schedule_loop(slot, period, runner, events, cancel));
    }

    /// Run one cycle now, outside the timer, under the same run guard.
    pub async fn run_now(&self, name: &str) -> Result<AgentRunResult, GuardError> {
        let slot = self
            .agents
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| GuardError::UnknownAgent(name.to_string()))?;
        if !slot.descriptor.enabled {
            return Err(GuardError::AgentDisabled(name.to_string()));
        }
        let guard = slot
            .try_begin()
            .ok_or_else(|| GuardError::AgentBusy(name.to_string()))?;
        info!(agent = %name, "Manual run triggered");
        self.runner.spawn_run(guard).await
    }

    /// Every agent's descriptor, metrics and run state, ordered by priority
    /// then name.
    pub fn status(&self) -> OrchestratorStatus {
        let mut agents: Vec<AgentStatus> = self
            .agents
            .iter()
            .map(|e| {
                let slot = e.value();
                let metrics = self.runner.metrics.get(&slot.descriptor.name).unwrap_or_default();
                AgentStatus {
                    descriptor: slot.descriptor.clone(),
                    state: slot.state(),
                    success_rate: metrics.success_rate(),
                    metrics,
                }
            })
            .collect();
        agents.sort_by(|a, b| {
            a.descriptor
                .priority
                .cmp(&b.descriptor.priority)
                .then_with(|| a.descriptor.name.cmp(&b.descriptor.name))
        });

        let running = self.is_running();
        let uptime_seconds = if running {
            lock(&self.started_at).map(|at| at.elapsed().as_secs_f64())
        } else {
            None
        };
        OrchestratorStatus {
            name: self.name.clone(),
            running,
            uptime_seconds,
            agents,
        }
    }

    /// Stop the timers and wait for in-flight runs to finish. In-flight runs
    /// are never cancelled.
    pub async fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!(orchestrator = %self.name, "Shutting down orchestrator");
        self.cancel.cancel();
        self.runner.tracker.close();
        self.runner.tracker.wait().await;
        self.started.store(false, Ordering::Release);
        self.events
            .record(Event::info(
                EventType::OrchestratorStopped,
                format!("Orchestrator {} stopped", self.name),
            ))
            .await;
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn schedule_loop(
    slot: Arc<AgentSlot>,
    period: Duration,
    runner: Runner,
    events: Arc<EventLog>,
    cancel: CancellationToken,
) {
    let name = slot.descriptor.name.clone();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(agent = %name, interval_secs = period.as_secs_f64(), "Agent scheduled");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match slot.try_begin() {
            Some(guard) => {
                let runner_for_task = runner.clone();
                runner.tracker.spawn(async move {
                    runner_for_task.execute(guard).await;
                });
            }
            None => {
                events
                    .record(
                        Event::info(
                            EventType::TickSkipped,
                            format!("Skipped scheduled run of {}: previous run still in progress", name),
                        )
                        .for_agent(&name),
                    )
                    .await;
            }
        }
    }
    debug!(agent = %name, "Schedule loop stopped");
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agents::Agent;
use crate::models::{AgentDescriptor, RunState};

/// A registered agent, its run guard and its timer claim.
pub struct AgentSlot {
    pub descriptor: AgentDescriptor,
    pub agent: Arc<dyn Agent>,
    running: AtomicBool,
    scheduled: AtomicBool,
}

impl AgentSlot {
    pub fn new(descriptor: AgentDescriptor, agent: Arc<dyn Agent>) -> Self {
        Self {
            descriptor,
            agent,
            running: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
        }
    }

    /// Claim the slot's timer loop. Only the first caller gets `true`.
    pub fn claim_schedule(&self) -> bool {
        self.scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the slot for one run. `None` if a run is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { slot: self.clone() })
    }

    pub fn state(&self) -> RunState {
        if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }
}

/// Releases the slot when dropped, including on panic or error.
pub struct RunGuard {
    slot: Arc<AgentSlot>,
}

impl RunGuard {
    pub fn slot(&self) -> &Arc<AgentSlot> {
        &self.slot
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::errors::GuardError;
    use crate::models::AgentRunResult;

    struct Noop;

    #[async_trait]
    impl Agent for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self) -> Result<AgentRunResult, GuardError> {
            Err(GuardError::Internal("unused".into()))
        }
    }

    #[test]
    fn test_guard_is_exclusive_and_released_on_drop() {
        let slot = Arc::new(AgentSlot::new(AgentDescriptor::on_demand("noop"), Arc::new(Noop)));
        let guard = slot.try_begin().unwrap();
        assert_eq!(slot.state(), RunState::Running);
        assert!(slot.try_begin().is_none());
        drop(guard);
        assert_eq!(slot.state(), RunState::Idle);
        assert!(slot.try_begin().is_some());
    }

    #[test]
    fn test_schedule_claimed_once() {
        let slot = AgentSlot::new(AgentDescriptor::on_demand("noop"), Arc::new(Noop));
        assert!(slot.claim_schedule());
        assert!(!slot.claim_schedule());
    }
}

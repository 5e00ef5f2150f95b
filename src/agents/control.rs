use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::cache::ResultCache;
use crate::errors::GuardError;
use crate::models::{Target, TargetKey, TargetPatch};
use crate::resilience::ResilientCaller;
use crate::services::TargetService;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOutcome {
    /// The service was updated.
    Changed,
    /// The target was already in the requested state; no call was made.
    Unchanged,
}

/// Enable/disable primitive for targets.
///
/// Idempotent against the last state it observed or set. Updates go through
/// retry and timeout but not the target's circuit breaker, since a target
/// whose breaker is open is exactly the one that may need disabling.
pub struct ControlPrimitive {
    caller: Arc<ResilientCaller>,
    cache: Arc<ResultCache>,
    known: DashMap<TargetKey, bool>,
}

impl ControlPrimitive {
    pub fn new(caller: Arc<ResilientCaller>, cache: Arc<ResultCache>) -> Self {
        Self {
            caller,
            cache,
            known: DashMap::new(),
        }
    }

    /// Record a target's enabled state as reported by its service.
    pub fn observe(&self, service: &str, target: &Target) {
        self.known.insert(TargetKey::new(service, target.id), target.enabled);
    }

    pub fn known_state(&self, service: &str, target_id: i64) -> Option<bool> {
        self.known.get(&TargetKey::new(service, target_id)).map(|v| *v)
    }

    pub async fn enable(&self, service: &dyn TargetService, target: &Target) -> Result<ControlOutcome, GuardError> {
        self.set_enabled(service, target, true).await
    }

    pub async fn disable(&self, service: &dyn TargetService, target: &Target) -> Result<ControlOutcome, GuardError> {
        self.set_enabled(service, target, false).await
    }

    async fn set_enabled(
        &self,
        service: &dyn TargetService,
        target: &Target,
        enabled: bool,
    ) -> Result<ControlOutcome, GuardError> {
        let key = TargetKey::new(service.name(), target.id);
        let current = self.known_state(service.name(), target.id).unwrap_or(target.enabled);
        if current == enabled {
            debug!(target_key = %key, enabled, "Target already in requested state");
            return Ok(ControlOutcome::Unchanged);
        }

        // Work from a copy; the caller's target is never touched.
        let desired = target.merged(&TargetPatch::set_enabled(enabled));
        let patch = TargetPatch::set_enabled(desired.enabled);
        let operation = if enabled { "enable_target" } else { "disable_target" };
        self.caller
            .call_unguarded(operation, || service.update_target(desired.id, &patch))
            .await?;

        self.known.insert(key.clone(), enabled);
        self.cache.invalidate(service.name(), Some(target.id));
        info!(
            target_key = %key,
            target_name = %desired.display_name(),
            enabled,
            "Target state changed"
        );
        Ok(ControlOutcome::Changed)
    }
}

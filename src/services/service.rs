use async_trait::async_trait;
use serde_json::Value;

use crate::errors::GuardError;
use crate::models::{ProbeResult, Target, TargetPatch};

/// Capability set every managed service exposes. Agents depend on this, not
/// on a concrete client.
#[async_trait]
pub trait TargetService: Send + Sync {
    /// Name used in cache and breaker keys, events and history.
    fn name(&self) -> &str;

    async fn list_targets(&self) -> Result<Vec<Target>, GuardError>;

    /// Ask the service to test one target. A reachable service reporting a
    /// failing target is `Ok(ProbeResult { success: false, .. })`.
    async fn test_target(&self, id: i64) -> Result<ProbeResult, GuardError>;

    /// Merge `patch` over the service's current copy of the target and save it.
    async fn update_target(&self, id: i64, patch: &TargetPatch) -> Result<Target, GuardError>;

    /// Create a target from a service-native definition. Services that
    /// cannot take new targets keep the default.
    async fn add_target(&self, _definition: &Value) -> Result<Target, GuardError> {
        Err(GuardError::Permanent(format!("{} does not accept new indexers", self.name())))
    }
}

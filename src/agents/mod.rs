pub mod probe;
pub mod control;
pub mod health;
pub mod autoheal;
pub mod discovery;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::errors::GuardError;
use crate::models::AgentRunResult;

pub use autoheal::{AutoHealAgent, AutoHealPolicy};
pub use control::{ControlOutcome, ControlPrimitive};
pub use discovery::{DiscoveryAgent, SourceFetcher};
pub use health::{HealthAgent, HealthAgentConfig};
pub use probe::{Prober, TargetScan};

/// One unit of scheduled or on-demand work.
///
/// Target-level failures belong in the returned result. An `Err` (or a
/// panic) means the agent itself could not run; the orchestrator turns it
/// into a failed run.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<AgentRunResult, GuardError>;
}

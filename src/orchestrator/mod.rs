pub mod slot;
pub mod scheduler;

pub use scheduler::{AgentStatus, Orchestrator, OrchestratorStatus};

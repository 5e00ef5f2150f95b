use axum::{
    extract::{Path, State},
    Json,
};
use crate::api::AppState;
use crate::errors::GuardError;
use crate::models::AgentRunResult;
use crate::orchestrator::OrchestratorStatus;

pub async fn list_agents(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.status())
}

/// Runs one cycle synchronously. The run continues even if the client
/// disconnects.
pub async fn run_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AgentRunResult>, GuardError> {
    state.orchestrator.run_now(&name).await.map(Json)
}

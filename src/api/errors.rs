use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use crate::errors::GuardError;

impl GuardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Config(_) => StatusCode::BAD_REQUEST,
            GuardError::UnknownAgent(_) | GuardError::NotFound(_) => StatusCode::NOT_FOUND,
            GuardError::AgentBusy(_) | GuardError::AgentDisabled(_) | GuardError::DuplicateAgent(_) => {
                StatusCode::CONFLICT
            }
            GuardError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::Transient(_)
            | GuardError::Timeout(_)
            | GuardError::Network(_)
            | GuardError::ServiceUnavailable(_)
            | GuardError::Authentication(_)
            | GuardError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(json!({"error": self.to_string()}))).into_response()
    }
}

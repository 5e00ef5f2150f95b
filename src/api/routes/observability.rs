use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::api::AppState;
use crate::audit::MonitorSummary;
use crate::models::EventType;

pub async fn get_metrics(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "agents": state.metrics.snapshot() }))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
    pub agent: Option<String>,
    pub event_type: Option<String>,
}

pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = query.limit.unwrap_or(50).min(1000);
    let event_type = match query.event_type.as_deref() {
        Some(raw) => Some(EventType::parse(raw).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("Unknown event type: {}", raw)})),
            )
        })?),
        None => None,
    };

    let events = state.events.query(query.agent.as_deref(), event_type, limit);
    Ok(Json(json!({ "events": events, "total": events.len() })))
}

#[derive(Deserialize)]
pub struct MonitorQuery {
    pub recent: Option<usize>,
}

/// Healthy/unhealthy agent counts plus the latest events.
pub async fn get_monitor(
    State(state): State<AppState>,
    Query(query): Query<MonitorQuery>,
) -> Json<MonitorSummary> {
    Json(state.metrics.summary(query.recent.unwrap_or(10).min(100)))
}

pub async fn get_cache_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.cache.stats()))
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Value> {
    let breakers = state.breakers.snapshots();
    Json(json!({ "breakers": breakers, "total": breakers.len() }))
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::api::AppState;
use crate::db::{RecordFilter, RecordKind};

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub service: Option<String>,
    pub target_id: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let Some(store) = state.store.as_ref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "Persistence is disabled"})),
        ));
    };

    let filter = RecordFilter {
        kind: RecordKind::Health,
        service: query.service,
        target_id: query.target_id,
        limit: query.limit.unwrap_or(100).min(1000),
        ..Default::default()
    };
    let records = store
        .query(filter)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))))?;

    Ok(Json(json!({ "records": records, "total": records.len() })))
}

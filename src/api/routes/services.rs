use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use crate::agents::probe::cacheable;
use crate::agents::ControlOutcome;
use crate::api::AppState;
use crate::errors::GuardError;
use crate::models::{Target, TargetOutcome};
use crate::services::TargetService;
use tracing::info;

#[derive(Serialize)]
pub struct ServiceTargetsResponse {
    pub service: String,
    pub count: usize,
    pub targets: Vec<Target>,
}

#[derive(Serialize)]
pub struct TargetActionResponse {
    pub service: String,
    pub target_id: i64,
    pub action: &'static str,
    pub outcome: ControlOutcome,
}

#[derive(Debug, Default, Serialize)]
pub struct ServiceStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub by_service: BTreeMap<String, ServiceStats>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub service_errors: BTreeMap<String, String>,
}

fn find_service(state: &AppState, name: &str) -> Result<Arc<dyn TargetService>, GuardError> {
    state
        .services
        .iter()
        .find(|s| s.name() == name)
        .cloned()
        .ok_or_else(|| GuardError::NotFound(format!("service {}", name)))
}

async fn fetch_targets(state: &AppState, service: &dyn TargetService) -> Result<Vec<Target>, GuardError> {
    let targets = state
        .prober
        .caller()
        .call_unguarded("list_targets", || service.list_targets())
        .await?;
    for target in &targets {
        state.control.observe(service.name(), target);
    }
    Ok(targets)
}

async fn find_target(state: &AppState, service: &dyn TargetService, id: i64) -> Result<Target, GuardError> {
    fetch_targets(state, service)
        .await?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| GuardError::NotFound(format!("{} indexer {}", service.name(), id)))
}

pub async fn list_services(State(state): State<AppState>) -> Json<Value> {
    let names: Vec<&str> = state.services.iter().map(|s| s.name()).collect();
    Json(json!({ "services": names, "total": names.len() }))
}

pub async fn list_targets(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ServiceTargetsResponse>, GuardError> {
    let svc = find_service(&state, &service)?;
    let targets = fetch_targets(&state, svc.as_ref()).await?;
    Ok(Json(ServiceTargetsResponse {
        service,
        count: targets.len(),
        targets,
    }))
}

/// Probe one target now, through its breaker. A failing target is a 200
/// with `success: false`; only an unknown service or target is an error.
pub async fn test_target(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, i64)>,
) -> Result<Json<TargetOutcome>, GuardError> {
    let svc = find_service(&state, &service)?;
    let target = find_target(&state, svc.as_ref(), id).await?;
    let outcome = state.prober.probe(svc.as_ref(), &target).await;
    if let Some(payload) = cacheable(&outcome) {
        state.cache.set(svc.name(), target.id, payload);
    }
    info!(service = %service, target_id = id, success = outcome.success, "On-demand target test");
    Ok(Json(outcome))
}

pub async fn enable_target(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, i64)>,
) -> Result<Json<TargetActionResponse>, GuardError> {
    set_enabled(state, service, id, true).await.map(Json)
}

pub async fn disable_target(
    State(state): State<AppState>,
    Path((service, id)): Path<(String, i64)>,
) -> Result<Json<TargetActionResponse>, GuardError> {
    set_enabled(state, service, id, false).await.map(Json)
}

async fn set_enabled(
    state: AppState,
    service: String,
    id: i64,
    enabled: bool,
) -> Result<TargetActionResponse, GuardError> {
    let svc = find_service(&state, &service)?;
    let target = find_target(&state, svc.as_ref(), id).await?;
    let outcome = if enabled {
        state.control.enable(svc.as_ref(), &target).await?
    } else {
        state.control.disable(svc.as_ref(), &target).await?
    };
    Ok(TargetActionResponse {
        service,
        target_id: id,
        action: if enabled { "enable" } else { "disable" },
        outcome,
    })
}

/// Enabled/disabled counts per service. A service that cannot be listed
/// is reported under `service_errors` and left out of the totals.
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let listings = futures::future::join_all(state.services.iter().map(|svc| {
        let state = &state;
        async move { (svc.name().to_string(), fetch_targets(state, svc.as_ref()).await) }
    }))
    .await;

    let mut by_service = BTreeMap::new();
    let mut service_errors = BTreeMap::new();
    for (name, listed) in listings {
        match listed {
            Ok(targets) => {
                let enabled = targets.iter().filter(|t| t.enabled).count();
                by_service.insert(
                    name,
                    ServiceStats {
                        total: targets.len(),
                        enabled,
                        disabled: targets.len() - enabled,
                    },
                );
            }
            Err(e) => {
                service_errors.insert(name, e.to_string());
            }
        }
    }

    Json(StatsResponse {
        timestamp: Utc::now(),
        total: by_service.values().map(|s: &ServiceStats| s.total).sum(),
        by_service,
        service_errors,
    })
}

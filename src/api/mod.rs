pub mod routes;
pub mod errors;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::agents::{ControlPrimitive, Prober};
use crate::app::App;
use crate::audit::{EventLog, MetricsRegistry};
use crate::cache::ResultCache;
use crate::db::AuditStore;
use crate::orchestrator::Orchestrator;
use crate::resilience::CircuitBreakerRegistry;
use crate::services::TargetService;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<MetricsRegistry>,
    pub events: Arc<EventLog>,
    pub cache: Arc<ResultCache>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub services: Arc<[Arc<dyn TargetService>]>,
    pub prober: Arc<Prober>,
    pub control: Arc<ControlPrimitive>,
    /// `None` when persistence is disabled.
    pub store: Option<Arc<dyn AuditStore>>,
}

impl AppState {
    pub fn from_app(app: &App) -> Self {
        Self {
            orchestrator: app.orchestrator.clone(),
            metrics: app.metrics.clone(),
            events: app.events.clone(),
            cache: app.cache.clone(),
            breakers: app.breakers.clone(),
            services: app.services.clone().into(),
            prober: app.prober.clone(),
            control: app.control.clone(),
            store: app
                .database
                .clone()
                .map(|db| Arc::new(db) as Arc<dyn AuditStore>),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/agents", get(routes::agents::list_agents))
        .route("/api/agents/:name/run", post(routes::agents::run_agent))
        .route("/api/services", get(routes::services::list_services))
        .route("/api/services/:service/targets", get(routes::services::list_targets))
        .route("/api/services/:service/targets/:id/test", post(routes::services::test_target))
        .route("/api/services/:service/targets/:id/enable", post(routes::services::enable_target))
        .route("/api/services/:service/targets/:id/disable", post(routes::services::disable_target))
        .route("/api/stats", get(routes::services::get_stats))
        .route("/api/metrics", get(routes::observability::get_metrics))
        .route("/api/monitor", get(routes::observability::get_monitor))
        .route("/api/events", get(routes::observability::get_events))
        .route("/api/cache/stats", get(routes::observability::get_cache_stats))
        .route("/api/breakers", get(routes::observability::get_breakers))
        .route("/api/history", get(routes::history::get_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

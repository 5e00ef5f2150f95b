//! Builds every component from a [`GuardConfig`] and hands out shared handles.

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{AutoHealAgent, ControlPrimitive, DiscoveryAgent, HealthAgent, Prober, SourceFetcher};
use crate::audit::{EventLog, MetricsRegistry};
use crate::cache::ResultCache;
use crate::config::GuardConfig;
use crate::db::{AuditStore, Database};
use crate::errors::GuardError;
use crate::models::AgentDescriptor;
use crate::orchestrator::Orchestrator;
use crate::resilience::{CircuitBreakerRegistry, ResilientCaller};
use crate::services::{ArrHttpClient, ArrService, SourceHttpClient, TargetService};
use tracing::info;

pub const HEALTH_AGENT: &str = "health";
pub const AUTOHEAL_AGENT: &str = "autoheal";
pub const DISCOVERY_AGENT: &str = "discovery";

pub struct App {
    pub config: GuardConfig,
    pub services: Vec<Arc<dyn TargetService>>,
    pub prober: Arc<Prober>,
    pub control: Arc<ControlPrimitive>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub cache: Arc<ResultCache>,
    pub events: Arc<EventLog>,
    pub metrics: Arc<MetricsRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub database: Option<Database>,
}

impl App {
    /// Build HTTP-backed services and open the database if enabled.
    pub fn build(config: GuardConfig) -> Result<Self, GuardError> {
        let mut services: Vec<Arc<dyn TargetService>> = Vec::with_capacity(config.services.len());
        for svc in &config.services {
            let api_key = svc.api_key.as_deref().unwrap_or_default();
            let client = ArrHttpClient::new(&svc.url, api_key, svc.timeout())?;
            services.push(Arc::new(ArrService::new(&svc.name, svc.kind, client)));
            info!(service = %svc.name, kind = svc.kind.as_str(), url = %svc.url, "Service configured");
        }

        let database = if config.database.enabled {
            Some(Database::new(&config.database.path)?)
        } else {
            info!("Persistence disabled, audit history will not be stored");
            None
        };

        Self::with_services(config, services, database)
    }

    pub fn service(&self, name: &str) -> Option<&Arc<dyn TargetService>> {
        self.services.iter().find(|s| s.name() == name)
    }

    /// Wire the core around already-constructed services.
    pub fn with_services(
        config: GuardConfig,
        services: Vec<Arc<dyn TargetService>>,
        database: Option<Database>,
    ) -> Result<Self, GuardError> {
        let fetcher = Arc::new(SourceHttpClient::new(config.agents.discovery.timeout())?);
        Self::assemble(config, services, database, fetcher)
    }

    /// [`with_services`](Self::with_services) with an explicit source for
    /// discovery lists.
    pub fn assemble(
        config: GuardConfig,
        services: Vec<Arc<dyn TargetService>>,
        database: Option<Database>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<Self, GuardError> {
        let store: Option<Arc<dyn AuditStore>> = database
            .clone()
            .map(|db| Arc::new(db) as Arc<dyn AuditStore>);

        let breakers = Arc::new(CircuitBreakerRegistry::new(config.resilience.breaker()));
        let caller = Arc::new(ResilientCaller::new(
            breakers.clone(),
            config.resilience.retry(),
            config.resilience.call_timeout(),
        ));
        let cache = Arc::new(ResultCache::new(config.cache.cache_config()));
        let prober = Arc::new(Prober::new(caller.clone(), config.resilience.fan_out));
        let control = Arc::new(ControlPrimitive::new(caller.clone(), cache.clone()));

        let mut events = EventLog::new(config.events.max_events);
        if let Some(store) = &store {
            events = events.with_store(store.clone());
        }
        let events = Arc::new(events);
        let metrics = Arc::new(
            MetricsRegistry::new(events.clone()).with_unhealthy_threshold(config.events.unhealthy_threshold),
        );
        let orchestrator = Arc::new(Orchestrator::new(&config.app_name, metrics.clone()));

        let health = &config.agents.health;
        orchestrator.register(
            AgentDescriptor::new(HEALTH_AGENT, Duration::from_secs(health.interval_secs))
                .with_priority(health.priority)
                .with_enabled(health.enabled),
            Arc::new(HealthAgent::new(
                HEALTH_AGENT,
                services.clone(),
                prober.clone(),
                cache.clone(),
                health.agent_config(),
            )),
        )?;

        let autoheal = &config.agents.autoheal;
        let mut autoheal_agent = AutoHealAgent::new(
            AUTOHEAL_AGENT,
            services.clone(),
            prober.clone(),
            cache.clone(),
            control.clone(),
            autoheal.policy(),
        );
        if let Some(store) = store {
            autoheal_agent = autoheal_agent.with_store(store);
        }
        orchestrator.register(
            AgentDescriptor::new(AUTOHEAL_AGENT, Duration::from_secs(autoheal.interval_secs))
                .with_priority(autoheal.priority)
                .with_enabled(autoheal.enabled),
            Arc::new(autoheal_agent),
        )?;

        let discovery = &config.agents.discovery;
        if discovery.enabled {
            let mut agent = DiscoveryAgent::new(DISCOVERY_AGENT, discovery.sources.clone(), fetcher, caller);
            if let Some(sink) = &discovery.add_to {
                let service = services
                    .iter()
                    .find(|s| s.name() == sink.as_str())
                    .cloned()
                    .ok_or_else(|| GuardError::Config(format!("Discovery service '{}' is not configured", sink)))?;
                agent = agent.with_sink(service);
            }
            orchestrator.register(
                AgentDescriptor::new(DISCOVERY_AGENT, Duration::from_secs(discovery.interval_secs))
                    .with_priority(discovery.priority),
                Arc::new(agent),
            )?;
        }

        Ok(Self {
            config,
            services,
            prober,
            control,
            breakers,
            cache,
            events,
            metrics,
            orchestrator,
            database,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::MockService;
    use crate::config::{parse_config_str, GuardConfig};
    use crate::models::Target;

    fn config() -> GuardConfig {
        parse_config_str(
            r#"
services:
  - { name: radarr, kind: radarr, url: "http://localhost:7878", api_key: abc }
database:
  enabled: false
agents:
  autoheal:
    enabled: false
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_registers_both_agents() {
        let app = App::build(config()).unwrap();
        let status = app.orchestrator.status();
        assert_eq!(status.agents.len(), 2);
        assert_eq!(status.agents[0].descriptor.name, HEALTH_AGENT);
        assert!(!status.agents[1].descriptor.enabled);
        assert!(app.database.is_none());
    }

    struct OneList;

    #[async_trait::async_trait]
    impl SourceFetcher for OneList {
        async fn fetch(&self, _url: &str) -> Result<String, GuardError> {
            Ok("https://fresh.example\n".to_string())
        }
    }

    #[tokio::test]
    async fn test_discovery_registered_only_when_enabled() {
        let svc = Arc::new(MockService::new("radarr").with_target(Target::new(1, "A", true)));
        let mut config = config();
        config.agents.discovery.enabled = true;
        config.agents.discovery.sources = vec!["https://lists.example/new.txt".into()];
        config.agents.discovery.add_to = Some("radarr".into());
        let app = App::assemble(config, vec![svc.clone() as Arc<dyn TargetService>], None, Arc::new(OneList)).unwrap();

        let names: Vec<String> = app.orchestrator.status().agents.into_iter().map(|a| a.descriptor.name).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(names[2], DISCOVERY_AGENT);

        let result = app.orchestrator.run_now(DISCOVERY_AGENT).await.unwrap();
        assert!(result.success);
        assert_eq!(svc.added().len(), 1);
        assert_eq!(app.service("radarr").unwrap().list_targets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_with_services_runs_health_and_persists() {
        let svc = Arc::new(MockService::new("radarr").with_target(Target::new(1, "A", true)));
        let db = Database::in_memory().unwrap();
        let app = App::with_services(config(), vec![svc as Arc<dyn TargetService>], Some(db.clone())).unwrap();

        let result = app.orchestrator.run_now(HEALTH_AGENT).await.unwrap();
        assert!(result.success);
        assert_eq!(app.metrics.get(HEALTH_AGENT).unwrap().total_runs, 1);

        let stored = db
            .query(crate::db::RecordFilter {
                kind: crate::db::RecordKind::Event,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!stored.is_empty());
    }
}

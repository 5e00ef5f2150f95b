#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexguard::app::App;
use indexguard::config::{parse_config_str, GuardConfig};
use indexguard::db::Database;
use indexguard::errors::GuardError;
use indexguard::models::{ProbeResult, Target, TargetPatch};
use indexguard::services::TargetService;

/// How a fake indexer answers its test endpoint.
#[derive(Clone)]
pub enum Probe {
    Pass,
    Fail(&'static str),
    /// Fails on every other call, starting with a pass.
    Alternate,
    /// The test call itself errors with a refused connection.
    Unreachable,
}

/// In-memory indexer service with scripted probe and update behavior.
pub struct FakeService {
    name: String,
    targets: Mutex<Vec<Target>>,
    probes: HashMap<i64, Probe>,
    probe_delay: Option<Duration>,
    panicking_updates: HashSet<i64>,
    probe_calls: Mutex<HashMap<i64, u32>>,
    update_calls: Mutex<Vec<i64>>,
    total_probes: AtomicU32,
}

impl FakeService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            targets: Mutex::new(Vec::new()),
            probes: HashMap::new(),
            probe_delay: None,
            panicking_updates: HashSet::new(),
            probe_calls: Mutex::new(HashMap::new()),
            update_calls: Mutex::new(Vec::new()),
            total_probes: AtomicU32::new(0),
        }
    }

    pub fn target(mut self, id: i64, name: &str, probe: Probe) -> Self {
        self.targets.lock().unwrap().push(Target::new(id, name, true));
        self.probes.insert(id, probe);
        self
    }

    pub fn slow_probes(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    pub fn panic_on_update(mut self, id: i64) -> Self {
        self.panicking_updates.insert(id);
        self
    }

    pub fn update_calls(&self) -> Vec<i64> {
        self.update_calls.lock().unwrap().clone()
    }

    pub fn total_probes(&self) -> u32 {
        self.total_probes.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self, id: i64) -> bool {
        self.targets.lock().unwrap().iter().any(|t| t.id == id && t.enabled)
    }
}

#[async_trait]
impl TargetService for FakeService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_targets(&self) -> Result<Vec<Target>, GuardError> {
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn test_target(&self, id: i64) -> Result<ProbeResult, GuardError> {
        self.total_probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        let call = {
            let mut calls = self.probe_calls.lock().unwrap();
            let n = calls.entry(id).or_insert(0);
            *n += 1;
            *n
        };
        match self.probes.get(&id) {
            None => Err(GuardError::NotFound(format!("indexer {}", id))),
            Some(Probe::Pass) => Ok(ProbeResult::passed()),
            Some(Probe::Fail(msg)) => Ok(ProbeResult::failed(*msg)),
            Some(Probe::Alternate) if call % 2 == 1 => Ok(ProbeResult::passed()),
            Some(Probe::Alternate) => Ok(ProbeResult::failed("intermittent failure")),
            Some(Probe::Unreachable) => Err(GuardError::Network("connection refused".into())),
        }
    }

    async fn update_target(&self, id: i64, patch: &TargetPatch) -> Result<Target, GuardError> {
        self.update_calls.lock().unwrap().push(id);
        if self.panicking_updates.contains(&id) {
            panic!("indexer {} update handler crashed", id);
        }
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| GuardError::NotFound(format!("indexer {}", id)))?;
        *target = target.merged(patch);
        Ok(target.clone())
    }
}

/// Config with one service, no database, fast retries and the given overrides.
pub fn test_config(extra_yaml: &str) -> GuardConfig {
    let yaml = format!(
        r#"
services:
  - {{ name: radarr, kind: radarr, url: "http://localhost:7878", api_key: test-key }}
database:
  enabled: false
resilience:
  max_attempts: 1
{}
"#,
        extra_yaml
    );
    parse_config_str(&yaml).unwrap()
}

pub fn build_app(config: GuardConfig, service: Arc<FakeService>, db: Option<Database>) -> App {
    App::with_services(config, vec![service as Arc<dyn TargetService>], db).unwrap()
}

//! Scripted in-memory service used by agent and orchestrator unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::GuardError;
use crate::models::{ProbeResult, Target, TargetPatch};
use crate::services::TargetService;

type ErrorFactory = Box<dyn Fn() -> GuardError + Send + Sync>;

pub struct MockService {
    name: String,
    targets: Mutex<Vec<Target>>,
    list_fails: bool,
    probe_failures: HashMap<i64, String>,
    probe_errors: HashMap<i64, ErrorFactory>,
    update_failures: HashSet<i64>,
    update_panics: HashSet<i64>,
    test_calls: AtomicU32,
    updates: Mutex<Vec<(i64, TargetPatch)>>,
    rejects_adds: bool,
    added: Mutex<Vec<Value>>,
}

impl MockService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            targets: Mutex::new(Vec::new()),
            list_fails: false,
            probe_failures: HashMap::new(),
            probe_errors: HashMap::new(),
            update_failures: HashSet::new(),
            update_panics: HashSet::new(),
            test_calls: AtomicU32::new(0),
            updates: Mutex::new(Vec::new()),
            rejects_adds: false,
            added: Mutex::new(Vec::new()),
        }
    }

    pub fn with_target(self, target: Target) -> Self {
        self.targets.lock().unwrap().push(target);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.list_fails = true;
        self
    }

    pub fn with_probe_failure(mut self, id: i64, message: &str) -> Self {
        self.probe_failures.insert(id, message.to_string());
        self
    }

    pub fn with_probe_error(mut self, id: i64, error: impl Fn() -> GuardError + Send + Sync + 'static) -> Self {
        self.probe_errors.insert(id, Box::new(error));
        self
    }

    pub fn failing_update(mut self, id: i64) -> Self {
        self.update_failures.insert(id);
        self
    }

    pub fn panicking_update(mut self, id: i64) -> Self {
        self.update_panics.insert(id);
        self
    }

    pub fn rejecting_adds(mut self) -> Self {
        self.rejects_adds = true;
        self
    }

    pub fn added(&self) -> Vec<Value> {
        self.added.lock().unwrap().clone()
    }

    pub fn test_calls(&self) -> u32 {
        self.test_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(i64, TargetPatch)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn target(&self, id: i64) -> Option<Target> {
        self.targets.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }
}

#[async_trait]
impl TargetService for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_targets(&self) -> Result<Vec<Target>, GuardError> {
        if self.list_fails {
            return Err(GuardError::ServiceUnavailable(format!("{} is down", self.name)));
        }
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn test_target(&self, id: i64) -> Result<ProbeResult, GuardError> {
        self.test_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = self.probe_errors.get(&id) {
            return Err(make());
        }
        match self.probe_failures.get(&id) {
            Some(message) => Ok(ProbeResult::failed(message.clone())),
            None => Ok(ProbeResult::passed()),
        }
    }

    async fn update_target(&self, id: i64, patch: &TargetPatch) -> Result<Target, GuardError> {
        self.updates.lock().unwrap().push((id, patch.clone()));
        if self.update_panics.contains(&id) {
            panic!("update handler crashed for {}", id);
        }
        if self.update_failures.contains(&id) {
            return Err(GuardError::Permanent(format!("update of {} rejected", id)));
        }
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| GuardError::NotFound(format!("indexer {}", id)))?;
        *target = target.merged(patch);
        Ok(target.clone())
    }

    async fn add_target(&self, definition: &Value) -> Result<Target, GuardError> {
        if self.rejects_adds {
            return Err(GuardError::Permanent("indexer definition rejected".into()));
        }
        self.added.lock().unwrap().push(definition.clone());
        let mut targets = self.targets.lock().unwrap();
        let id = targets.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let name = definition.get("name").and_then(Value::as_str).unwrap_or_default();
        let target = Target::new(id, name, true);
        targets.push(target.clone());
        Ok(target)
    }
}

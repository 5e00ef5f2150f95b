use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::db::{AuditRecord, AuditStore};
use crate::models::{Event, EventType, Severity};
use tracing::{error, info, warn};

/// Append-only event trail.
///
/// Keeps a bounded in-memory window for fast reads and mirrors every event
/// to the audit store when one is attached. A failed store write never
/// loses the event from memory.
pub struct EventLog {
    max_events: usize,
    events: RwLock<VecDeque<Event>>,
    store: Option<Arc<dyn AuditStore>>,
    persistence_failures: AtomicU64,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            max_events: max_events.max(1),
            events: RwLock::new(VecDeque::new()),
            store: None,
            persistence_failures: AtomicU64::new(0),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<Event>> {
        self.events.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<Event>> {
        self.events.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: Event) {
        mirror_to_tracing(&event);
        let mut events = self.write();
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Append an event and persist it best-effort.
    pub async fn record(&self, event: Event) {
        let persisted = self.store.as_ref().map(|_| event.clone());
        self.push(event);

        let (Some(store), Some(event)) = (&self.store, persisted) else {
            return;
        };
        let event_id = event.id;
        let event_type = event.event_type;
        let agent_name = event.agent_name.clone();
        if let Err(e) = store.append(AuditRecord::Event(event)).await {
            self.persistence_failures.fetch_add(1, Ordering::Relaxed);
            // Kept in memory only; persisting it would just fail again.
            let mut failure = Event::error(
                EventType::PersistenceFailed,
                format!("Failed to persist {} event: {}", event_type, e),
            )
            .with_meta("event_id", event_id.to_string())
            .with_meta("error_kind", e.kind().as_str());
            failure.agent_name = agent_name;
            self.push(failure);
        }
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    /// Filtered view of the in-memory window, newest first.
    pub fn query(&self, agent_name: Option<&str>, event_type: Option<EventType>, limit: usize) -> Vec<Event> {
        self.read()
            .iter()
            .rev()
            .filter(|e| agent_name.map_or(true, |a| e.agent_name.as_deref() == Some(a)))
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn mirror_to_tracing(event: &Event) {
    let agent = event.agent_name.as_deref().unwrap_or("-");
    match event.severity {
        Severity::Info => info!(event_type = %event.event_type, agent = agent, "{}", event.message),
        Severity::Warning => warn!(event_type = %event.event_type, agent = agent, "{}", event.message),
        Severity::Error => error!(event_type = %event.event_type, agent = agent, "{}", event.message),
    }
}

use async_trait::async_trait;

use crate::errors::GuardError;
use super::records::{AuditRecord, RecordFilter, RecordKind};
use super::Database;

/// Persistence collaborator for the audit trail. Writes are best-effort from
/// the caller's point of view; failures come back as `Persistence` errors.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), GuardError>;

    async fn query(&self, filter: RecordFilter) -> Result<Vec<AuditRecord>, GuardError>;
}

fn persistence(e: GuardError) -> GuardError {
    match e {
        GuardError::Persistence(_) => e,
        other => GuardError::Persistence(other.to_string()),
    }
}

#[async_trait]
impl AuditStore for Database {
    async fn append(&self, record: AuditRecord) -> Result<(), GuardError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || match &record {
            AuditRecord::Health(health) => db.insert_health_record(health),
            AuditRecord::Event(event) => db.insert_event(event),
        })
        .await
        .map_err(|e| GuardError::Persistence(format!("Audit write task failed: {}", e)))?
        .map_err(persistence)
    }

    async fn query(&self, filter: RecordFilter) -> Result<Vec<AuditRecord>, GuardError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || match filter.kind {
            RecordKind::Health => db
                .query_health_records(&filter)
                .map(|rows| rows.into_iter().map(AuditRecord::Health).collect()),
            RecordKind::Event => db
                .query_events(&filter)
                .map(|rows| rows.into_iter().map(AuditRecord::Event).collect()),
        })
        .await
        .map_err(|e| GuardError::Persistence(format!("Audit query task failed: {}", e)))?
        .map_err(persistence)
    }
}

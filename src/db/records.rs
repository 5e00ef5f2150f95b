use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

use crate::errors::GuardError;
use crate::models::{Event, EventType, Severity, TargetOutcome};
use super::Database;

/// One persisted per-target check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub service: String,
    pub target_id: i64,
    pub target_name: String,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub action: Option<String>,
    pub agent_name: String,
    pub checked_at: DateTime<Utc>,
}

impl HealthRecord {
    pub fn from_outcome(agent_name: &str, outcome: &TargetOutcome, checked_at: DateTime<Utc>) -> Self {
        Self {
            service: outcome.service.clone(),
            target_id: outcome.target_id,
            target_name: outcome.target_name.clone(),
            success: outcome.success,
            error_kind: outcome.error_kind.map(|k| k.as_str().to_string()),
            error: outcome.message.clone(),
            action: outcome.action.as_ref().map(|a| a.as_str().to_string()),
            agent_name: agent_name.to_string(),
            checked_at,
        }
    }
}

/// Anything the audit store accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Health(HealthRecord),
    Event(Event),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Health,
    Event,
}

/// Filters for history reads. Results are newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFilter {
    pub kind: RecordKind,
    pub service: Option<String>,
    pub target_id: Option<i64>,
    pub agent_name: Option<String>,
    pub event_type: Option<String>,
    pub limit: usize,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            kind: RecordKind::Health,
            service: None,
            target_id: None,
            agent_name: None,
            event_type: None,
            limit: 100,
        }
    }
}

impl Database {
    pub fn insert_health_record(&self, record: &HealthRecord) -> Result<(), GuardError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO health_checks (service, target_id, target_name, success, error_kind, error, action, agent_name, checked_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.service,
                record.target_id,
                record.target_name,
                record.success,
                record.error_kind,
                record.error,
                record.action,
                record.agent_name,
                record.checked_at.to_rfc3339(),
            ],
        ).map_err(|e| GuardError::Database(format!("Failed to insert health record: {}", e)))?;
        Ok(())
    }

    pub fn insert_event(&self, event: &Event) -> Result<(), GuardError> {
        let metadata = serde_json::to_string(&event.metadata)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO events (id, timestamp, event_type, agent_name, severity, message, metadata) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                event.id.to_string(),
                event.timestamp.to_rfc3339(),
                event.event_type.as_str(),
                event.agent_name,
                event.severity.as_str(),
                event.message,
                metadata,
            ],
        ).map_err(|e| GuardError::Database(format!("Failed to insert event: {}", e)))?;
        Ok(())
    }

    pub fn query_health_records(&self, filter: &RecordFilter) -> Result<Vec<HealthRecord>, GuardError> {
        let mut sql = String::from(
            "SELECT service, target_id, target_name, success, error_kind, error, action, agent_name, checked_at FROM health_checks WHERE 1=1"
        );
        let mut params: Vec<SqlValue> = Vec::new();
        if let Some(service) = &filter.service {
            params.push(SqlValue::Text(service.clone()));
            sql.push_str(&format!(" AND service = ?{}", params.len()));
        }
        if let Some(target_id) = filter.target_id {
            params.push(SqlValue::Integer(target_id));
            sql.push_str(&format!(" AND target_id = ?{}", params.len()));
        }
        if let Some(agent) = &filter.agent_name {
            params.push(SqlValue::Text(agent.clone()));
            sql.push_str(&format!(" AND agent_name = ?{}", params.len()));
        }
        params.push(SqlValue::Integer(filter.limit as i64));
        sql.push_str(&format!(" ORDER BY checked_at DESC, id DESC LIMIT ?{}", params.len()));

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)
            .map_err(|e| GuardError::Database(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row: &rusqlite::Row| {
            let checked_at: String = row.get(8)?;
            Ok(HealthRecord {
                service: row.get(0)?,
                target_id: row.get(1)?,
                target_name: row.get(2)?,
                success: row.get(3)?,
                error_kind: row.get(4)?,
                error: row.get(5)?,
                action: row.get(6)?,
                agent_name: row.get(7)?,
                checked_at: parse_timestamp(&checked_at),
            })
        }).map_err(|e| GuardError::Database(format!("Query error: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| GuardError::Database(format!("Row error: {}", e)))?);
        }
        Ok(records)
    }

    pub fn query_events(&self, filter: &RecordFilter) -> Result<Vec<Event>, GuardError> {
        let mut sql = String::from(
            "SELECT id, timestamp, event_type, agent_name, severity, message, metadata FROM events WHERE 1=1"
        );
        let mut params: Vec<SqlValue> = Vec::new();
        if let Some(agent) = &filter.agent_name {
            params.push(SqlValue::Text(agent.clone()));
            sql.push_str(&format!(" AND agent_name = ?{}", params.len()));
        }
        if let Some(event_type) = &filter.event_type {
            params.push(SqlValue::Text(event_type.clone()));
            sql.push_str(&format!(" AND event_type = ?{}", params.len()));
        }
        params.push(SqlValue::Integer(filter.limit as i64));
        sql.push_str(&format!(" ORDER BY timestamp DESC LIMIT ?{}", params.len()));

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)
            .map_err(|e| GuardError::Database(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row: &rusqlite::Row| {
            let id: String = row.get(0)?;
            let timestamp: String = row.get(1)?;
            let event_type: String = row.get(2)?;
            let severity: String = row.get(4)?;
            let metadata: String = row.get(6)?;
            Ok((id, timestamp, event_type, row.get::<_, Option<String>>(3)?, severity, row.get::<_, String>(5)?, metadata))
        }).map_err(|e| GuardError::Database(format!("Query error: {}", e)))?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, agent_name, severity, message, metadata) =
                row.map_err(|e| GuardError::Database(format!("Row error: {}", e)))?;
            let Some(event_type) = EventType::parse(&event_type) else {
                continue;
            };
            let metadata: HashMap<String, serde_json::Value> =
                serde_json::from_str(&metadata).unwrap_or_default();
            events.push(Event {
                id: uuid::Uuid::parse_str(&id).unwrap_or_else(|_| uuid::Uuid::nil()),
                timestamp: parse_timestamp(&timestamp),
                event_type,
                agent_name,
                severity: Severity::parse(&severity).unwrap_or(Severity::Info),
                message,
                metadata,
            });
        }
        Ok(events)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

use std::path::Path;

use crate::cli::commands::HistoryArgs;
use crate::db::{AuditRecord, AuditStore, Database, RecordFilter, RecordKind};
use crate::errors::GuardError;

pub async fn handle_history(args: HistoryArgs) -> Result<(), GuardError> {
    if !Path::new(&args.db).exists() {
        return Err(GuardError::Config(format!("Database not found: {}", args.db)));
    }
    let db = Database::new(&args.db)?;
    let records = db
        .query(RecordFilter {
            kind: RecordKind::Health,
            service: args.service,
            target_id: args.target_id,
            limit: args.limit,
            ..Default::default()
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No health checks recorded");
        return Ok(());
    }
    for record in &records {
        if let AuditRecord::Health(h) = record {
            let status = if h.success { "ok" } else { "FAIL" };
            let action = h.action.as_deref().map(|a| format!(" [{}]", a)).unwrap_or_default();
            let error = h.error.as_deref().map(|e| format!(" {}", e)).unwrap_or_default();
            println!(
                "{}  {:<10} {:>5} {:<30} {:<4}{}{}",
                h.checked_at.format("%Y-%m-%d %H:%M:%S"),
                h.service,
                h.target_id,
                h.target_name,
                status,
                action,
                error
            );
        }
    }
    Ok(())
}

pub mod connection;
pub mod records;
pub mod schema;
pub mod store;

pub use connection::Database;
pub use records::{AuditRecord, HealthRecord, RecordFilter, RecordKind};
pub use store::AuditStore;

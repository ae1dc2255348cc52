pub mod event;
pub mod logger;

pub use event::{AuditAction, AuditEvent, SCHEMA_VERSION};
pub use logger::AuditLogger;

//! Structured logging for HostForge.
//!
//! Console + rolling NDJSON file output, secret redaction, and an audit
//! logger that records bus traffic.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventAuditLogger, EventLogEntry};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;

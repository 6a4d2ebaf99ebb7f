//! Audit trail seam
//!
//! State changes are reported to an external audit writer. Like
//! notifications, this is fire-and-forget from the engine's perspective.

use async_trait::async_trait;

/// External audit/log writer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditWriter: Send + Sync {
    async fn record(&self, action: &str, entity: &str, entity_id: i32);
}

/// Default writer that only logs the audit event
pub struct LogAuditWriter;

#[async_trait]
impl AuditWriter for LogAuditWriter {
    async fn record(&self, action: &str, entity: &str, entity_id: i32) {
        tracing::info!(action, entity, entity_id, "audit");
    }
}

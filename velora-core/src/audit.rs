use async_trait::async_trait;
use velora_shared::models::events::CheckoutAuditEvent;

/// External audit/notification collaborator. Implementations must be cheap to
/// call; the emitter never lets a sink failure reach the booking outcome.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &CheckoutAuditEvent) -> Result<(), String>;
}

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use velora_core::audit::AuditSink;
use velora_shared::models::events::CheckoutAuditEvent;

/// Fire-and-forget publication of terminal booking outcomes. A sink failure
/// is logged and swallowed; it can never block or fail the booking itself.
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn emit(&self, event: CheckoutAuditEvent) {
        if let Err(err) = self.sink.record(&event).await {
            warn!(
                attempt_id = %event.attempt_id,
                outcome = %event.outcome,
                error = %err,
                "audit emission failed"
            );
        }
    }
}

/// Default sink: structured log line consumed by the log-shipping pipeline.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &CheckoutAuditEvent) -> Result<(), String> {
        let payload = serde_json::to_string(event).map_err(|e| e.to_string())?;
        info!(target: "velora::audit", %payload, "checkout outcome");
        Ok(())
    }
}

/// Test sink that remembers everything it was asked to record.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<CheckoutAuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CheckoutAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.outcome.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: &CheckoutAuditEvent) -> Result<(), String> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Sink that always fails; proves emission failures never escape the emitter.
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _event: &CheckoutAuditEvent) -> Result<(), String> {
        Err("sink offline".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event() -> CheckoutAuditEvent {
        CheckoutAuditEvent {
            attempt_id: Uuid::new_v4(),
            outcome: "CONFIRMED".to_string(),
            resource_id: Uuid::new_v4(),
            amount_cents: 4500,
            currency: "USD".to_string(),
            started_at: 0,
            finished_at: 1,
        }
    }

    #[tokio::test]
    async fn recording_sink_captures_events() {
        let sink = Arc::new(RecordingAuditSink::new());
        let emitter = AuditEmitter::new(sink.clone());
        emitter.emit(event()).await;
        assert_eq!(sink.outcomes(), vec!["CONFIRMED"]);
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let emitter = AuditEmitter::new(Arc::new(FailingAuditSink));
        // must not panic or propagate
        emitter.emit(event()).await;
    }
}

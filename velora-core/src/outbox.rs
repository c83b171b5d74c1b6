use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A compensation that could not be completed within its retry budget.
/// Durable so an external reconciliation job can pick it up; a failed refund
/// is deferred, never lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationPending {
    pub id: Uuid,
    pub payment_reference: String,
    pub reason: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CompensationPending {
    pub fn new(payment_reference: &str, reason: &str, attempts: i32, last_error: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_reference: payment_reference.to_string(),
            reason: reason.to_string(),
            attempts,
            last_error,
            created_at: Utc::now(),
        }
    }
}

/// Durable outbox consumed by the external reconciliation job. The write path
/// belongs to the Compensator; `list_pending` is the consumer's contract.
#[async_trait]
pub trait CompensationOutbox: Send + Sync {
    async fn record_pending(
        &self,
        row: &CompensationPending,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn list_pending(
        &self,
    ) -> Result<Vec<CompensationPending>, Box<dyn std::error::Error + Send + Sync>>;
}

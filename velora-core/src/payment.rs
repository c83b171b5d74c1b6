use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentAuthStatus {
    Created,
    Authorized,
    Captured,
    Failed,
    Voided,
    Refunded,
}

/// An authorization as recorded by the external processor. The reservation
/// stores only the `reference`; the processor owns the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub reference: String, // Provider's ID (e.g., pi_123)
    pub amount_cents: i32,
    pub currency: String,
    pub status: PaymentAuthStatus,
    pub idempotency_key: String,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Terminal. Never retried; the processor's reason is surfaced where safe.
    #[error("payment declined: {reason}")]
    Declined { reason: String },

    /// Transient transport/processor failure. Retryable with backoff.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// An idempotency key was replayed with a different amount. Must never
    /// happen when the validator is deterministic; surfaced, never masked.
    #[error(
        "idempotency key {key} replayed with different amount: recorded {recorded_cents}, requested {requested_cents}"
    )]
    IdempotencyMismatch {
        key: String,
        recorded_cents: i32,
        requested_cents: i32,
    },

    #[error("unknown payment reference: {0}")]
    UnknownReference(String),

    /// The recorded status does not permit the requested operation
    /// (e.g. capturing a voided authorization).
    #[error("payment {reference} is {status:?}, cannot {action}")]
    InvalidState {
        reference: String,
        status: PaymentAuthStatus,
        action: &'static str,
    },
}

impl PaymentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Unavailable(_))
    }
}

/// Adapter to the external payment processor. Injected as a constructed
/// dependency so tests substitute a fake without patching global state.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create an authorization, or return the already-created one when the
    /// idempotency key was seen before. Funds are reserved, not captured.
    async fn authorize(
        &self,
        amount_cents: i32,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<PaymentAuthorization, PaymentError>;

    /// Retrieve the current processor-side record for a reference.
    async fn get_authorization(&self, reference: &str)
        -> Result<PaymentAuthorization, PaymentError>;

    /// Capture a previously authorized payment.
    async fn capture(&self, reference: &str) -> Result<PaymentAuthorization, PaymentError>;

    /// Void an authorization that was never captured.
    async fn void(&self, reference: &str) -> Result<PaymentAuthorization, PaymentError>;

    /// Refund a captured payment.
    async fn refund(
        &self,
        reference: &str,
        amount_cents: i32,
    ) -> Result<PaymentAuthorization, PaymentError>;
}

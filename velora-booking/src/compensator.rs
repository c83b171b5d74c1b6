use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{error, info, warn};

use velora_core::outbox::{CompensationOutbox, CompensationPending};
use velora_core::payment::{PaymentAuthStatus, PaymentError};

use crate::orchestrator::PaymentOrchestrator;

/// Terminal result of a compensation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationResult {
    Voided,
    Refunded,
    /// The reference was already reversed (or never settled); nothing to do.
    AlreadySettled,
    /// The reversal could not be completed within the retry budget and was
    /// recorded for the external reconciliation job.
    Pending,
}

/// The single choke point for money reversal. Every path that gives money
/// back — lost races, capture failures, user cancellations — goes through
/// `compensate`, so reversals stay centralized and auditable.
pub struct Compensator {
    payments: Arc<PaymentOrchestrator>,
    outbox: Arc<dyn CompensationOutbox>,
}

impl Compensator {
    pub fn new(payments: Arc<PaymentOrchestrator>, outbox: Arc<dyn CompensationOutbox>) -> Self {
        Self { payments, outbox }
    }

    /// Idempotent: compensating the same reference twice settles on the
    /// first call and no-ops on the second. Never returns an error — a
    /// reversal that cannot complete is recorded durably, not dropped.
    pub async fn compensate(&self, payment_reference: &str, reason: &str) -> CompensationResult {
        match self.reverse(payment_reference).await {
            Ok(result) => {
                info!(payment_reference, reason, ?result, "compensation settled");
                result
            }
            Err(err) => {
                error!(
                    payment_reference,
                    reason,
                    error = %err,
                    "compensation failed after retries, deferring to reconciliation"
                );
                let row = CompensationPending::new(
                    payment_reference,
                    reason,
                    self.payments.retry_budget() as i32,
                    Some(err.to_string()),
                );
                if let Err(outbox_err) = self.outbox.record_pending(&row).await {
                    // Worst case: log loudly so operators can reconcile by hand.
                    error!(
                        payment_reference,
                        error = %outbox_err,
                        "failed to record compensation outbox row"
                    );
                }
                CompensationResult::Pending
            }
        }
    }

    /// Void before capture, refund after. The orchestrator already retries
    /// transient failures with bounded backoff.
    async fn reverse(&self, reference: &str) -> Result<CompensationResult, PaymentError> {
        let auth = match self.payments.get_authorization(reference).await {
            Ok(auth) => auth,
            Err(PaymentError::UnknownReference(_)) => {
                warn!(reference, "compensation requested for unknown reference");
                return Ok(CompensationResult::AlreadySettled);
            }
            Err(err) => return Err(err),
        };

        match auth.status {
            PaymentAuthStatus::Created | PaymentAuthStatus::Authorized => {
                self.payments.void(reference).await?;
                Ok(CompensationResult::Voided)
            }
            PaymentAuthStatus::Captured => {
                self.payments.refund(reference, auth.amount_cents).await?;
                Ok(CompensationResult::Refunded)
            }
            PaymentAuthStatus::Voided
            | PaymentAuthStatus::Refunded
            | PaymentAuthStatus::Failed => Ok(CompensationResult::AlreadySettled),
        }
    }
}

/// In-memory outbox used by tests and local wiring.
#[derive(Default)]
pub struct InMemoryCompensationOutbox {
    rows: Mutex<Vec<CompensationPending>>,
}

impl InMemoryCompensationOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CompensationOutbox for InMemoryCompensationOutbox {
    async fn record_pending(
        &self,
        row: &CompensationPending,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn list_pending(
        &self,
    ) -> Result<Vec<CompensationPending>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.rows.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;
    use crate::orchestrator::{MockPaymentAdapter, AMOUNT_REVERSAL_OUTAGE};
    use velora_core::payment::PaymentAdapter;

    fn setup() -> (
        Arc<MockPaymentAdapter>,
        Arc<InMemoryCompensationOutbox>,
        Compensator,
    ) {
        let adapter = Arc::new(MockPaymentAdapter::new());
        let payments = Arc::new(PaymentOrchestrator::new(
            adapter.clone(),
            RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
        ));
        let outbox = Arc::new(InMemoryCompensationOutbox::new());
        let compensator = Compensator::new(payments, outbox.clone());
        (adapter, outbox, compensator)
    }

    #[tokio::test]
    async fn authorized_payment_is_voided() {
        let (adapter, outbox, compensator) = setup();
        let auth = adapter.authorize(5000, "USD", "key-1").await.unwrap();

        let result = compensator.compensate(&auth.reference, "slot lost").await;
        assert_eq!(result, CompensationResult::Voided);
        let status = adapter.get_authorization(&auth.reference).await.unwrap().status;
        assert_eq!(status, PaymentAuthStatus::Voided);
        assert!(outbox.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn captured_payment_is_refunded() {
        let (adapter, _, compensator) = setup();
        let auth = adapter.authorize(5000, "USD", "key-1").await.unwrap();
        adapter.capture(&auth.reference).await.unwrap();

        let result = compensator.compensate(&auth.reference, "cancelled").await;
        assert_eq!(result, CompensationResult::Refunded);
        let status = adapter.get_authorization(&auth.reference).await.unwrap().status;
        assert_eq!(status, PaymentAuthStatus::Refunded);
    }

    #[tokio::test]
    async fn second_compensation_is_a_no_op() {
        let (adapter, _, compensator) = setup();
        let auth = adapter.authorize(5000, "USD", "key-1").await.unwrap();

        assert_eq!(
            compensator.compensate(&auth.reference, "slot lost").await,
            CompensationResult::Voided
        );
        assert_eq!(
            compensator.compensate(&auth.reference, "slot lost").await,
            CompensationResult::AlreadySettled
        );
    }

    #[tokio::test]
    async fn exhausted_retries_land_in_the_outbox() {
        let (adapter, outbox, compensator) = setup();
        let auth = adapter
            .authorize(AMOUNT_REVERSAL_OUTAGE, "USD", "key-1")
            .await
            .unwrap();

        let result = compensator.compensate(&auth.reference, "slot lost").await;
        assert_eq!(result, CompensationResult::Pending);

        let pending = outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payment_reference, auth.reference);
        assert_eq!(pending[0].reason, "slot lost");
        assert!(pending[0].last_error.is_some());
    }

    #[tokio::test]
    async fn unknown_reference_settles_quietly() {
        let (_, outbox, compensator) = setup();
        let result = compensator.compensate("pay_nonexistent", "cleanup").await;
        assert_eq!(result, CompensationResult::AlreadySettled);
        assert!(outbox.list_pending().await.unwrap().is_empty());
    }
}

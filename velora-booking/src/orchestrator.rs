use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use velora_core::payment::{
    PaymentAdapter, PaymentAuthStatus, PaymentAuthorization, PaymentError,
};
use velora_gate::Interval;

use crate::models::RetryPolicy;

/// Talks to the external processor with idempotency and bounded retries so
/// client retries never double-charge and transient outages never bubble up
/// as raw transport errors. The adapter is injected; tests substitute a fake
/// without touching global state.
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
    retry: RetryPolicy,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>, retry: RetryPolicy) -> Self {
        Self { adapter, retry }
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Derive the idempotency key from the logical request identity. The same
    /// (customer, resource, interval) always maps to the same key, so a
    /// client-side retry replays the original authorization.
    pub fn idempotency_key(customer_id: &str, resource_id: Uuid, interval: &Interval) -> String {
        let name = format!(
            "{}:{}:{}:{}",
            customer_id,
            resource_id,
            interval.start().timestamp(),
            interval.end().timestamp()
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub async fn authorize(
        &self,
        amount_cents: i32,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let auth = self
            .with_retry("authorize", || {
                self.adapter.authorize(amount_cents, currency, idempotency_key)
            })
            .await?;
        // The adapter enforces this too; re-check so a misbehaving processor
        // can never hand back someone else's authorization.
        if auth.amount_cents != amount_cents {
            return Err(PaymentError::IdempotencyMismatch {
                key: idempotency_key.to_string(),
                recorded_cents: auth.amount_cents,
                requested_cents: amount_cents,
            });
        }
        Ok(auth)
    }

    pub async fn get_authorization(
        &self,
        reference: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        self.with_retry("get_authorization", || {
            self.adapter.get_authorization(reference)
        })
        .await
    }

    pub async fn capture(&self, reference: &str) -> Result<PaymentAuthorization, PaymentError> {
        self.with_retry("capture", || self.adapter.capture(reference))
            .await
    }

    /// Money-reversal operations are called by the Compensator only; every
    /// void/refund flows through that single choke point.
    pub async fn void(&self, reference: &str) -> Result<PaymentAuthorization, PaymentError> {
        self.with_retry("void", || self.adapter.void(reference)).await
    }

    pub async fn refund(
        &self,
        reference: &str,
        amount_cents: i32,
    ) -> Result<PaymentAuthorization, PaymentError> {
        self.with_retry("refund", || self.adapter.refund(reference, amount_cents))
            .await
    }

    async fn with_retry<F, Fut>(
        &self,
        action: &'static str,
        call: F,
    ) -> Result<PaymentAuthorization, PaymentError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<PaymentAuthorization, PaymentError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient processor failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

// ============================================================================
// Mock processor
// ============================================================================

/// Amount sentinels that make the mock misbehave on purpose. Everything else
/// authorizes and captures cleanly.
pub const AMOUNT_DECLINED: i32 = 99_402;
pub const AMOUNT_OUTAGE: i32 = 99_503;
pub const AMOUNT_FLAKY: i32 = 99_429;
pub const AMOUNT_CAPTURE_FAILS: i32 = 99_410;
pub const AMOUNT_REVERSAL_OUTAGE: i32 = 99_520;

#[derive(Default)]
struct MockLedger {
    by_reference: HashMap<String, PaymentAuthorization>,
    by_key: HashMap<String, String>,
    flaky_failures: HashMap<String, u32>,
}

/// In-memory stand-in for the payment processor. Replays idempotency keys
/// like the real one and simulates every failure mode the checkout flow has
/// to survive.
#[derive(Default)]
pub struct MockPaymentAdapter {
    ledger: Mutex<MockLedger>,
    authorize_calls: AtomicU32,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `authorize` reached the processor, replays included.
    pub fn authorize_call_count(&self) -> u32 {
        self.authorize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn authorize(
        &self,
        amount_cents: i32,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        let mut ledger = self.ledger.lock().unwrap();

        if let Some(reference) = ledger.by_key.get(idempotency_key) {
            let auth = ledger.by_reference[reference].clone();
            if auth.amount_cents != amount_cents {
                return Err(PaymentError::IdempotencyMismatch {
                    key: idempotency_key.to_string(),
                    recorded_cents: auth.amount_cents,
                    requested_cents: amount_cents,
                });
            }
            return Ok(auth);
        }

        match amount_cents {
            AMOUNT_DECLINED => {
                return Err(PaymentError::Declined {
                    reason: "card declined".to_string(),
                })
            }
            AMOUNT_OUTAGE => {
                return Err(PaymentError::Unavailable("connection refused".to_string()))
            }
            AMOUNT_FLAKY => {
                let failures = ledger
                    .flaky_failures
                    .entry(idempotency_key.to_string())
                    .or_insert(0);
                if *failures < 2 {
                    *failures += 1;
                    return Err(PaymentError::Unavailable("gateway timeout".to_string()));
                }
            }
            _ => {}
        }

        let reference = format!("pay_{}", Uuid::new_v4().simple());
        let auth = PaymentAuthorization {
            reference: reference.clone(),
            amount_cents,
            currency: currency.to_string(),
            status: PaymentAuthStatus::Authorized,
            idempotency_key: idempotency_key.to_string(),
            client_secret: Some(format!("sec_{}", Uuid::new_v4().simple())),
            created_at: Utc::now(),
        };
        ledger.by_reference.insert(reference.clone(), auth.clone());
        ledger
            .by_key
            .insert(idempotency_key.to_string(), reference);
        Ok(auth)
    }

    async fn get_authorization(
        &self,
        reference: &str,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let ledger = self.ledger.lock().unwrap();
        ledger
            .by_reference
            .get(reference)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownReference(reference.to_string()))
    }

    async fn capture(&self, reference: &str) -> Result<PaymentAuthorization, PaymentError> {
        let mut ledger = self.ledger.lock().unwrap();
        let auth = ledger
            .by_reference
            .get_mut(reference)
            .ok_or_else(|| PaymentError::UnknownReference(reference.to_string()))?;
        match auth.status {
            PaymentAuthStatus::Captured => Ok(auth.clone()),
            PaymentAuthStatus::Authorized => {
                if auth.amount_cents == AMOUNT_CAPTURE_FAILS {
                    return Err(PaymentError::Declined {
                        reason: "capture rejected".to_string(),
                    });
                }
                auth.status = PaymentAuthStatus::Captured;
                Ok(auth.clone())
            }
            status => Err(PaymentError::InvalidState {
                reference: reference.to_string(),
                status,
                action: "capture",
            }),
        }
    }

    async fn void(&self, reference: &str) -> Result<PaymentAuthorization, PaymentError> {
        let mut ledger = self.ledger.lock().unwrap();
        let auth = ledger
            .by_reference
            .get_mut(reference)
            .ok_or_else(|| PaymentError::UnknownReference(reference.to_string()))?;
        match auth.status {
            PaymentAuthStatus::Voided => Ok(auth.clone()),
            PaymentAuthStatus::Authorized => {
                if auth.amount_cents == AMOUNT_REVERSAL_OUTAGE {
                    return Err(PaymentError::Unavailable("refund service down".to_string()));
                }
                auth.status = PaymentAuthStatus::Voided;
                Ok(auth.clone())
            }
            status => Err(PaymentError::InvalidState {
                reference: reference.to_string(),
                status,
                action: "void",
            }),
        }
    }

    async fn refund(
        &self,
        reference: &str,
        _amount_cents: i32,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let mut ledger = self.ledger.lock().unwrap();
        let auth = ledger
            .by_reference
            .get_mut(reference)
            .ok_or_else(|| PaymentError::UnknownReference(reference.to_string()))?;
        match auth.status {
            PaymentAuthStatus::Refunded => Ok(auth.clone()),
            PaymentAuthStatus::Captured => {
                if auth.amount_cents == AMOUNT_REVERSAL_OUTAGE {
                    return Err(PaymentError::Unavailable("refund service down".to_string()));
                }
                auth.status = PaymentAuthStatus::Refunded;
                Ok(auth.clone())
            }
            status => Err(PaymentError::InvalidState {
                reference: reference.to_string(),
                status,
                action: "refund",
            }),
        }
    }
}

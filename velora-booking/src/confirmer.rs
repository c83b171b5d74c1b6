use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use velora_core::catalog::ServiceCatalog;
use velora_core::payment::PaymentError;
use velora_core::{BookingError, BookingResult, FieldViolation};
use velora_gate::{
    AvailabilityGate, CommissionSplit, GateError, HoldToken, Reservation, ReservationStatus,
};
use velora_shared::models::events::CheckoutAuditEvent;

use crate::audit::AuditEmitter;
use crate::compensator::{CompensationResult, Compensator};
use crate::models::{
    AttemptPhase, BookingRules, CheckoutRequest, ConfirmOutcome, ProcessOutcome,
};
use crate::orchestrator::PaymentOrchestrator;
use crate::validator;

/// The transaction boundary of the checkout flow. `process` takes a raw
/// request to a held slot plus an authorized payment; `confirm` turns those
/// into a durable confirmed reservation, or compensates. Each attempt moves
/// one way through validating → holding → authorizing → confirming and ends
/// in confirmed or failed.
pub struct BookingConfirmer {
    gate: Arc<AvailabilityGate>,
    payments: Arc<PaymentOrchestrator>,
    compensator: Arc<Compensator>,
    catalog: Arc<dyn ServiceCatalog>,
    audit: AuditEmitter,
    rules: BookingRules,
    commission_rate: f64,
}

impl BookingConfirmer {
    pub fn new(
        gate: Arc<AvailabilityGate>,
        payments: Arc<PaymentOrchestrator>,
        compensator: Arc<Compensator>,
        catalog: Arc<dyn ServiceCatalog>,
        audit: AuditEmitter,
        rules: BookingRules,
        commission_rate: f64,
    ) -> Self {
        Self {
            gate,
            payments,
            compensator,
            catalog,
            audit,
            rules,
            commission_rate,
        }
    }

    /// Steps 1–3 of a booking attempt: validate, claim the slot, authorize
    /// the payment. On success the caller holds a payment intent to confirm;
    /// on any failure past authorization the money is already reversed.
    pub async fn process(
        &self,
        req: &CheckoutRequest,
        customer_id: &str,
    ) -> BookingResult<ProcessOutcome> {
        let attempt_id = Uuid::new_v4();
        let started_at = Utc::now().timestamp_millis();
        debug!(%attempt_id, phase = %AttemptPhase::Validating, customer_id, "checkout attempt started");

        let service = self
            .catalog
            .get_service(req.service_id)
            .await
            .map_err(|e| BookingError::Internal(format!("catalog lookup failed: {e}")))?;
        let Some(service) = service else {
            return Err(BookingError::Validation(vec![FieldViolation::new(
                "serviceId",
                "unknown service",
            )]));
        };

        let booking = match validator::validate(req, &service, &self.rules, Utc::now()) {
            Ok(booking) => booking,
            Err(violations) => {
                self.emit(attempt_id, "VALIDATION_FAILED", service.resource_id, 0, &service.currency, started_at)
                    .await;
                return Err(BookingError::Validation(violations));
            }
        };

        debug!(%attempt_id, phase = %AttemptPhase::Holding, resource_id = %booking.resource_id);
        let hold = match self
            .gate
            .try_hold(booking.resource_id, booking.interval, customer_id, &booking.details())
            .await
        {
            Ok(hold) => hold,
            Err(GateError::Conflict { .. }) => {
                // Terminal for this attempt; the processor is never contacted
                self.emit(attempt_id, "SLOT_CONFLICT", booking.resource_id, booking.amount_cents, &booking.currency, started_at)
                    .await;
                return Err(BookingError::SlotConflict);
            }
            Err(err) => return Err(BookingError::Internal(err.to_string())),
        };

        debug!(%attempt_id, phase = %AttemptPhase::Authorizing, hold_id = %hold.hold_id);
        let key = PaymentOrchestrator::idempotency_key(
            customer_id,
            booking.resource_id,
            &booking.interval,
        );
        let authorization = match self
            .payments
            .authorize(booking.amount_cents, &booking.currency, &key)
            .await
        {
            Ok(auth) => auth,
            Err(err) => {
                // Nothing was captured; freeing the hold is the only cleanup
                let _ = self.gate.release(&hold).await;
                self.emit(attempt_id, "PAYMENT_FAILED", booking.resource_id, booking.amount_cents, &booking.currency, started_at)
                    .await;
                return Err(match err {
                    PaymentError::Declined { reason } => BookingError::PaymentDeclined {
                        reason,
                        compensation_triggered: false,
                    },
                    PaymentError::Unavailable(_) => BookingError::ProcessorUnavailable {
                        compensation_triggered: false,
                    },
                    other => BookingError::Internal(other.to_string()),
                });
            }
        };

        if let Err(err) = self.gate.attach_payment(&hold, &authorization.reference).await {
            // The hold lapsed after money was authorized: reverse immediately
            warn!(%attempt_id, phase = %AttemptPhase::Compensating, error = %err, "hold lost after authorization");
            self.compensator
                .compensate(&authorization.reference, "hold lost before confirmation")
                .await;
            self.emit(attempt_id, "SLOT_LOST", booking.resource_id, booking.amount_cents, &booking.currency, started_at)
                .await;
            return Err(BookingError::SlotLost {
                compensation_triggered: true,
            });
        }

        self.emit(attempt_id, "AUTHORIZED", booking.resource_id, booking.amount_cents, &booking.currency, started_at)
            .await;
        Ok(ProcessOutcome {
            attempt_id,
            hold,
            authorization,
        })
    }

    /// Steps 4–6: promote the hold and capture the funds. Runs to completion
    /// server-side regardless of whether the client is still listening, so
    /// money is never left authorized without a reservation or a reversal.
    pub async fn confirm(&self, payment_reference: &str) -> BookingResult<ConfirmOutcome> {
        let started_at = Utc::now().timestamp_millis();

        let row = self
            .gate
            .find_by_payment_reference(payment_reference)
            .await
            .map_err(|e| BookingError::Internal(e.to_string()))?;

        let row = match row {
            Some(row) => row,
            None => {
                // No trace of the attempt: either a bogus reference, or the
                // hold expired and was reaped after authorization.
                match self.payments.get_authorization(payment_reference).await {
                    Err(PaymentError::UnknownReference(_)) => {
                        return Err(BookingError::NotFound(format!(
                            "unknown payment intent {payment_reference}"
                        )))
                    }
                    _ => {
                        warn!(payment_reference, "hold reaped before confirmation; reversing authorization");
                        self.compensator
                            .compensate(payment_reference, "hold expired before confirmation")
                            .await;
                        return Err(BookingError::SlotLost {
                            compensation_triggered: true,
                        });
                    }
                }
            }
        };

        match row.status {
            // A repeated confirm returns the reservation it already produced
            ReservationStatus::Confirmed => return Ok(ConfirmOutcome { reservation: row }),
            ReservationStatus::Cancelled => {
                return Err(BookingError::NotFound(format!(
                    "reservation {} was cancelled",
                    row.id
                )))
            }
            ReservationStatus::Held => {}
        }

        let attempt_id = row.id;
        debug!(%attempt_id, phase = %AttemptPhase::Confirming, payment_reference);

        let token = HoldToken {
            hold_id: row.id,
            resource_id: row.resource_id,
            holder_id: row.customer_id.clone(),
            interval: row.interval(),
            expires_at: row.expires_at.unwrap_or_else(Utc::now),
            version: row.version,
        };
        let split = CommissionSplit::of(row.amount_cents, self.commission_rate);

        let reservation = match self.gate.promote(&token, payment_reference, split).await {
            Ok(reservation) => reservation,
            Err(GateError::HoldExpired(_)) | Err(GateError::Conflict { .. }) => {
                // Logged distinctly from plain conflicts: the slot was lost
                // with money already authorized, which signals a
                // capacity/latency problem
                warn!(
                    %attempt_id,
                    phase = %AttemptPhase::Compensating,
                    payment_reference,
                    "hold expired between authorization and confirmation"
                );
                self.compensator
                    .compensate(payment_reference, "slot lost at promotion")
                    .await;
                self.emit(attempt_id, "SLOT_LOST", row.resource_id, row.amount_cents, &row.currency, started_at)
                    .await;
                return Err(BookingError::SlotLost {
                    compensation_triggered: true,
                });
            }
            Err(err) => return Err(BookingError::Internal(err.to_string())),
        };

        if let Err(err) = self.payments.capture(payment_reference).await {
            // The one case where a confirmed row is undone post-commit: a
            // second short transaction, never a DB transaction held open
            // across the processor call
            warn!(%attempt_id, phase = %AttemptPhase::Compensating, error = %err, "capture failed after promotion");
            if let Err(rollback_err) = self.gate.rollback_confirmed(reservation.id).await {
                tracing::error!(
                    reservation_id = %reservation.id,
                    error = %rollback_err,
                    "failed to roll back reservation after capture failure"
                );
            }
            self.compensator
                .compensate(payment_reference, "capture failed after promotion")
                .await;
            self.emit(attempt_id, "PAYMENT_FAILED", row.resource_id, row.amount_cents, &row.currency, started_at)
                .await;
            return Err(match err {
                PaymentError::Declined { reason } => BookingError::PaymentDeclined {
                    reason,
                    compensation_triggered: true,
                },
                PaymentError::Unavailable(_) => BookingError::ProcessorUnavailable {
                    compensation_triggered: true,
                },
                other => BookingError::Internal(other.to_string()),
            });
        }

        debug!(%attempt_id, phase = %AttemptPhase::Confirmed);
        self.emit(attempt_id, "CONFIRMED", reservation.resource_id, reservation.amount_cents, &reservation.currency, started_at)
            .await;
        Ok(ConfirmOutcome { reservation })
    }

    pub async fn reservation(&self, id: Uuid) -> BookingResult<Option<Reservation>> {
        self.gate
            .get_reservation(id)
            .await
            .map_err(|e| BookingError::Internal(e.to_string()))
    }

    /// Cancellation shares the Compensator with the race-handling path; the
    /// refund/void decision lives in one place.
    pub async fn cancel(
        &self,
        reservation_id: Uuid,
        reason: &str,
    ) -> BookingResult<CompensationResult> {
        let started_at = Utc::now().timestamp_millis();
        let reservation = match self.gate.cancel_confirmed(reservation_id).await {
            Ok(reservation) => reservation,
            Err(GateError::NotFound(_)) => {
                return Err(BookingError::NotFound(format!(
                    "reservation {reservation_id}"
                )))
            }
            Err(err) => return Err(BookingError::Internal(err.to_string())),
        };

        let result = match &reservation.payment_reference {
            Some(reference) => self.compensator.compensate(reference, reason).await,
            None => CompensationResult::AlreadySettled,
        };

        self.emit(reservation.id, "CANCELLED", reservation.resource_id, reservation.amount_cents, &reservation.currency, started_at)
            .await;
        Ok(result)
    }

    async fn emit(
        &self,
        attempt_id: Uuid,
        outcome: &str,
        resource_id: Uuid,
        amount_cents: i32,
        currency: &str,
        started_at: i64,
    ) {
        self.audit
            .emit(CheckoutAuditEvent {
                attempt_id,
                outcome: outcome.to_string(),
                resource_id,
                amount_cents,
                currency: currency.to_string(),
                started_at,
                finished_at: Utc::now().timestamp_millis(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use crate::catalog::StaticCatalog;
    use crate::compensator::InMemoryCompensationOutbox;
    use crate::models::RetryPolicy;
    use crate::orchestrator::{
        MockPaymentAdapter, AMOUNT_CAPTURE_FAILS, AMOUNT_DECLINED, AMOUNT_OUTAGE,
        AMOUNT_REVERSAL_OUTAGE,
    };
    use chrono::Duration;
    use velora_core::catalog::ServiceInfo;
    use velora_core::outbox::CompensationOutbox;
    use velora_core::payment::{PaymentAdapter, PaymentAuthStatus};
    use velora_gate::{InMemorySlotStore, SlotStore};

    struct Harness {
        confirmer: Arc<BookingConfirmer>,
        adapter: Arc<MockPaymentAdapter>,
        store: Arc<InMemorySlotStore>,
        outbox: Arc<InMemoryCompensationOutbox>,
        audit: Arc<RecordingAuditSink>,
        service: ServiceInfo,
    }

    fn harness_with_price(price_cents: i32) -> Harness {
        let service = ServiceInfo {
            id: Uuid::new_v4(),
            name: "Deep Tissue Massage".to_string(),
            resource_id: Uuid::new_v4(),
            price_cents,
            currency: "USD".to_string(),
            duration_minutes: 60,
        };
        let store = Arc::new(InMemorySlotStore::new());
        let gate = Arc::new(AvailabilityGate::new(store.clone(), 600));
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
        let compensator = Arc::new(Compensator::new(payments.clone(), outbox.clone()));
        let audit = Arc::new(RecordingAuditSink::new());
        let confirmer = Arc::new(BookingConfirmer::new(
            gate,
            payments,
            compensator,
            Arc::new(StaticCatalog::new().with_service(service.clone())),
            AuditEmitter::new(audit.clone()),
            BookingRules::default(),
            0.15,
        ));
        Harness {
            confirmer,
            adapter,
            store,
            outbox,
            audit,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with_price(8000)
    }

    fn request(service_id: Uuid) -> CheckoutRequest {
        let start = Utc::now() + Duration::hours(2);
        CheckoutRequest {
            service_id,
            start_time: start,
            end_time: start + Duration::hours(1),
            notes: None,
            client_phone: None,
        }
    }

    #[tokio::test]
    async fn full_happy_path_confirms_and_captures() {
        let h = harness();
        let outcome = h
            .confirmer
            .process(&request(h.service.id), "alice")
            .await
            .unwrap();
        assert!(outcome.authorization.client_secret.is_some());

        let confirmed = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap();
        let reservation = confirmed.reservation;
        assert_eq!(reservation.status, ReservationStatus::Confirmed);
        assert_eq!(reservation.amount_cents, 8000);
        assert_eq!(reservation.commission_cents, 1200);
        assert_eq!(reservation.net_cents, 6800);

        let auth = h
            .adapter
            .get_authorization(&outcome.authorization.reference)
            .await
            .unwrap();
        assert_eq!(auth.status, PaymentAuthStatus::Captured);
        assert_eq!(h.audit.outcomes(), vec!["AUTHORIZED", "CONFIRMED"]);
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_hold_or_processor() {
        let h = harness();
        let mut req = request(h.service.id);
        req.start_time = Utc::now() + Duration::minutes(5);
        req.end_time = req.start_time + Duration::hours(1);

        let err = h.confirmer.process(&req, "alice").await.unwrap_err();
        match err {
            BookingError::Validation(violations) => {
                assert_eq!(violations[0].field, "startTime");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(h.adapter.authorize_call_count(), 0);

        // And the slot is still free for a valid attempt
        h.confirmer
            .process(&request(h.service.id), "bob")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_service_is_a_field_violation() {
        let h = harness();
        let err = h
            .confirmer
            .process(&request(Uuid::new_v4()), "alice")
            .await
            .unwrap_err();
        match err {
            BookingError::Validation(violations) => {
                assert_eq!(violations[0].field, "serviceId");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn losing_booker_gets_conflict_and_never_authorizes() {
        let h = harness();
        let req = request(h.service.id);

        h.confirmer.process(&req, "alice").await.unwrap();
        let err = h.confirmer.process(&req, "bob").await.unwrap_err();
        assert!(matches!(err, BookingError::SlotConflict));
        // Only the winner's authorization reached the processor
        assert_eq!(h.adapter.authorize_call_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_bookers_produce_exactly_one_authorization() {
        let h = harness();
        let req = request(h.service.id);

        let mut handles = Vec::new();
        for i in 0..8 {
            let confirmer = h.confirmer.clone();
            let req = req.clone();
            handles.push(tokio::spawn(async move {
                confirmer.process(&req, &format!("booker-{i}")).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(BookingError::SlotConflict) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(h.adapter.authorize_call_count(), 1);
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let h = harness();
        let outcome = h
            .confirmer
            .process(&request(h.service.id), "alice")
            .await
            .unwrap();

        let first = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap();
        let second = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap();
        assert_eq!(first.reservation.id, second.reservation.id);
        // one confirmed reservation, one CONFIRMED audit event
        assert_eq!(
            h.audit.outcomes().iter().filter(|o| *o == "CONFIRMED").count(),
            1
        );
    }

    #[tokio::test]
    async fn declined_authorization_releases_the_hold() {
        let h = harness_with_price(AMOUNT_DECLINED);
        let req = request(h.service.id);

        let err = h.confirmer.process(&req, "alice").await.unwrap_err();
        match err {
            BookingError::PaymentDeclined {
                compensation_triggered,
                ..
            } => assert!(!compensation_triggered),
            other => panic!("expected decline, got {other:?}"),
        }

        // The hold was released, so the slot is free again — and the second
        // attempt fails for the same reason rather than with a conflict
        let err = h.confirmer.process(&req, "bob").await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentDeclined { .. }));
        assert!(h.outbox.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn processor_outage_surfaces_after_retries_and_releases_the_hold() {
        let h = harness_with_price(AMOUNT_OUTAGE);
        let req = request(h.service.id);

        let err = h.confirmer.process(&req, "alice").await.unwrap_err();
        match err {
            BookingError::ProcessorUnavailable {
                compensation_triggered,
            } => assert!(!compensation_triggered),
            other => panic!("expected outage, got {other:?}"),
        }
        // authorize was attempted up to the retry budget
        assert_eq!(h.adapter.authorize_call_count(), 3);
    }

    #[tokio::test]
    async fn hold_lost_at_promotion_voids_the_authorization() {
        let h = harness();
        let outcome = h
            .confirmer
            .process(&request(h.service.id), "alice")
            .await
            .unwrap();

        h.store.expire_hold_now(outcome.hold.hold_id).await;

        let err = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap_err();
        match err {
            BookingError::SlotLost {
                compensation_triggered,
            } => assert!(compensation_triggered),
            other => panic!("expected slot-lost, got {other:?}"),
        }

        let auth = h
            .adapter
            .get_authorization(&outcome.authorization.reference)
            .await
            .unwrap();
        assert_eq!(auth.status, PaymentAuthStatus::Voided);
        assert!(h.outbox.list_pending().await.unwrap().is_empty());
        assert!(h.audit.outcomes().contains(&"SLOT_LOST".to_string()));
    }

    #[tokio::test]
    async fn reaped_hold_at_confirm_voids_the_authorization() {
        let h = harness();
        let outcome = h
            .confirmer
            .process(&request(h.service.id), "alice")
            .await
            .unwrap();

        // Simulate the sweeper racing the client: the hold is gone entirely
        h.store.expire_hold_now(outcome.hold.hold_id).await;
        h.store.sweep_expired(Utc::now()).await.unwrap();

        let err = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::SlotLost {
                compensation_triggered: true
            }
        ));
        let auth = h
            .adapter
            .get_authorization(&outcome.authorization.reference)
            .await
            .unwrap();
        assert_eq!(auth.status, PaymentAuthStatus::Voided);
    }

    #[tokio::test]
    async fn capture_failure_rolls_back_the_reservation_and_voids() {
        let h = harness_with_price(AMOUNT_CAPTURE_FAILS);
        let outcome = h
            .confirmer
            .process(&request(h.service.id), "alice")
            .await
            .unwrap();

        let err = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap_err();
        match err {
            BookingError::PaymentDeclined {
                compensation_triggered,
                ..
            } => assert!(compensation_triggered),
            other => panic!("expected decline, got {other:?}"),
        }

        // The confirmed row was rolled back and the money reversed
        assert!(h
            .confirmer
            .reservation(outcome.hold.hold_id)
            .await
            .unwrap()
            .is_none());
        let auth = h
            .adapter
            .get_authorization(&outcome.authorization.reference)
            .await
            .unwrap();
        assert_eq!(auth.status, PaymentAuthStatus::Voided);
    }

    #[tokio::test]
    async fn failed_compensation_is_deferred_to_the_outbox() {
        let h = harness_with_price(AMOUNT_REVERSAL_OUTAGE);
        let outcome = h
            .confirmer
            .process(&request(h.service.id), "alice")
            .await
            .unwrap();

        h.store.expire_hold_now(outcome.hold.hold_id).await;

        let err = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap_err();
        // The caller still sees slot-lost, not a compensation error
        assert!(matches!(err, BookingError::SlotLost { .. }));

        let pending = h.outbox.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payment_reference, outcome.authorization.reference);
    }

    #[tokio::test]
    async fn unknown_payment_intent_is_not_found() {
        let h = harness();
        let err = h.confirmer.confirm("pay_bogus").await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_refunds_and_frees_the_slot() {
        let h = harness();
        let req = request(h.service.id);
        let outcome = h.confirmer.process(&req, "alice").await.unwrap();
        let confirmed = h
            .confirmer
            .confirm(&outcome.authorization.reference)
            .await
            .unwrap();

        let result = h
            .confirmer
            .cancel(confirmed.reservation.id, "customer request")
            .await
            .unwrap();
        assert_eq!(result, CompensationResult::Refunded);

        let auth = h
            .adapter
            .get_authorization(&outcome.authorization.reference)
            .await
            .unwrap();
        assert_eq!(auth.status, PaymentAuthStatus::Refunded);

        // The slot is bookable again
        h.confirmer.process(&req, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn cancel_unknown_reservation_is_not_found() {
        let h = harness();
        let err = h
            .confirmer
            .cancel(Uuid::new_v4(), "customer request")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::interval::Interval;
use crate::models::{BookingDetails, CommissionSplit, HoldToken, Reservation};
use crate::store::{GateError, SlotStore};

/// The single point of truth for "is this resource free in this interval".
/// Owns hold lifecycle policy (TTL) and delegates atomicity to the store;
/// no other component creates, promotes, or deletes holds.
pub struct AvailabilityGate {
    store: Arc<dyn SlotStore>,
    hold_ttl: Duration,
}

impl AvailabilityGate {
    pub fn new(store: Arc<dyn SlotStore>, hold_ttl_seconds: u64) -> Self {
        Self {
            store,
            hold_ttl: Duration::seconds(hold_ttl_seconds as i64),
        }
    }

    /// First atomic claim wins; losers get `Conflict` and must not retry.
    pub async fn try_hold(
        &self,
        resource_id: Uuid,
        interval: Interval,
        holder_id: &str,
        details: &BookingDetails,
    ) -> Result<HoldToken, GateError> {
        let expires_at = Utc::now() + self.hold_ttl;
        let token = self
            .store
            .try_hold(resource_id, interval, holder_id, details, expires_at)
            .await?;
        info!(
            hold_id = %token.hold_id,
            resource_id = %resource_id,
            expires_at = %expires_at,
            "slot held"
        );
        Ok(token)
    }

    pub async fn promote(
        &self,
        token: &HoldToken,
        payment_reference: &str,
        split: CommissionSplit,
    ) -> Result<Reservation, GateError> {
        let reservation = self.store.promote(token, payment_reference, split).await?;
        info!(reservation_id = %reservation.id, "hold promoted to confirmed reservation");
        Ok(reservation)
    }

    pub async fn release(&self, token: &HoldToken) -> Result<(), GateError> {
        self.store.release(token).await
    }

    pub async fn attach_payment(
        &self,
        token: &HoldToken,
        reference: &str,
    ) -> Result<(), GateError> {
        self.store.attach_payment(token, reference).await
    }

    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, GateError> {
        self.store.find_by_payment_reference(reference).await
    }

    pub async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, GateError> {
        self.store.get_reservation(id).await
    }

    pub async fn cancel_confirmed(&self, id: Uuid) -> Result<Reservation, GateError> {
        let reservation = self.store.cancel_confirmed(id).await?;
        info!(reservation_id = %id, "reservation cancelled");
        Ok(reservation)
    }

    pub async fn rollback_confirmed(&self, id: Uuid) -> Result<(), GateError> {
        warn!(reservation_id = %id, "rolling back confirmed reservation");
        self.store.rollback_confirmed(id).await
    }

    /// Background reap complementing the lazy reap in `try_hold`; an expired
    /// hold must never block a resource indefinitely.
    pub async fn sweep_expired(&self) -> Result<usize, GateError> {
        let reaped = self.store.sweep_expired(Utc::now()).await?;
        if reaped > 0 {
            info!(reaped, "swept expired slot holds");
        }
        Ok(reaped)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::interval::Interval;
use crate::models::{BookingDetails, CommissionSplit, HoldToken, Reservation};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The interval is already claimed by a live hold or a confirmed
    /// reservation. Terminal for the attempt; callers must not auto-retry.
    #[error("slot conflict on resource {resource_id}")]
    Conflict { resource_id: Uuid },

    /// The hold's TTL lapsed or it was reaped before promotion.
    #[error("hold {0} expired or no longer exists")]
    HoldExpired(Uuid),

    #[error("interval start must be strictly before end")]
    InvalidInterval,

    #[error("reservation not found: {0}")]
    NotFound(Uuid),

    #[error("slot storage error: {0}")]
    Storage(String),
}

/// The durable store behind the Availability Gate. Every check-and-reserve is
/// a single atomic operation at the store; nothing here is read-then-written
/// in two steps by the application.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Atomically claim `interval` on `resource_id`. Expired holds overlapping
    /// the target are reaped in the same operation. Overlap with a live claim
    /// returns `Conflict` with no side effect.
    async fn try_hold(
        &self,
        resource_id: Uuid,
        interval: Interval,
        holder_id: &str,
        details: &BookingDetails,
        expires_at: DateTime<Utc>,
    ) -> Result<HoldToken, GateError>;

    /// In one transaction: re-validate the hold (exists, same holder,
    /// unexpired) and flip it to CONFIRMED with the payment reference and
    /// commission split recorded.
    async fn promote(
        &self,
        token: &HoldToken,
        payment_reference: &str,
        split: CommissionSplit,
    ) -> Result<Reservation, GateError>;

    /// Idempotent delete of a hold. Releasing a missing or expired hold is
    /// not an error.
    async fn release(&self, token: &HoldToken) -> Result<(), GateError>;

    /// Record the payment reference on a live hold so the confirm call can
    /// correlate the attempt. Fails like `promote` if the hold is gone.
    async fn attach_payment(&self, token: &HoldToken, reference: &str) -> Result<(), GateError>;

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, GateError>;

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, GateError>;

    /// Mark a confirmed reservation CANCELLED (frees the slot, keeps the
    /// row). Idempotent on already-cancelled rows.
    async fn cancel_confirmed(&self, id: Uuid) -> Result<Reservation, GateError>;

    /// Delete a confirmed row outright. Used only when capture fails after
    /// promotion; runs as its own short transaction.
    async fn rollback_confirmed(&self, id: Uuid) -> Result<(), GateError>;

    /// Delete all expired holds, returning how many were reaped.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, GateError>;
}

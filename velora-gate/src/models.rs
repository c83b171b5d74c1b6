use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::Interval;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Held,
    Confirmed,
    Cancelled,
}

/// A reservation row. A hold is the HELD phase of the same row: it carries
/// `expires_at` and is either promoted to CONFIRMED or deleted. One exclusion
/// rule covers both phases: for a given resource, no two rows in
/// {HELD, CONFIRMED} may overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub service_id: Uuid,
    pub customer_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
    pub payment_reference: Option<String>,
    pub amount_cents: i32,
    pub currency: String,
    pub commission_cents: i32,
    pub net_cents: i32,
    pub notes: Option<String>,
    pub contact_phone: Option<String>,
    /// Set while HELD; cleared on promotion.
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn interval(&self) -> Interval {
        // Stored rows always satisfy start < end
        Interval::new(self.start_time, self.end_time).expect("stored interval is valid")
    }
}

/// Opaque proof of a live hold, returned by `try_hold` and required by
/// `promote`/`release`. Only the gate mints these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldToken {
    pub hold_id: Uuid,
    pub resource_id: Uuid,
    pub holder_id: String,
    pub interval: Interval,
    pub expires_at: DateTime<Utc>,
    pub version: i64,
}

/// Booking payload carried on the hold so promotion is a pure status flip.
#[derive(Debug, Clone)]
pub struct BookingDetails {
    pub service_id: Uuid,
    pub amount_cents: i32,
    pub currency: String,
    pub notes: Option<String>,
    pub contact_phone: Option<String>,
}

/// Flat commission split recorded at confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub commission_cents: i32,
    pub net_cents: i32,
}

impl CommissionSplit {
    /// Provider keeps the remainder after the platform commission; rounding
    /// always favors the provider.
    pub fn of(amount_cents: i32, commission_rate: f64) -> Self {
        let commission_cents = (amount_cents as f64 * commission_rate).floor() as i32;
        Self {
            commission_cents,
            net_cents: amount_cents - commission_cents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_split_rounds_down() {
        let split = CommissionSplit::of(9999, 0.15);
        assert_eq!(split.commission_cents, 1499);
        assert_eq!(split.net_cents, 8500);
        assert_eq!(split.commission_cents + split.net_cents, 9999);
    }

    #[test]
    fn zero_rate_gives_everything_to_provider() {
        let split = CommissionSplit::of(5000, 0.0);
        assert_eq!(split.commission_cents, 0);
        assert_eq!(split.net_cents, 5000);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use rand::Rng;
use velora_core::payment::PaymentAuthorization;
use velora_gate::{BookingDetails, HoldToken, Interval, Reservation};

/// Raw checkout submission as received from the client. Normalization and
/// rule checks happen in the validator; nothing here is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_phone: Option<String>,
}

/// A request that passed every validation rule: interval proven well-formed,
/// notes trimmed and escaped, price resolved from the catalog.
#[derive(Debug, Clone)]
pub struct ValidBooking {
    pub resource_id: Uuid,
    pub service_id: Uuid,
    pub interval: Interval,
    pub amount_cents: i32,
    pub currency: String,
    pub notes: Option<String>,
    pub contact_phone: Option<String>,
}

impl ValidBooking {
    pub fn details(&self) -> BookingDetails {
        BookingDetails {
            service_id: self.service_id,
            amount_cents: self.amount_cents,
            currency: self.currency.clone(),
            notes: self.notes.clone(),
            contact_phone: self.contact_phone.clone(),
        }
    }
}

/// Validation windows. Defaults are the product rules; deployments override
/// them through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRules {
    pub min_lead_minutes: i64,
    pub max_advance_days: i64,
    pub max_duration_minutes: i64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            min_lead_minutes: 30,
            max_advance_days: 180,
            max_duration_minutes: 8 * 60,
        }
    }
}

/// Bounded exponential backoff for transient processor failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt: capped exponential with up to 50%
    /// jitter so concurrent retries don't synchronize.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exp = self.base_delay_ms.saturating_mul(1u64 << shift);
        let capped = exp.min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped.max(2) / 2);
        Duration::from_millis(capped + jitter)
    }
}

/// The one-way state machine of a booking attempt. Logged at each
/// transition; no phase is ever re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Validating,
    Holding,
    Authorizing,
    Confirming,
    Confirmed,
    Compensating,
    Failed,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptPhase::Validating => "VALIDATING",
            AttemptPhase::Holding => "HOLDING",
            AttemptPhase::Authorizing => "AUTHORIZING",
            AttemptPhase::Confirming => "CONFIRMING",
            AttemptPhase::Confirmed => "CONFIRMED",
            AttemptPhase::Compensating => "COMPENSATING",
            AttemptPhase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Result of `process`: the slot is held and the payment authorized, awaiting
/// client confirmation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub attempt_id: Uuid,
    pub hold: HoldToken,
    pub authorization: PaymentAuthorization,
}

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub reservation: Reservation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_stays_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        // jitter adds at most 50% on top of the capped delay
        assert!(policy.delay_for(1) >= Duration::from_millis(100));
        assert!(policy.delay_for(1) <= Duration::from_millis(150));
        assert!(policy.delay_for(4) >= Duration::from_millis(800));
        assert!(policy.delay_for(10) <= Duration::from_millis(1_500));
    }
}

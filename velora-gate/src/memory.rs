use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::interval::Interval;
use crate::models::{
    BookingDetails, CommissionSplit, HoldToken, Reservation, ReservationStatus,
};
use crate::store::{GateError, SlotStore};

/// In-memory `SlotStore` with the same semantics as the Postgres
/// implementation: every check-and-reserve happens under a single lock
/// acquisition, mirroring the database's single atomic statement. Used by
/// unit and API tests; never by production wiring.
#[derive(Default)]
pub struct InMemorySlotStore {
    rows: Mutex<HashMap<Uuid, Reservation>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(row: &Reservation, now: DateTime<Utc>) -> bool {
        match row.status {
            ReservationStatus::Confirmed => true,
            ReservationStatus::Held => row.expires_at.map(|e| e > now).unwrap_or(false),
            ReservationStatus::Cancelled => false,
        }
    }

    /// Test support: backdate a hold's expiry so TTL-lapse paths can be
    /// exercised deterministically.
    pub async fn expire_hold_now(&self, hold_id: Uuid) {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get_mut(&hold_id) {
            if row.status == ReservationStatus::Held {
                row.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
            }
        }
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn try_hold(
        &self,
        resource_id: Uuid,
        interval: Interval,
        holder_id: &str,
        details: &BookingDetails,
        expires_at: DateTime<Utc>,
    ) -> Result<HoldToken, GateError> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();

        // Lazy reap: expired holds are treated as absent
        rows.retain(|_, row| {
            row.status != ReservationStatus::Held
                || row.expires_at.map(|e| e > now).unwrap_or(false)
        });

        let conflict = rows.values().any(|row| {
            row.resource_id == resource_id
                && Self::is_live(row, now)
                && row.interval().overlaps(&interval)
        });
        if conflict {
            return Err(GateError::Conflict { resource_id });
        }

        let id = Uuid::new_v4();
        let row = Reservation {
            id,
            resource_id,
            service_id: details.service_id,
            customer_id: holder_id.to_string(),
            start_time: interval.start(),
            end_time: interval.end(),
            status: ReservationStatus::Held,
            payment_reference: None,
            amount_cents: details.amount_cents,
            currency: details.currency.clone(),
            commission_cents: 0,
            net_cents: 0,
            notes: details.notes.clone(),
            contact_phone: details.contact_phone.clone(),
            expires_at: Some(expires_at),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        rows.insert(id, row);

        Ok(HoldToken {
            hold_id: id,
            resource_id,
            holder_id: holder_id.to_string(),
            interval,
            expires_at,
            version: 1,
        })
    }

    async fn promote(
        &self,
        token: &HoldToken,
        payment_reference: &str,
        split: CommissionSplit,
    ) -> Result<Reservation, GateError> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();

        let row = rows
            .get_mut(&token.hold_id)
            .ok_or(GateError::HoldExpired(token.hold_id))?;
        if row.status != ReservationStatus::Held
            || row.customer_id != token.holder_id
            || row.expires_at.map(|e| e <= now).unwrap_or(true)
        {
            return Err(GateError::HoldExpired(token.hold_id));
        }

        row.status = ReservationStatus::Confirmed;
        row.payment_reference = Some(payment_reference.to_string());
        row.commission_cents = split.commission_cents;
        row.net_cents = split.net_cents;
        row.expires_at = None;
        row.version += 1;
        row.updated_at = now;

        Ok(row.clone())
    }

    async fn release(&self, token: &HoldToken) -> Result<(), GateError> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.get(&token.hold_id) {
            if row.status == ReservationStatus::Held {
                rows.remove(&token.hold_id);
            }
        }
        Ok(())
    }

    async fn attach_payment(&self, token: &HoldToken, reference: &str) -> Result<(), GateError> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();

        let row = rows
            .get_mut(&token.hold_id)
            .ok_or(GateError::HoldExpired(token.hold_id))?;
        if row.status != ReservationStatus::Held
            || row.customer_id != token.holder_id
            || row.expires_at.map(|e| e <= now).unwrap_or(true)
        {
            return Err(GateError::HoldExpired(token.hold_id));
        }

        row.payment_reference = Some(reference.to_string());
        row.version += 1;
        row.updated_at = now;
        Ok(())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, GateError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .find(|row| row.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, GateError> {
        let rows = self.rows.lock().await;
        Ok(rows.get(&id).cloned())
    }

    async fn cancel_confirmed(&self, id: Uuid) -> Result<Reservation, GateError> {
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(GateError::NotFound(id))?;
        match row.status {
            ReservationStatus::Confirmed => {
                row.status = ReservationStatus::Cancelled;
                row.version += 1;
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
            ReservationStatus::Cancelled => Ok(row.clone()),
            ReservationStatus::Held => Err(GateError::NotFound(id)),
        }
    }

    async fn rollback_confirmed(&self, id: Uuid) -> Result<(), GateError> {
        let mut rows = self.rows.lock().await;
        rows.remove(&id);
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, GateError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, row| {
            row.status != ReservationStatus::Held
                || row.expires_at.map(|e| e > now).unwrap_or(false)
        });
        Ok(before - rows.len())
    }
}

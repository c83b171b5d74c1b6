use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use velora_gate::{
    BookingDetails, CommissionSplit, GateError, HoldToken, Interval, Reservation,
    ReservationStatus, SlotStore,
};

/// Postgres error code for an exclusion-constraint violation.
const EXCLUSION_VIOLATION: &str = "23P01";

/// `SlotStore` backed by the reservations table. The exclusion constraint on
/// `(resource_id, tstzrange(start_time, end_time))` is what makes `try_hold`
/// a single atomic check-and-reserve: concurrent inserts race at the index,
/// and exactly one commits.
pub struct PgSlotStore {
    pool: PgPool,
}

impl PgSlotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> Result<ReservationStatus, GateError> {
    match s {
        "HELD" => Ok(ReservationStatus::Held),
        "CONFIRMED" => Ok(ReservationStatus::Confirmed),
        "CANCELLED" => Ok(ReservationStatus::Cancelled),
        other => Err(GateError::Storage(format!(
            "unknown reservation status '{other}'"
        ))),
    }
}

fn row_to_reservation(row: &PgRow) -> Result<Reservation, GateError> {
    let status: String = row.try_get("status").map_err(storage)?;

    Ok(Reservation {
        id: row.try_get("id").map_err(storage)?,
        resource_id: row.try_get("resource_id").map_err(storage)?,
        service_id: row.try_get("service_id").map_err(storage)?,
        customer_id: row.try_get("customer_id").map_err(storage)?,
        start_time: row.try_get("start_time").map_err(storage)?,
        end_time: row.try_get("end_time").map_err(storage)?,
        status: parse_status(&status)?,
        payment_reference: row.try_get("payment_reference").map_err(storage)?,
        amount_cents: row.try_get("amount_cents").map_err(storage)?,
        currency: row.try_get("currency").map_err(storage)?,
        commission_cents: row.try_get("commission_cents").map_err(storage)?,
        net_cents: row.try_get("net_cents").map_err(storage)?,
        notes: row.try_get("notes").map_err(storage)?,
        contact_phone: row.try_get("contact_phone").map_err(storage)?,
        expires_at: row.try_get("expires_at").map_err(storage)?,
        version: row.try_get("version").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

fn storage(err: sqlx::Error) -> GateError {
    GateError::Storage(err.to_string())
}

const RESERVATION_COLUMNS: &str = "id, resource_id, service_id, customer_id, start_time, end_time, \
     status, payment_reference, amount_cents, currency, commission_cents, net_cents, \
     notes, contact_phone, expires_at, version, created_at, updated_at";

#[async_trait]
impl SlotStore for PgSlotStore {
    async fn try_hold(
        &self,
        resource_id: Uuid,
        interval: Interval,
        holder_id: &str,
        details: &BookingDetails,
        expires_at: DateTime<Utc>,
    ) -> Result<HoldToken, GateError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Lazy reap: expired holds overlapping the target are treated as
        // absent. Runs in the same transaction as the insert.
        sqlx::query(
            "DELETE FROM reservations
             WHERE resource_id = $1 AND status = 'HELD'
               AND expires_at <= NOW()
               AND start_time < $3 AND end_time > $2",
        )
        .bind(resource_id)
        .bind(interval.start())
        .bind(interval.end())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let hold_id = Uuid::new_v4();
        let insert = sqlx::query(
            "INSERT INTO reservations
               (id, resource_id, service_id, customer_id, start_time, end_time,
                status, amount_cents, currency, notes, contact_phone, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, 'HELD', $7, $8, $9, $10, $11)",
        )
        .bind(hold_id)
        .bind(resource_id)
        .bind(details.service_id)
        .bind(holder_id)
        .bind(interval.start())
        .bind(interval.end())
        .bind(details.amount_cents)
        .bind(&details.currency)
        .bind(&details.notes)
        .bind(&details.contact_phone)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(EXCLUSION_VIOLATION) => {
                // Another live hold or confirmed reservation owns the
                // interval; no side effect, terminal for this attempt
                return Err(GateError::Conflict { resource_id });
            }
            Err(err) => return Err(storage(err)),
        }

        tx.commit().await.map_err(storage)?;

        Ok(HoldToken {
            hold_id,
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
        let row = sqlx::query(&format!(
            "UPDATE reservations
                SET status = 'CONFIRMED', payment_reference = $2,
                    commission_cents = $3, net_cents = $4,
                    expires_at = NULL, version = version + 1, updated_at = NOW()
              WHERE id = $1 AND status = 'HELD' AND customer_id = $5
                AND expires_at > NOW()
              RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(token.hold_id)
        .bind(payment_reference)
        .bind(split.commission_cents)
        .bind(split.net_cents)
        .bind(&token.holder_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row_to_reservation(&row),
            None => Err(GateError::HoldExpired(token.hold_id)),
        }
    }

    async fn release(&self, token: &HoldToken) -> Result<(), GateError> {
        // Idempotent: deleting a missing, expired, or already-promoted hold
        // is a no-op
        sqlx::query("DELETE FROM reservations WHERE id = $1 AND status = 'HELD'")
            .bind(token.hold_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn attach_payment(&self, token: &HoldToken, reference: &str) -> Result<(), GateError> {
        let result = sqlx::query(
            "UPDATE reservations
                SET payment_reference = $2, version = version + 1, updated_at = NOW()
              WHERE id = $1 AND status = 'HELD' AND customer_id = $3
                AND expires_at > NOW()",
        )
        .bind(token.hold_id)
        .bind(reference)
        .bind(&token.holder_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(GateError::HoldExpired(token.hold_id));
        }
        Ok(())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, GateError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(row_to_reservation).transpose()
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, GateError> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(row_to_reservation).transpose()
    }

    async fn cancel_confirmed(&self, id: Uuid) -> Result<Reservation, GateError> {
        let row = sqlx::query(&format!(
            "UPDATE reservations
                SET status = 'CANCELLED', version = version + 1, updated_at = NOW()
              WHERE id = $1 AND status = 'CONFIRMED'
              RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        if let Some(row) = row {
            return row_to_reservation(&row);
        }

        // Idempotency: cancelling an already-cancelled reservation succeeds
        match self.get_reservation(id).await? {
            Some(existing) if existing.status == ReservationStatus::Cancelled => Ok(existing),
            _ => Err(GateError::NotFound(id)),
        }
    }

    async fn rollback_confirmed(&self, id: Uuid) -> Result<(), GateError> {
        sqlx::query("DELETE FROM reservations WHERE id = $1 AND status = 'CONFIRMED'")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, GateError> {
        let result =
            sqlx::query("DELETE FROM reservations WHERE status = 'HELD' AND expires_at <= $1")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_covers_the_schema_check() {
        assert_eq!(parse_status("HELD").unwrap(), ReservationStatus::Held);
        assert_eq!(
            parse_status("CONFIRMED").unwrap(),
            ReservationStatus::Confirmed
        );
        assert_eq!(
            parse_status("CANCELLED").unwrap(),
            ReservationStatus::Cancelled
        );
        assert!(parse_status("PENDING").is_err());
    }
}

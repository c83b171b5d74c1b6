use async_trait::async_trait;
use sqlx::{PgPool, Row};

use velora_core::outbox::{CompensationOutbox, CompensationPending};

pub struct PgCompensationOutbox {
    pool: PgPool,
}

impl PgCompensationOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompensationOutbox for PgCompensationOutbox {
    async fn record_pending(
        &self,
        row: &CompensationPending,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query(
            "INSERT INTO compensation_outbox
               (id, payment_reference, reason, attempts, last_error, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(row.id)
        .bind(&row.payment_reference)
        .bind(&row.reason)
        .bind(row.attempts)
        .bind(&row.last_error)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_pending(
        &self,
    ) -> Result<Vec<CompensationPending>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query(
            "SELECT id, payment_reference, reason, attempts, last_error, created_at
               FROM compensation_outbox
              WHERE resolved_at IS NULL
              ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CompensationPending {
                    id: row.try_get("id")?,
                    payment_reference: row.try_get("payment_reference")?,
                    reason: row.try_get("reason")?,
                    attempts: row.try_get("attempts")?,
                    last_error: row.try_get("last_error")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

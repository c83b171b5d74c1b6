use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use velora_core::catalog::{ServiceCatalog, ServiceInfo};

/// Read-only view of the services table. Catalog management belongs to a
/// separate system; checkout only looks prices and durations up.
pub struct PgServiceCatalog {
    pool: PgPool,
}

impl PgServiceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceCatalog for PgServiceCatalog {
    async fn get_service(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ServiceInfo>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query(
            "SELECT id, name, resource_id, price_cents, currency, duration_minutes
               FROM services WHERE id = $1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ServiceInfo {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                resource_id: row.try_get("resource_id")?,
                price_cents: row.try_get("price_cents")?,
                currency: row.try_get("currency")?,
                duration_minutes: row.try_get("duration_minutes")?,
            })),
            None => Ok(None),
        }
    }
}

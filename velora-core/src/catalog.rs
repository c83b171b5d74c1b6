use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the checkout flow needs to know about a bookable service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: Uuid,
    pub name: String,
    /// The provider resource (chair, room, stylist) this service occupies.
    pub resource_id: Uuid,
    pub price_cents: i32,
    pub currency: String,
    pub duration_minutes: i32,
}

/// Read-only catalog collaborator. Pricing and service management live in a
/// separate system; checkout only looks services up.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ServiceInfo>, Box<dyn std::error::Error + Send + Sync>>;
}

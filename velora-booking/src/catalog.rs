use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use velora_core::catalog::{ServiceCatalog, ServiceInfo};

/// Fixed catalog used by tests and local wiring; production reads the
/// services table instead.
#[derive(Default)]
pub struct StaticCatalog {
    services: HashMap<Uuid, ServiceInfo>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: ServiceInfo) -> Self {
        self.services.insert(service.id, service);
        self
    }
}

#[async_trait]
impl ServiceCatalog for StaticCatalog {
    async fn get_service(
        &self,
        service_id: Uuid,
    ) -> Result<Option<ServiceInfo>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.services.get(&service_id).cloned())
    }
}

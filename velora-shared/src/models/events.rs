use uuid::Uuid;

/// Terminal outcome of a checkout attempt, published to the audit collaborator.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CheckoutAuditEvent {
    pub attempt_id: Uuid,
    pub outcome: String,
    pub resource_id: Uuid,
    pub amount_cents: i32,
    pub currency: String,
    pub started_at: i64,
    pub finished_at: i64,
}

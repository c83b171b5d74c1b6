use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use velora_booking::compensator::CompensationResult;
use velora_booking::CheckoutRequest;
use velora_core::BookingError;
use velora_gate::Reservation;
use velora_shared::Masked;

use crate::error::AppError;
use crate::middleware::CustomerClaims;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    pub payment_intent: PaymentIntentBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentBody {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCheckoutRequest {
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub success: bool,
    pub reservation: ReservationBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationBody {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub service_id: Uuid,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub status: String,
    pub amount_cents: i32,
    pub currency: String,
    pub notes: Option<String>,
    pub contact_phone: Option<Masked<String>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Reservation> for ReservationBody {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            resource_id: r.resource_id,
            service_id: r.service_id,
            start_time: r.start_time,
            end_time: r.end_time,
            status: format!("{:?}", r.status).to_uppercase(),
            amount_cents: r.amount_cents,
            currency: r.currency,
            notes: r.notes,
            contact_phone: r.contact_phone.map(Masked),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub success: bool,
    pub compensation: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/checkout/process", post(process_checkout))
        .route("/v1/checkout/confirm", post(confirm_checkout))
        .route(
            "/v1/checkout/{reservation_id}/cancel",
            delete(cancel_reservation),
        )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/checkout/process
/// Validate the request, claim the slot, authorize the payment.
async fn process_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<ProcessResponse>, AppError> {
    let outcome = state.checkout.process(&req, &claims.sub).await?;

    Ok(Json(ProcessResponse {
        success: true,
        payment_intent: PaymentIntentBody {
            id: outcome.authorization.reference,
            client_secret: outcome.authorization.client_secret,
        },
    }))
}

/// POST /v1/checkout/confirm
/// Promote the hold and capture the authorized payment. Idempotent.
async fn confirm_checkout(
    State(state): State<AppState>,
    Extension(_claims): Extension<CustomerClaims>,
    Json(req): Json<ConfirmCheckoutRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let outcome = state.checkout.confirm(&req.payment_intent_id).await?;

    Ok(Json(ConfirmResponse {
        success: true,
        reservation: outcome.reservation.into(),
    }))
}

/// DELETE /v1/checkout/{reservation_id}/cancel
/// Cancel a confirmed reservation; the refund goes through the Compensator.
async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(reservation_id): Path<Uuid>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    // Verify ownership before touching the reservation
    let reservation = state
        .checkout
        .reservation(reservation_id)
        .await?
        .ok_or_else(|| {
            AppError::Booking(BookingError::NotFound(reservation_id.to_string()))
        })?;
    if reservation.customer_id != claims.sub {
        return Err(AppError::AuthorizationError(
            "Reservation does not belong to you".to_string(),
        ));
    }

    let reason = req.reason.as_deref().unwrap_or("customer cancellation");
    let result = state.checkout.cancel(reservation_id, reason).await?;

    let compensation = match result {
        CompensationResult::Voided => "VOIDED",
        CompensationResult::Refunded => "REFUNDED",
        CompensationResult::AlreadySettled => "ALREADY_SETTLED",
        CompensationResult::Pending => "PENDING",
    };

    Ok(Json(CancelResponse {
        success: true,
        compensation: compensation.to_string(),
    }))
}

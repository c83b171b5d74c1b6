use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use velora_core::BookingError;

#[derive(Debug)]
pub enum AppError {
    AuthorizationError(String),
    Booking(BookingError),
    Anyhow(anyhow::Error),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::Booking(err) => return booking_error_response(err),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Each booking failure maps to a distinct error code: validation failures
/// are resubmittable, a slot conflict needs a new interval, and anything
/// that happened after authorization says whether a reversal was initiated.
fn booking_error_response(err: BookingError) -> Response {
    let (status, body) = match err {
        BookingError::Validation(violations) => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": "VALIDATION_FAILED",
                "violations": violations,
            }),
        ),
        BookingError::SlotConflict => (
            StatusCode::CONFLICT,
            json!({
                "error": "SLOT_NO_LONGER_AVAILABLE",
                "compensationTriggered": false,
            }),
        ),
        BookingError::SlotLost {
            compensation_triggered,
        } => (
            StatusCode::CONFLICT,
            json!({
                "error": "SLOT_NO_LONGER_AVAILABLE",
                "compensationTriggered": compensation_triggered,
            }),
        ),
        BookingError::PaymentDeclined {
            reason,
            compensation_triggered,
        } => (
            StatusCode::PAYMENT_REQUIRED,
            json!({
                "error": "PAYMENT_DECLINED",
                "message": reason,
                "compensationTriggered": compensation_triggered,
            }),
        ),
        BookingError::ProcessorUnavailable {
            compensation_triggered,
        } => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "error": "PAYMENT_PROVIDER_UNAVAILABLE",
                "compensationTriggered": compensation_triggered,
            }),
        ),
        BookingError::NotFound(msg) => (
            StatusCode::NOT_FOUND,
            json!({ "error": "NOT_FOUND", "message": msg }),
        ),
        BookingError::Internal(msg) => {
            tracing::error!("Internal Server Error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal Server Error" }),
            )
        }
    };

    (status, Json(body)).into_response()
}

pub mod audit;
pub mod catalog;
pub mod outbox;
pub mod payment;

use serde::{Deserialize, Serialize};

/// A single field-level validation failure, returned to the caller as part of
/// a 400 response so every violation is visible at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// The outcome taxonomy for a checkout attempt. Variants that can occur after
/// money was authorized carry `compensation_triggered` so the caller always
/// knows whether a reversal was initiated.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error("slot is no longer available")]
    SlotConflict,

    /// The hold was lost between authorization and confirmation (TTL lapsed
    /// or another attempt won the resource).
    #[error("slot was lost after payment authorization")]
    SlotLost { compensation_triggered: bool },

    #[error("payment declined: {reason}")]
    PaymentDeclined {
        reason: String,
        compensation_triggered: bool,
    },

    #[error("payment processor unavailable")]
    ProcessorUnavailable { compensation_triggered: bool },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Whether a void/refund was initiated for this failure.
    pub fn compensation_triggered(&self) -> bool {
        match self {
            BookingError::SlotLost {
                compensation_triggered,
            }
            | BookingError::PaymentDeclined {
                compensation_triggered,
                ..
            }
            | BookingError::ProcessorUnavailable {
                compensation_triggered,
            } => *compensation_triggered,
            _ => false,
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

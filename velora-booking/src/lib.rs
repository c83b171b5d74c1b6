pub mod audit;
pub mod catalog;
pub mod compensator;
pub mod confirmer;
pub mod models;
pub mod orchestrator;
pub mod validator;

pub use audit::{AuditEmitter, TracingAuditSink};
pub use compensator::{Compensator, CompensationResult};
pub use confirmer::BookingConfirmer;
pub use models::{BookingRules, CheckoutRequest, ConfirmOutcome, ProcessOutcome, RetryPolicy};
pub use orchestrator::{MockPaymentAdapter, PaymentOrchestrator};

use std::sync::Arc;

use velora_booking::BookingConfirmer;

use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

pub struct Resiliency {
    pub payment_cb: CircuitBreaker,
}

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<BookingConfirmer>,
    pub auth: AuthConfig,
    pub resiliency: Arc<Resiliency>,
}

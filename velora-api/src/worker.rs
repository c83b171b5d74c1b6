use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use velora_gate::AvailabilityGate;

/// Background sweep of expired holds. The gate also reaps lazily inside
/// `try_hold`; this loop guarantees progress even for resources nobody is
/// currently asking about, so a crashed attempt can never park a slot.
pub async fn start_hold_sweeper(gate: Arc<AvailabilityGate>, period_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(period_seconds));
    info!(period_seconds, "hold sweeper started");

    loop {
        ticker.tick().await;
        match gate.sweep_expired().await {
            Ok(0) => {}
            Ok(reaped) => info!(reaped, "hold sweeper reclaimed expired holds"),
            Err(e) => error!("hold sweep failed: {}", e),
        }
    }
}

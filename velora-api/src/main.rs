use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use velora_api::middleware::resiliency::CircuitBreaker;
use velora_api::state::{AppState, AuthConfig, Resiliency};
use velora_api::{app, worker};
use velora_booking::audit::{AuditEmitter, TracingAuditSink};
use velora_booking::compensator::Compensator;
use velora_booking::models::{BookingRules, RetryPolicy};
use velora_booking::orchestrator::{MockPaymentAdapter, PaymentOrchestrator};
use velora_booking::BookingConfirmer;
use velora_gate::AvailabilityGate;
use velora_store::{DbClient, PgCompensationOutbox, PgServiceCatalog, PgSlotStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velora_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = velora_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Velora API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let rules = &config.business_rules;
    let gate = Arc::new(AvailabilityGate::new(
        Arc::new(PgSlotStore::new(db.pool.clone())),
        rules.hold_ttl_seconds,
    ));
    let payments = Arc::new(PaymentOrchestrator::new(
        // Processor sandbox adapter; swap for the live adapter at deploy time
        Arc::new(MockPaymentAdapter::new()),
        RetryPolicy {
            max_attempts: rules.payment_retry_attempts,
            base_delay_ms: rules.payment_retry_base_ms,
            max_delay_ms: rules.payment_retry_max_ms,
        },
    ));
    let compensator = Arc::new(Compensator::new(
        payments.clone(),
        Arc::new(PgCompensationOutbox::new(db.pool.clone())),
    ));
    let confirmer = Arc::new(BookingConfirmer::new(
        gate.clone(),
        payments,
        compensator,
        Arc::new(PgServiceCatalog::new(db.pool.clone())),
        AuditEmitter::new(Arc::new(TracingAuditSink)),
        BookingRules {
            min_lead_minutes: rules.min_lead_minutes,
            max_advance_days: rules.max_advance_days,
            max_duration_minutes: rules.max_duration_minutes,
        },
        rules.commission_rate,
    ));

    // Reap expired holds in the background so crashed attempts free their slots
    tokio::spawn(worker::start_hold_sweeper(gate, 60));

    let app_state = AppState {
        checkout: confirmer,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        resiliency: Arc::new(Resiliency {
            payment_cb: CircuitBreaker::new("payment", 5, Duration::from_secs(30)),
        }),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

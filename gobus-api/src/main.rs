use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gobus_api::{
    app, bootstrap,
    state::{AppState, AuthConfig},
};
use gobus_booking::{BookingLifecycle, ReservationEngine};
use gobus_core::notify::Notifier;
use gobus_core::rate::FlatRate;
use gobus_core::reference::SystemReferences;
use gobus_core::store::ReservationStore;
use gobus_store::mailer::{LogMailer, SmtpMailer};
use gobus_store::{
    DbClient, FleetRepository, PgReservationStore, RefreshTokenStore, RiderRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gobus_api=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = gobus_store::app_config::Config::load()?;
    tracing::info!("Starting GoBus API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;

    let riders = Arc::new(RiderRepository::new(db.pool.clone()));
    bootstrap::ensure_admin_rider(&riders).await;

    let tokens = Arc::new(RefreshTokenStore::new(
        &config.redis.url,
        config.auth.refresh_ttl_seconds,
    )?);

    let notifier: Arc<dyn Notifier> = if config.smtp.enabled {
        Arc::new(SmtpMailer::new(
            config.smtp.host.clone(),
            config.smtp.port,
            config.smtp.username.clone(),
            config.smtp.password.clone(),
            config.smtp.from_email.clone(),
            config.smtp.from_name.clone(),
        ))
    } else {
        Arc::new(LogMailer)
    };

    let pg_store = if config.database.transactions {
        PgReservationStore::new(db.pool.clone())
    } else {
        tracing::warn!("multi-statement transactions disabled by configuration");
        PgReservationStore::new(db.pool.clone()).with_transactions_disabled()
    };
    let store: Arc<dyn ReservationStore> = Arc::new(pg_store);

    let engine = Arc::new(ReservationEngine::new(
        store.clone(),
        Arc::new(FlatRate {
            per_seat_cents: config.pricing.flat_rate_cents,
        }),
        Arc::new(SystemReferences),
    ));
    let lifecycle = Arc::new(BookingLifecycle::new(store.clone()));

    let app_state = AppState {
        engine,
        lifecycle,
        store,
        riders,
        fleet: Arc::new(FleetRepository::new(db.pool.clone())),
        tokens,
        notifier,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            access_ttl_seconds: config.auth.access_ttl_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

use std::sync::Arc;

use gobus_booking::{BookingLifecycle, ReservationEngine};
use gobus_core::notify::Notifier;
use gobus_core::store::ReservationStore;
use gobus_store::{FleetRepository, RefreshTokenStore, RiderRepository};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub access_ttl_seconds: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub store: Arc<dyn ReservationStore>,
    pub riders: Arc<RiderRepository>,
    pub fleet: Arc<FleetRepository>,
    pub tokens: Arc<RefreshTokenStore>,
    pub notifier: Arc<dyn Notifier>,
    pub auth: AuthConfig,
}

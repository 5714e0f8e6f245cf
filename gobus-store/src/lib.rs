pub mod app_config;
pub mod database;
pub mod fleet_repo;
pub mod mailer;
pub mod memory;
pub mod pg_store;
pub mod rider_repo;
pub mod token_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use fleet_repo::FleetRepository;
pub use memory::MemoryStore;
pub use pg_store::PgReservationStore;
pub use rider_repo::RiderRepository;
pub use token_repo::RefreshTokenStore;

pub mod availability;
pub mod lifecycle;
pub mod orchestrator;

pub use lifecycle::{BookingLifecycle, CancelOutcome};
pub use orchestrator::ReservationEngine;

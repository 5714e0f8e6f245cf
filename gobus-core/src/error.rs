/// Failure taxonomy for the reservation core.
///
/// Validation, NotFound and Consistency are detected before or during the
/// check phase and are never retried. SeatConflict carries the clashing seat
/// numbers so callers can offer alternatives. TransientInfrastructure marks
/// storage-topology failures that are allowed exactly one fallback execution.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error("Seats already booked: {seats:?}")]
    SeatConflict { seats: Vec<u32> },

    #[error("Transient infrastructure failure: {0}")]
    TransientInfrastructure(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl ReservationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}

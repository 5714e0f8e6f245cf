use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::model::{Booking, BookingFilter, Bus, PaymentStatus, Rider, Route};

/// Storage-layer failure taxonomy. The orchestrator's retry decisions hang
/// off these variants, so implementations must classify faithfully:
/// `TransactionsUnsupported` is the topology signal that triggers the
/// one-shot non-transactional fallback, `Transient` is retryable within the
/// transaction budget, and the two conflict variants map to business
/// outcomes rather than infrastructure ones.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transactions unsupported in this topology: {0}")]
    TransactionsUnsupported(String),

    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("booking reference already exists")]
    DuplicateReference,

    #[error("one or more seats already claimed for this bus and date")]
    SeatTaken,

    /// A unique constraint outside the reservation core (rider email, fleet
    /// number, route name).
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// A logical storage session: either a real multi-statement transaction or
/// an autocommit pass-through. The reservation algorithm runs against this
/// capability and must not branch on which mode it got.
#[async_trait]
pub trait StoreSession: Send {
    async fn find_bus(&mut self, id: Uuid) -> Result<Option<Bus>, StoreError>;

    async fn find_route(&mut self, id: Uuid) -> Result<Option<Route>, StoreError>;

    async fn find_rider(&mut self, id: Uuid) -> Result<Option<Rider>, StoreError>;

    /// The availability snapshot: seats held by active bookings for the
    /// given bus and travel date. Recomputed fresh per session, never
    /// cached.
    async fn held_seats(
        &mut self,
        bus_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<BTreeSet<u32>, StoreError>;

    /// Whether a booking with this reference already exists. The write path
    /// checks before inserting so a collision can be resolved by
    /// regeneration without poisoning an open transaction.
    async fn reference_exists(&mut self, reference: &str) -> Result<bool, StoreError>;

    /// Persists the booking and its seat claims. Must be atomic even on the
    /// autocommit path, and must surface reference and seat uniqueness
    /// violations as their dedicated `StoreError` variants.
    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Opens a multi-statement transaction. Fails with
    /// `TransactionsUnsupported` when the deployment topology cannot
    /// provide one.
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError>;

    /// Opens an autocommit session: every operation applies immediately and
    /// `commit`/`abort` are no-ops. The degraded-mode path.
    async fn autocommit(&self) -> Result<Box<dyn StoreSession>, StoreError>;

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn find_booking_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Booking>, StoreError>;

    /// Flips the booking to cancelled and releases its seat claims in one
    /// atomic step. Returns the updated record, or `None` if no such
    /// booking exists. Safe to call on an already-cancelled booking.
    async fn cancel_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError>;

    /// Filtered, paginated admin listing. Returns the page plus the total
    /// match count.
    async fn list_bookings(
        &self,
        filter: &BookingFilter,
    ) -> Result<(Vec<Booking>, i64), StoreError>;

    /// All bookings for one rider, newest first.
    async fn bookings_for_rider(&self, rider_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    /// Availability snapshot outside any session, for read-only queries and
    /// post-failure clash attribution.
    async fn held_seats(
        &self,
        bus_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<BTreeSet<u32>, StoreError>;
}

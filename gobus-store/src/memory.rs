use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use gobus_core::model::{
    Booking, BookingFilter, BookingStatus, Bus, PaymentStatus, Rider, Route,
};
use gobus_core::store::{ReservationStore, StoreError, StoreSession};

/// In-memory reservation store implementing the same session contract as the
/// Postgres store. Used by the test suite and for running the API without a
/// database. Transactional sessions buffer their writes and re-validate the
/// seat and reference constraints at commit under the single lock, which is
/// the in-memory analogue of the partial unique index.
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    transactions_enabled: bool,
}

#[derive(Default)]
struct Inner {
    riders: HashMap<Uuid, Rider>,
    buses: HashMap<Uuid, Bus>,
    routes: HashMap<Uuid, Route>,
    bookings: HashMap<Uuid, Booking>,
    references: HashSet<String>,
}

impl Inner {
    fn held(&self, bus_id: Uuid, travel_date: NaiveDate) -> BTreeSet<u32> {
        self.bookings
            .values()
            .filter(|b| {
                b.bus_id == bus_id
                    && b.travel_date == travel_date
                    && b.status == BookingStatus::Active
            })
            .flat_map(|b| b.seat_numbers.iter().copied())
            .collect()
    }

    fn check_constraints(&self, booking: &Booking) -> Result<(), StoreError> {
        if self.references.contains(&booking.reference) {
            return Err(StoreError::DuplicateReference);
        }
        let held = self.held(booking.bus_id, booking.travel_date);
        if booking.seat_numbers.iter().any(|s| held.contains(s)) {
            return Err(StoreError::SeatTaken);
        }
        Ok(())
    }

    fn apply(&mut self, booking: Booking) {
        self.references.insert(booking.reference.clone());
        self.bookings.insert(booking.id, booking);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            transactions_enabled: true,
        }
    }

    /// Simulates the degraded topology where no multi-statement transaction
    /// can be opened, forcing callers onto the autocommit path.
    pub fn with_transactions_disabled(mut self) -> Self {
        self.transactions_enabled = false;
        self
    }

    pub async fn seed_rider(&self, rider: Rider) {
        self.inner.lock().await.riders.insert(rider.id, rider);
    }

    pub async fn seed_bus(&self, bus: Bus) {
        self.inner.lock().await.buses.insert(bus.id, bus);
    }

    pub async fn seed_route(&self, route: Route) {
        self.inner.lock().await.routes.insert(route.id, route);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    transactional: bool,
    pending: Vec<Booking>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn find_bus(&mut self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        Ok(self.inner.lock().await.buses.get(&id).cloned())
    }

    async fn find_route(&mut self, id: Uuid) -> Result<Option<Route>, StoreError> {
        Ok(self.inner.lock().await.routes.get(&id).cloned())
    }

    async fn find_rider(&mut self, id: Uuid) -> Result<Option<Rider>, StoreError> {
        Ok(self.inner.lock().await.riders.get(&id).cloned())
    }

    async fn held_seats(
        &mut self,
        bus_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<BTreeSet<u32>, StoreError> {
        Ok(self.inner.lock().await.held(bus_id, travel_date))
    }

    async fn reference_exists(&mut self, reference: &str) -> Result<bool, StoreError> {
        if self.pending.iter().any(|b| b.reference == reference) {
            return Ok(true);
        }
        Ok(self.inner.lock().await.references.contains(reference))
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_constraints(booking)?;

        // Also guard against conflicts within this session's own buffer.
        for pending in &self.pending {
            if pending.reference == booking.reference {
                return Err(StoreError::DuplicateReference);
            }
            if pending.bus_id == booking.bus_id
                && pending.travel_date == booking.travel_date
                && pending
                    .seat_numbers
                    .iter()
                    .any(|s| booking.seat_numbers.contains(s))
            {
                return Err(StoreError::SeatTaken);
            }
        }

        if self.transactional {
            self.pending.push(booking.clone());
        } else {
            inner.apply(booking.clone());
        }
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if !self.transactional {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        // Re-validate under the lock: a concurrent session may have
        // committed between our availability check and now.
        for booking in &self.pending {
            inner.check_constraints(booking)?;
        }
        for booking in self.pending.drain(..) {
            inner.apply(booking);
        }
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        self.pending.clear();
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        if !self.transactions_enabled {
            return Err(StoreError::TransactionsUnsupported(
                "transactions disabled for this deployment".into(),
            ));
        }
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            transactional: true,
            pending: Vec::new(),
        }))
    }

    async fn autocommit(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(MemorySession {
            inner: self.inner.clone(),
            transactional: false,
            pending: Vec::new(),
        }))
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.reference == reference)
            .cloned())
    }

    async fn cancel_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.bookings.get_mut(&id) {
            Some(booking) => {
                if booking.status != BookingStatus::Cancelled {
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = Utc::now();
                }
                Ok(Some(booking.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.bookings.get_mut(&id) {
            Some(booking) => {
                booking.payment_status = status;
                booking.updated_at = Utc::now();
                Ok(Some(booking.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
    ) -> Result<(Vec<Booking>, i64), StoreError> {
        let inner = self.inner.lock().await;
        let mut matches: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| {
                filter.rider_id.map_or(true, |id| b.rider_id == id)
                    && filter.bus_id.map_or(true, |id| b.bus_id == id)
                    && filter.route_id.map_or(true, |id| b.route_id == id)
                    && filter.status.map_or(true, |s| b.status == s)
                    && filter.payment_status.map_or(true, |s| b.payment_status == s)
                    && filter.travel_date.map_or(true, |d| b.travel_date == d)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len() as i64;
        let limit = filter.limit.max(1) as usize;
        let offset = (filter.page.max(1) as usize - 1) * limit;
        let page: Vec<Booking> = matches.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn bookings_for_rider(&self, rider_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.rider_id == rider_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn held_seats(
        &self,
        bus_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<BTreeSet<u32>, StoreError> {
        Ok(self.inner.lock().await.held(bus_id, travel_date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn booking(bus_id: Uuid, seats: &[u32], reference: &str) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            rider_id: Uuid::new_v4(),
            bus_id,
            route_id: Uuid::new_v4(),
            travel_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            seat_numbers: seats.to_vec(),
            total_price_cents: 1000 * seats.len() as i64,
            status: BookingStatus::Active,
            payment_status: PaymentStatus::Pending,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn commit_rechecks_seat_constraint() {
        let store = MemoryStore::new();
        let bus_id = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        first.insert_booking(&booking(bus_id, &[7], "BK-AAAA00001")).await.unwrap();

        // A second session claims the seat and commits while the first is
        // still open.
        let mut second = store.begin().await.unwrap();
        second.insert_booking(&booking(bus_id, &[7], "BK-BBBB00001")).await.unwrap();
        second.commit().await.unwrap();

        let err = first.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::SeatTaken));
    }

    #[tokio::test]
    async fn disabled_transactions_refuse_begin() {
        let store = MemoryStore::new().with_transactions_disabled();
        let err = store.begin().await.err().unwrap();
        assert!(matches!(err, StoreError::TransactionsUnsupported(_)));
        assert!(store.autocommit().await.is_ok());
    }

    #[tokio::test]
    async fn autocommit_insert_enforces_constraints_immediately() {
        let store = MemoryStore::new().with_transactions_disabled();
        let bus_id = Uuid::new_v4();

        let mut session = store.autocommit().await.unwrap();
        session.insert_booking(&booking(bus_id, &[3, 4], "BK-CCCC00001")).await.unwrap();
        session.commit().await.unwrap();

        let mut session = store.autocommit().await.unwrap();
        let err = session
            .insert_booking(&booking(bus_id, &[4, 5], "BK-DDDD00001"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SeatTaken));

        let held = store
            .held_seats(bus_id, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(held.into_iter().collect::<Vec<_>>(), vec![3, 4]);
    }
}

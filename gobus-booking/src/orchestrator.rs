use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use gobus_core::error::ReservationError;
use gobus_core::model::{
    Booking, BookingStatus, PaymentStatus, ReservationRequest,
};
use gobus_core::rate::RatePolicy;
use gobus_core::reference::ReferenceGenerator;
use gobus_core::seats;
use gobus_core::store::{ReservationStore, StoreError, StoreSession};

use crate::availability::clashes;

/// Attempts per request for the transactional path when the storage layer
/// reports retryable contention.
const TXN_RETRY_BUDGET: u32 = 3;

/// Regenerations per request when a freshly generated reference turns out to
/// already exist.
const REFERENCE_RETRY_BUDGET: u32 = 3;

const RETRY_BACKOFF_MS: u64 = 50;

/// Outcome channel for one transactional attempt, separating the outermost
/// retry decisions from the reservation algorithm itself.
enum TxnFailure {
    /// Transactions unsupported in this topology: run the same algorithm
    /// once on an autocommit session.
    Fallback(String),
    /// Retryable contention: re-run the transactional attempt within budget.
    Retry(String),
    /// Final business or server failure.
    Fail(ReservationError),
}

/// Failure of one pass of the check-then-reserve algorithm. Business
/// failures are final regardless of session mode; store failures are
/// classified by the caller that owns the retry policy.
enum StepError {
    Business(ReservationError),
    Store(StoreError),
}

/// The reservation transaction orchestrator.
///
/// One algorithm, two execution modes: the check-then-reserve sequence runs
/// against a [`StoreSession`] that is either a real transaction or an
/// autocommit pass-through, and nothing inside the sequence branches on
/// which one it got. Only the outermost layer decides to retry, fall back,
/// or fail.
pub struct ReservationEngine {
    store: Arc<dyn ReservationStore>,
    rate: Arc<dyn RatePolicy>,
    references: Arc<dyn ReferenceGenerator>,
}

impl ReservationEngine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        rate: Arc<dyn RatePolicy>,
        references: Arc<dyn ReferenceGenerator>,
    ) -> Self {
        Self {
            store,
            rate,
            references,
        }
    }

    /// Produces a persisted active booking or a well-typed failure, while
    /// preventing two concurrent requests from reserving the same seat.
    pub async fn reserve(&self, req: &ReservationRequest) -> Result<Booking, ReservationError> {
        // Shape validation fails fast, before any transaction opens.
        let requested = seats::normalize_seats(&req.seats)?;
        let travel_date = seats::normalize_travel_date(&req.travel_date)?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.reserve_transactional(req, &requested, travel_date).await {
                Ok(booking) => return Ok(booking),
                Err(TxnFailure::Fallback(reason)) => {
                    warn!(
                        bus_id = %req.bus_id,
                        "transactions unavailable ({}), retrying without transaction wrapper",
                        reason
                    );
                    return self.reserve_fallback(req, &requested, travel_date).await;
                }
                Err(TxnFailure::Retry(reason)) => {
                    if attempt >= TXN_RETRY_BUDGET {
                        error!("reservation retry budget exhausted: {}", reason);
                        return Err(ReservationError::server(format!(
                            "storage contention, retry budget exhausted: {reason}"
                        )));
                    }
                    debug!("transient storage failure ({}), attempt {}", reason, attempt);
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                        .await;
                }
                Err(TxnFailure::Fail(err)) => return Err(err),
            }
        }
    }

    async fn reserve_transactional(
        &self,
        req: &ReservationRequest,
        requested: &BTreeSet<u32>,
        travel_date: NaiveDate,
    ) -> Result<Booking, TxnFailure> {
        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(StoreError::TransactionsUnsupported(reason)) => {
                return Err(TxnFailure::Fallback(reason))
            }
            Err(StoreError::Transient(reason)) => return Err(TxnFailure::Retry(reason)),
            Err(err) => return Err(TxnFailure::Fail(ReservationError::server(err.to_string()))),
        };

        match self
            .check_and_reserve(session.as_mut(), req, requested, travel_date)
            .await
        {
            Ok(booking) => match session.commit().await {
                Ok(()) => Ok(booking),
                Err(StoreError::TransactionsUnsupported(reason)) => {
                    Err(TxnFailure::Fallback(reason))
                }
                Err(StoreError::Transient(reason)) => Err(TxnFailure::Retry(reason)),
                // A concurrent transaction claimed the seat (or the
                // reference) between our check and the commit; the
                // constraint backstop caught it.
                Err(StoreError::SeatTaken) => Err(TxnFailure::Fail(
                    self.attribute_conflict(req.bus_id, travel_date, requested).await,
                )),
                Err(StoreError::DuplicateReference) => {
                    Err(TxnFailure::Retry("booking reference collided at commit".into()))
                }
                Err(err) => {
                    error!("booking commit failed: {}", err);
                    Err(TxnFailure::Fail(ReservationError::server(err.to_string())))
                }
            },
            Err(step) => {
                if let Err(abort_err) = session.abort().await {
                    warn!("transaction abort failed: {}", abort_err);
                }
                match step {
                    StepError::Business(err) => Err(TxnFailure::Fail(err)),
                    StepError::Store(StoreError::TransactionsUnsupported(reason)) => {
                        Err(TxnFailure::Fallback(reason))
                    }
                    StepError::Store(StoreError::Transient(reason)) => {
                        Err(TxnFailure::Retry(reason))
                    }
                    StepError::Store(err) => {
                        error!("reservation failed inside transaction: {}", err);
                        Err(TxnFailure::Fail(ReservationError::server(err.to_string())))
                    }
                }
            }
        }
    }

    /// Degraded mode: the same algorithm on an autocommit session. Racier by
    /// nature; the storage layer's uniqueness constraint on
    /// (bus, date, seat, active) is the remaining backstop, and there is no
    /// second fallback.
    async fn reserve_fallback(
        &self,
        req: &ReservationRequest,
        requested: &BTreeSet<u32>,
        travel_date: NaiveDate,
    ) -> Result<Booking, ReservationError> {
        let mut session = self
            .store
            .autocommit()
            .await
            .map_err(|err| ReservationError::server(err.to_string()))?;

        match self
            .check_and_reserve(session.as_mut(), req, requested, travel_date)
            .await
        {
            Ok(booking) => {
                session
                    .commit()
                    .await
                    .map_err(|err| ReservationError::server(err.to_string()))?;
                Ok(booking)
            }
            Err(step) => {
                if let Err(abort_err) = session.abort().await {
                    warn!("fallback session abort failed: {}", abort_err);
                }
                match step {
                    StepError::Business(err) => Err(err),
                    // No second fallback and no retry loop here; transient
                    // failures surface as retryable so the caller decides
                    // whether to resubmit.
                    StepError::Store(StoreError::Transient(reason))
                    | StepError::Store(StoreError::TransactionsUnsupported(reason)) => {
                        Err(ReservationError::TransientInfrastructure(reason))
                    }
                    StepError::Store(err) => {
                        error!("fallback reservation failed: {}", err);
                        Err(ReservationError::server(err.to_string()))
                    }
                }
            }
        }
    }

    /// The single check-then-reserve pass. Runs identically under a real
    /// transaction and under autocommit; it never inspects which mode the
    /// session is in.
    async fn check_and_reserve(
        &self,
        session: &mut dyn StoreSession,
        req: &ReservationRequest,
        requested: &BTreeSet<u32>,
        travel_date: NaiveDate,
    ) -> Result<Booking, StepError> {
        let bus = session
            .find_bus(req.bus_id)
            .await
            .map_err(StepError::Store)?
            .ok_or_else(|| StepError::Business(ReservationError::not_found("bus")))?;
        let route = session
            .find_route(req.route_id)
            .await
            .map_err(StepError::Store)?
            .ok_or_else(|| StepError::Business(ReservationError::not_found("route")))?;
        let rider = session
            .find_rider(req.rider_id)
            .await
            .map_err(StepError::Store)?
            .ok_or_else(|| StepError::Business(ReservationError::not_found("rider")))?;

        if route.bus_id != bus.id {
            return Err(StepError::Business(ReservationError::Consistency(
                "route does not belong to bus".into(),
            )));
        }

        let over_capacity: Vec<u32> = requested
            .iter()
            .copied()
            .filter(|seat| *seat > bus.capacity)
            .collect();
        if !over_capacity.is_empty() {
            return Err(StepError::Business(ReservationError::Validation(format!(
                "invalid seat numbers: {}",
                join_seats(&over_capacity)
            ))));
        }

        // Availability snapshot, recomputed fresh inside this session.
        let held = session
            .held_seats(bus.id, travel_date)
            .await
            .map_err(StepError::Store)?;
        let clashing = clashes(requested, &held);
        if !clashing.is_empty() {
            return Err(StepError::Business(ReservationError::SeatConflict {
                seats: clashing,
            }));
        }

        let total_price_cents = self.rate.price_cents(&bus, &route, requested.len() as u32);

        let mut regenerations = 0u32;
        let mut reference = self.references.generate();
        loop {
            let exists = session
                .reference_exists(&reference)
                .await
                .map_err(StepError::Store)?;
            if !exists {
                break;
            }
            regenerations += 1;
            if regenerations >= REFERENCE_RETRY_BUDGET {
                return Err(StepError::Store(StoreError::Backend(
                    "could not generate a unique booking reference".into(),
                )));
            }
            debug!("booking reference collided, regenerating");
            reference = self.references.generate();
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            reference,
            rider_id: rider.id,
            bus_id: bus.id,
            route_id: route.id,
            travel_date,
            seat_numbers: requested.iter().copied().collect(),
            total_price_cents,
            status: BookingStatus::Active,
            payment_status: PaymentStatus::Pending,
            note: req
                .note
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
            created_at: now,
            updated_at: now,
        };

        match session.insert_booking(&booking).await {
            Ok(()) => Ok(booking),
            // The constraint backstop fired: another request won the seats
            // between our snapshot and the write.
            Err(StoreError::SeatTaken) => Err(StepError::Business(
                self.attribute_conflict(bus.id, travel_date, requested).await,
            )),
            Err(err) => Err(StepError::Store(err)),
        }
    }

    /// A write-time unique violation does not say which seats clashed, so
    /// re-read availability and intersect. Falls back to the full requested
    /// set if the conflicting booking vanished in the meantime.
    async fn attribute_conflict(
        &self,
        bus_id: Uuid,
        travel_date: NaiveDate,
        requested: &BTreeSet<u32>,
    ) -> ReservationError {
        let seats = match self.store.held_seats(bus_id, travel_date).await {
            Ok(held) => {
                let clashing = clashes(requested, &held);
                if clashing.is_empty() {
                    requested.iter().copied().collect()
                } else {
                    clashing
                }
            }
            Err(err) => {
                warn!("could not attribute seat conflict: {}", err);
                requested.iter().copied().collect()
            }
        };
        ReservationError::SeatConflict { seats }
    }
}

fn join_seats(seats: &[u32]) -> String {
    seats
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use gobus_booking::availability;
use gobus_booking::{BookingLifecycle, ReservationEngine};
use gobus_core::error::ReservationError;
use gobus_core::model::{
    BookingStatus, Bus, PaymentStatus, ReservationRequest, Rider, RiderRole, Route,
};
use gobus_core::rate::FlatRate;
use gobus_core::reference::{ReferenceGenerator, SystemReferences};
use gobus_core::store::ReservationStore;
use gobus_store::MemoryStore;

struct Fixture {
    store: Arc<MemoryStore>,
    engine: Arc<ReservationEngine>,
    rider: Rider,
    bus: Bus,
    route: Route,
}

fn rider() -> Rider {
    let now = Utc::now();
    Rider {
        id: Uuid::new_v4(),
        username: "asha".to_string(),
        email: "asha@example.com".to_string(),
        phone_number: "+15550100".to_string(),
        password_hash: "argon2-hash".to_string(),
        role: RiderRole::Rider,
        is_verified: true,
        created_at: now,
        updated_at: now,
    }
}

fn bus(capacity: u32) -> Bus {
    let now = Utc::now();
    Bus {
        id: Uuid::new_v4(),
        name: "Coastal Express".to_string(),
        fleet_number: "CE-01".to_string(),
        capacity,
        image_url: None,
        description: String::new(),
        created_at: now,
        updated_at: now,
    }
}

fn route_for(bus: &Bus) -> Route {
    let now = Utc::now();
    Route {
        id: Uuid::new_v4(),
        name: format!("Harbor to Summit ({})", bus.fleet_number),
        start_location: "Harbor".to_string(),
        end_location: "Summit".to_string(),
        distance_km: 120.0,
        bus_id: bus.id,
        map_url: None,
        created_at: now,
        updated_at: now,
    }
}

async fn fixture_with(store: MemoryStore, capacity: u32) -> Fixture {
    let store = Arc::new(store);
    let rider = rider();
    let bus = bus(capacity);
    let route = route_for(&bus);
    store.seed_rider(rider.clone()).await;
    store.seed_bus(bus.clone()).await;
    store.seed_route(route.clone()).await;

    let engine = Arc::new(ReservationEngine::new(
        store.clone() as Arc<dyn ReservationStore>,
        Arc::new(FlatRate::default()),
        Arc::new(SystemReferences),
    ));

    Fixture {
        store,
        engine,
        rider,
        bus,
        route,
    }
}

async fn fixture(capacity: u32) -> Fixture {
    fixture_with(MemoryStore::new(), capacity).await
}

async fn fallback_fixture(capacity: u32) -> Fixture {
    fixture_with(MemoryStore::new().with_transactions_disabled(), capacity).await
}

fn request(fixture: &Fixture, date: &str, seats: serde_json::Value) -> ReservationRequest {
    ReservationRequest {
        rider_id: fixture.rider.id,
        bus_id: fixture.bus.id,
        route_id: fixture.route.id,
        travel_date: date.to_string(),
        seats,
        note: None,
    }
}

fn march_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

#[tokio::test]
async fn end_to_end_conflict_and_success() {
    let f = fixture(40).await;

    let first = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([5, 6])))
        .await
        .unwrap();
    assert!(first.reference.starts_with("BK-"));
    assert_eq!(first.seat_numbers, vec![5, 6]);
    assert_eq!(first.total_price_cents, 2000);
    assert_eq!(first.status, BookingStatus::Active);
    assert_eq!(first.payment_status, PaymentStatus::Pending);

    // Overlapping request loses, reporting exactly the clashing seat.
    let err = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([6, 7])))
        .await
        .unwrap_err();
    match err {
        ReservationError::SeatConflict { seats } => assert_eq!(seats, vec![6]),
        other => panic!("expected seat conflict, got {other:?}"),
    }

    // Disjoint request succeeds.
    f.engine
        .reserve(&request(&f, "2025-03-01", json!([7, 8])))
        .await
        .unwrap();

    let held = availability::snapshot(f.store.as_ref(), f.bus.id, march_first())
        .await
        .unwrap();
    assert_eq!(held.into_iter().collect::<Vec<_>>(), vec![5, 6, 7, 8]);
}

#[tokio::test]
async fn same_seats_different_date_do_not_clash() {
    let f = fixture(40).await;

    f.engine
        .reserve(&request(&f, "2025-03-01", json!([5, 6])))
        .await
        .unwrap();
    f.engine
        .reserve(&request(&f, "2025-03-02", json!([5, 6])))
        .await
        .unwrap();
}

#[tokio::test]
async fn capacity_bound_names_offending_seats() {
    let f = fixture(40).await;

    let err = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([10, 50])))
        .await
        .unwrap_err();
    match err {
        ReservationError::Validation(msg) => {
            assert!(msg.contains("50"), "message should name seat 50: {msg}");
            assert!(!msg.contains("10"), "seat 10 is valid: {msg}");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn seat_normalization_applies_before_reserving() {
    let f = fixture(40).await;

    let booking = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([3, 3, 1, -2, "x", 2])))
        .await
        .unwrap();
    assert_eq!(booking.seat_numbers, vec![1, 2, 3]);
    assert_eq!(booking.total_price_cents, 3000);

    let err = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!(["x", -4])))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Validation(_)));
}

#[tokio::test]
async fn route_must_belong_to_bus() {
    let f = fixture(40).await;

    let other_bus = bus(30);
    let other_route = route_for(&other_bus);
    f.store.seed_bus(other_bus).await;
    f.store.seed_route(other_route.clone()).await;

    let mut req = request(&f, "2025-03-01", json!([1]));
    req.route_id = other_route.id;
    let err = f.engine.reserve(&req).await.unwrap_err();
    assert!(matches!(err, ReservationError::Consistency(_)));
}

#[tokio::test]
async fn unknown_entities_fail_not_found() {
    let f = fixture(40).await;

    let mut req = request(&f, "2025-03-01", json!([1]));
    req.bus_id = Uuid::new_v4();
    assert!(matches!(
        f.engine.reserve(&req).await.unwrap_err(),
        ReservationError::NotFound(_)
    ));

    let mut req = request(&f, "2025-03-01", json!([1]));
    req.rider_id = Uuid::new_v4();
    assert!(matches!(
        f.engine.reserve(&req).await.unwrap_err(),
        ReservationError::NotFound(_)
    ));
}

#[tokio::test]
async fn fallback_path_produces_identical_booking_shape() {
    let f = fallback_fixture(40).await;

    let booking = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([7, 8])))
        .await
        .unwrap();
    assert!(booking.reference.starts_with("BK-"));
    assert_eq!(booking.seat_numbers, vec![7, 8]);
    assert_eq!(booking.total_price_cents, 2000);
    assert_eq!(booking.status, BookingStatus::Active);
    assert_eq!(booking.payment_status, PaymentStatus::Pending);

    // The booking is durably visible through the store.
    let stored = f.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.reference, booking.reference);

    let held = availability::snapshot(f.store.as_ref(), f.bus.id, march_first())
        .await
        .unwrap();
    assert_eq!(held.into_iter().collect::<Vec<_>>(), vec![7, 8]);
}

#[tokio::test]
async fn fallback_still_rejects_conflicts() {
    let f = fallback_fixture(40).await;

    f.engine
        .reserve(&request(&f, "2025-03-01", json!([5, 6])))
        .await
        .unwrap();
    let err = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([6, 7])))
        .await
        .unwrap_err();
    match err {
        ReservationError::SeatConflict { seats } => assert_eq!(seats, vec![6]),
        other => panic!("expected seat conflict, got {other:?}"),
    }
}

async fn run_concurrent_contention(f: &Fixture) {
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = f.engine.clone();
        let req = request(f, "2025-03-01", json!([7]));
        handles.push(tokio::spawn(async move { engine.reserve(&req).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(booking) => {
                successes += 1;
                assert_eq!(booking.seat_numbers, vec![7]);
            }
            Err(ReservationError::SeatConflict { seats }) => assert_eq!(seats, vec![7]),
            Err(other) => panic!("expected seat conflict, got {other:?}"),
        }
    }
    assert_eq!(successes, 1, "exactly one concurrent request may win");

    let held = availability::snapshot(f.store.as_ref(), f.bus.id, march_first())
        .await
        .unwrap();
    assert_eq!(held.into_iter().collect::<Vec<_>>(), vec![7]);
}

#[tokio::test]
async fn no_double_booking_under_concurrency() {
    let f = fixture(40).await;
    run_concurrent_contention(&f).await;
}

#[tokio::test]
async fn no_double_booking_in_fallback_mode() {
    let f = fallback_fixture(40).await;
    run_concurrent_contention(&f).await;
}

#[tokio::test]
async fn cancellation_is_idempotent_and_frees_seats() {
    let f = fixture(40).await;
    let lifecycle = BookingLifecycle::new(f.store.clone() as Arc<dyn ReservationStore>);

    let booking = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([5])))
        .await
        .unwrap();

    let first = lifecycle.cancel(booking.id).await.unwrap();
    assert!(!first.already_cancelled);
    assert_eq!(first.booking.status, BookingStatus::Cancelled);

    // Second cancel is a no-op success, not an error.
    let second = lifecycle.cancel(booking.id).await.unwrap();
    assert!(second.already_cancelled);
    assert_eq!(second.booking.status, BookingStatus::Cancelled);

    // No separate seat-release step: the active-status filter alone frees
    // the seat for the next reservation.
    let held = availability::snapshot(f.store.as_ref(), f.bus.id, march_first())
        .await
        .unwrap();
    assert!(held.is_empty());

    f.engine
        .reserve(&request(&f, "2025-03-01", json!([5])))
        .await
        .unwrap();
}

#[tokio::test]
async fn mark_paid_is_orthogonal_to_cancellation() {
    let f = fixture(40).await;
    let lifecycle = BookingLifecycle::new(f.store.clone() as Arc<dyn ReservationStore>);

    let booking = f
        .engine
        .reserve(&request(&f, "2025-03-01", json!([9])))
        .await
        .unwrap();

    let paid = lifecycle.mark_paid(booking.id).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.status, BookingStatus::Active);

    // Paying a cancelled booking stays representable; policy is the
    // caller's concern.
    lifecycle.cancel(booking.id).await.unwrap();
    let paid_again = lifecycle.mark_paid(booking.id).await.unwrap();
    assert_eq!(paid_again.payment_status, PaymentStatus::Paid);
    assert_eq!(paid_again.status, BookingStatus::Cancelled);
}

/// Hands out a scripted prefix of references, then defers to the system
/// generator; counts every call.
struct ScriptedReferences {
    script: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedReferences {
    fn new(script: Vec<&str>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(String::from).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ReferenceGenerator for ScriptedReferences {
    fn generate(&self) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SystemReferences.generate())
    }
}

#[tokio::test]
async fn forced_reference_collision_regenerates_exactly_once() {
    let f = fixture(40).await;

    // Occupy a known reference.
    let seeded = Arc::new(ScriptedReferences::new(vec!["BK-COLLIDE01234"]));
    let engine = ReservationEngine::new(
        f.store.clone() as Arc<dyn ReservationStore>,
        Arc::new(FlatRate::default()),
        seeded,
    );
    engine
        .reserve(&request(&f, "2025-03-01", json!([1])))
        .await
        .unwrap();

    // A generator that first collides, then produces a fresh reference.
    let colliding = Arc::new(ScriptedReferences::new(vec![
        "BK-COLLIDE01234",
        "BK-FRESH0056789",
    ]));
    let engine = ReservationEngine::new(
        f.store.clone() as Arc<dyn ReservationStore>,
        Arc::new(FlatRate::default()),
        colliding.clone(),
    );

    let booking = engine
        .reserve(&request(&f, "2025-03-01", json!([2])))
        .await
        .unwrap();
    assert_eq!(booking.reference, "BK-FRESH0056789");
    assert_eq!(
        colliding.calls.load(Ordering::SeqCst),
        2,
        "one collision must trigger exactly one regeneration"
    );
}

#[tokio::test]
async fn note_is_trimmed_and_empty_notes_dropped() {
    let f = fixture(40).await;

    let mut req = request(&f, "2025-03-01", json!([4]));
    req.note = Some("  window seat please  ".to_string());
    let booking = f.engine.reserve(&req).await.unwrap();
    assert_eq!(booking.note.as_deref(), Some("window seat please"));

    let mut req = request(&f, "2025-03-01", json!([5]));
    req.note = Some("   ".to_string());
    let booking = f.engine.reserve(&req).await.unwrap();
    assert_eq!(booking.note, None);
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use gobus_booking::availability;
use gobus_core::model::{
    Booking, BookingFilter, BookingStatus, PaymentStatus, ReservationRequest,
};
use gobus_core::seats;
use gobus_store::mailer::{self, BookingEmail, EmailContent};

use crate::error::ApiError;
use crate::middleware::auth::{is_admin, Claims};
use crate::state::AppState;

const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 20;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    bus_id: Uuid,
    route_id: Uuid,
    travel_date: String,
    /// Scalar or array; mixed types tolerated and normalized.
    seat_numbers: serde_json::Value,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    date: String,
}

#[derive(Debug, Deserialize)]
struct ListBookingsQuery {
    page: Option<u32>,
    limit: Option<u32>,
    rider_id: Option<Uuid>,
    bus_id: Option<Uuid>,
    route_id: Option<Uuid>,
    status: Option<String>,
    payment_status: Option<String>,
    date: Option<String>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/v1/buses/{id}/availability", get(bus_availability))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/mine", get(my_bookings))
        .route("/v1/bookings/reference/{reference}", get(get_booking_by_reference))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings", get(list_bookings))
        .route("/v1/admin/bookings/{id}/paid", post(mark_booking_paid))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let rider_id = rider_id_from(&claims)?;

    let booking = state
        .engine
        .reserve(&ReservationRequest {
            rider_id,
            bus_id: req.bus_id,
            route_id: req.route_id,
            travel_date: req.travel_date,
            seats: req.seat_numbers,
            note: req.notes,
        })
        .await?;

    info!(reference = %booking.reference, rider = %rider_id, "booking created");

    // Fire-and-forget confirmation, strictly after the committed write.
    spawn_booking_email(
        &state,
        booking.clone(),
        claims.email.clone(),
        mailer::booking_confirmation,
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Booking created", "booking": booking })),
    ))
}

/// GET /v1/buses/{id}/availability?date=YYYY-MM-DD
async fn bus_availability(
    State(state): State<AppState>,
    Path(bus_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let travel_date = seats::normalize_travel_date(&query.date)?;

    state
        .fleet
        .get_bus(bus_id)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("bus not found".into()))?;

    let held = availability::snapshot(state.store.as_ref(), bus_id, travel_date).await?;

    Ok(Json(json!({
        "bus_id": bus_id,
        "travel_date": travel_date,
        "held_seats": held.into_iter().collect::<Vec<u32>>(),
    })))
}

/// GET /v1/bookings/mine
async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rider_id = rider_id_from(&claims)?;
    let bookings = state.store.bookings_for_rider(rider_id).await?;

    Ok(Json(json!({ "count": bookings.len(), "bookings": bookings })))
}

/// GET /v1/bookings/{id} (owner or admin)
async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let booking = state.lifecycle.find(id).await?;
    authorize_owner_or_admin(&claims, &booking)?;

    Ok(Json(json!({ "booking": booking })))
}

/// GET /v1/bookings/reference/{reference} (owner or admin)
///
/// The reference is the booking's shareable identity; support flows look
/// bookings up by it rather than by internal id.
async fn get_booking_by_reference(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(reference): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let booking = state
        .store
        .find_booking_by_reference(&reference)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("booking not found".into()))?;
    authorize_owner_or_admin(&claims, &booking)?;

    Ok(Json(json!({ "booking": booking })))
}

/// POST /v1/bookings/{id}/cancel (owner or admin)
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let booking = state.lifecycle.find(id).await?;
    authorize_owner_or_admin(&claims, &booking)?;

    let outcome = state.lifecycle.cancel(id).await?;
    if outcome.already_cancelled {
        return Ok(Json(json!({
            "message": "Already cancelled",
            "booking": outcome.booking,
        })));
    }

    spawn_booking_email(
        &state,
        outcome.booking.clone(),
        claims.email.clone(),
        mailer::booking_cancellation,
    );

    Ok(Json(json!({
        "message": "Booking cancelled",
        "booking": outcome.booking,
    })))
}

/// GET /v1/admin/bookings with filtering and pagination
async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let status = query
        .status
        .as_deref()
        .map(|s| {
            BookingStatus::parse(s)
                .ok_or_else(|| ApiError::ValidationError(format!("invalid status: {s}")))
        })
        .transpose()?;
    let payment_status = query
        .payment_status
        .as_deref()
        .map(|s| {
            PaymentStatus::parse(s)
                .ok_or_else(|| ApiError::ValidationError(format!("invalid payment_status: {s}")))
        })
        .transpose()?;
    let travel_date = query
        .date
        .as_deref()
        .map(seats::normalize_travel_date)
        .transpose()?;

    let filter = BookingFilter {
        rider_id: query.rider_id,
        bus_id: query.bus_id,
        route_id: query.route_id,
        status,
        payment_status,
        travel_date,
        page,
        limit,
    };

    let (bookings, total) = state.store.list_bookings(&filter).await?;
    let total_pages = (total + i64::from(limit) - 1) / i64::from(limit);

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "total_pages": total_pages,
        "count": bookings.len(),
        "bookings": bookings,
    })))
}

/// POST /v1/admin/bookings/{id}/paid
async fn mark_booking_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let booking = state.lifecycle.mark_paid(id).await?;

    Ok(Json(json!({ "message": "Payment updated", "booking": booking })))
}

// ============================================================================
// Helpers
// ============================================================================

fn rider_id_from(claims: &Claims) -> Result<Uuid, ApiError> {
    Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::AuthenticationError("invalid token subject".into()))
}

fn authorize_owner_or_admin(claims: &Claims, booking: &Booking) -> Result<(), ApiError> {
    let rider_id = rider_id_from(claims)?;
    if booking.rider_id != rider_id && !is_admin(claims) {
        return Err(ApiError::AuthorizationError("Forbidden".into()));
    }
    Ok(())
}

/// Detached notification dispatch. Lookups and delivery run off the request
/// path; failures are logged and never reach the caller.
fn spawn_booking_email(
    state: &AppState,
    booking: Booking,
    to: String,
    template: fn(&BookingEmail) -> EmailContent,
) {
    let state = state.clone();
    tokio::spawn(async move {
        let bus_label = match state.fleet.get_bus(booking.bus_id).await {
            Ok(Some(bus)) => bus.name,
            _ => booking.bus_id.to_string(),
        };
        let route_label = match state.fleet.get_route(booking.route_id).await {
            Ok(Some(route)) => route.name,
            _ => booking.route_id.to_string(),
        };
        let rider_name = match state.riders.find_by_id(booking.rider_id).await {
            Ok(Some(rider)) => rider.username,
            _ => "traveler".to_string(),
        };

        let content = template(&BookingEmail {
            rider_name,
            reference: booking.reference.clone(),
            bus_label,
            route_label,
            travel_date: booking.travel_date,
            seat_numbers: booking.seat_numbers.clone(),
            total_price_cents: booking.total_price_cents,
        });

        if let Err(err) = state
            .notifier
            .send(&to, &content.subject, &content.html, &content.text)
            .await
        {
            warn!(reference = %booking.reference, "booking email failed: {}", err);
        }
    });
}

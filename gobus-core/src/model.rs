use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: RiderRole,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiderRole {
    Rider,
    Admin,
}

impl RiderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderRole::Rider => "rider",
            RiderRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rider" => Some(RiderRole::Rider),
            "admin" => Some(RiderRole::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: Uuid,
    pub name: String,
    /// Fleet registration number, unique across the fleet.
    pub fleet_number: String,
    pub capacity: u32,
    pub image_url: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub start_location: String,
    pub end_location: String,
    pub distance_km: f64,
    /// The bus operating this route. Bookings must reference a route that
    /// belongs to the booked bus.
    pub bus_id: Uuid,
    pub map_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The reservation record. Created in one atomic step; only ever mutated to
/// flip `status` to cancelled or `payment_status` to paid. Never deleted by
/// the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    /// Human-shareable reference, unique across all bookings ever created.
    pub reference: String,
    pub rider_id: Uuid,
    pub bus_id: Uuid,
    pub route_id: Uuid,
    /// Calendar-day granularity; time-of-day is discarded at the boundary.
    pub travel_date: NaiveDate,
    /// Ascending, deduplicated, non-empty, each within bus capacity.
    pub seat_numbers: Vec<u32>,
    pub total_price_cents: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BookingStatus::Active),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Inbound reservation request as it arrives from the HTTP layer: dates and
/// seats still raw, rider id already authenticated upstream.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub rider_id: Uuid,
    pub bus_id: Uuid,
    pub route_id: Uuid,
    pub travel_date: String,
    pub seats: serde_json::Value,
    pub note: Option<String>,
}

/// Admin listing filter. Page/limit are expected pre-clamped by the caller.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub rider_id: Option<Uuid>,
    pub bus_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub travel_date: Option<NaiveDate>,
    pub page: u32,
    pub limit: u32,
}

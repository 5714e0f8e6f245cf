use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use gobus_core::model::{
    Booking, BookingFilter, BookingStatus, Bus, PaymentStatus, Rider, RiderRole, Route,
};
use gobus_core::store::{ReservationStore, StoreError, StoreSession};

/// Postgres-backed reservation store.
///
/// The partial unique index `uq_booking_seats_active` on
/// (bus_id, travel_date, seat_number) WHERE active is the storage-level
/// backstop against double-booking; the unique index on
/// `bookings.reference` backs reference regeneration.
pub struct PgReservationStore {
    pool: PgPool,
    transactions_enabled: bool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transactions_enabled: true,
        }
    }

    /// For topologies (statement-mode poolers, read replicas promoted in a
    /// pinch) that reject multi-statement transactions outright.
    pub fn with_transactions_disabled(mut self) -> Self {
        self.transactions_enabled = false;
        self
    }
}

/// Maps driver errors into the store taxonomy. SQLSTATE classes:
/// 0A000/25001/25006/55000 signal that a transaction cannot be provided in
/// this topology; 40001/40P01 are retryable contention; 23505 is resolved
/// into the specific business conflict by constraint name.
pub(crate) fn map_sqlx_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            match code.as_str() {
                "0A000" | "25001" | "25006" | "55000" => {
                    StoreError::TransactionsUnsupported(db.message().to_string())
                }
                "40001" | "40P01" => StoreError::Transient(db.message().to_string()),
                "23505" => match db.constraint() {
                    Some("uq_bookings_reference") => StoreError::DuplicateReference,
                    Some("uq_booking_seats_active") => StoreError::SeatTaken,
                    _ => StoreError::Conflict(db.message().to_string()),
                },
                _ => StoreError::Backend(db.message().to_string()),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Transient(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
pub(crate) struct BusRow {
    id: Uuid,
    name: String,
    fleet_number: String,
    capacity: i32,
    image_url: Option<String>,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RouteRow {
    id: Uuid,
    name: String,
    start_location: String,
    end_location: String,
    distance_km: f64,
    bus_id: Uuid,
    map_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct RiderRow {
    id: Uuid,
    username: String,
    email: String,
    phone_number: String,
    password_hash: String,
    role: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    rider_id: Uuid,
    bus_id: Uuid,
    route_id: Uuid,
    travel_date: NaiveDate,
    seat_numbers: Vec<i32>,
    total_price_cents: i64,
    status: String,
    payment_status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub(crate) const BUS_COLUMNS: &str =
    "id, name, fleet_number, capacity, image_url, description, created_at, updated_at";

pub(crate) const ROUTE_COLUMNS: &str =
    "id, name, start_location, end_location, distance_km, bus_id, map_url, created_at, updated_at";

pub(crate) const RIDER_COLUMNS: &str =
    "id, username, email, phone_number, password_hash, role, is_verified, created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, reference, rider_id, bus_id, route_id, travel_date, \
     seat_numbers, total_price_cents, status, payment_status, note, created_at, updated_at";

pub(crate) fn bus_from_row(row: BusRow) -> Result<Bus, StoreError> {
    Ok(Bus {
        id: row.id,
        name: row.name,
        fleet_number: row.fleet_number,
        capacity: u32::try_from(row.capacity)
            .map_err(|_| StoreError::Backend("negative bus capacity in storage".into()))?,
        image_url: row.image_url,
        description: row.description,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) fn route_from_row(row: RouteRow) -> Route {
    Route {
        id: row.id,
        name: row.name,
        start_location: row.start_location,
        end_location: row.end_location,
        distance_km: row.distance_km,
        bus_id: row.bus_id,
        map_url: row.map_url,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub(crate) fn rider_from_row(row: RiderRow) -> Result<Rider, StoreError> {
    let role = RiderRole::parse(&row.role)
        .ok_or_else(|| StoreError::Backend(format!("unknown rider role: {}", row.role)))?;
    Ok(Rider {
        id: row.id,
        username: row.username,
        email: row.email,
        phone_number: row.phone_number,
        password_hash: row.password_hash,
        role,
        is_verified: row.is_verified,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn booking_from_row(row: BookingRow) -> Result<Booking, StoreError> {
    let status = BookingStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Backend(format!("unknown booking status: {}", row.status)))?;
    let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
        StoreError::Backend(format!("unknown payment status: {}", row.payment_status))
    })?;
    let mut seat_numbers = Vec::with_capacity(row.seat_numbers.len());
    for seat in row.seat_numbers {
        seat_numbers.push(
            u32::try_from(seat)
                .map_err(|_| StoreError::Backend("negative seat number in storage".into()))?,
        );
    }
    Ok(Booking {
        id: row.id,
        reference: row.reference,
        rider_id: row.rider_id,
        bus_id: row.bus_id,
        route_id: row.route_id,
        travel_date: row.travel_date,
        seat_numbers,
        total_price_cents: row.total_price_cents,
        status,
        payment_status,
        note: row.note,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// ============================================================================
// Session
// ============================================================================

enum SessionConn {
    Tx(Transaction<'static, Postgres>),
    Auto(PoolConnection<Postgres>),
}

pub struct PgSession {
    conn: SessionConn,
}

impl PgSession {
    fn conn(&mut self) -> &mut PgConnection {
        match &mut self.conn {
            SessionConn::Tx(tx) => &mut **tx,
            SessionConn::Auto(conn) => &mut **conn,
        }
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn find_bus(&mut self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        let row: Option<BusRow> =
            sqlx::query_as(&format!("SELECT {BUS_COLUMNS} FROM buses WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.conn())
                .await
                .map_err(map_sqlx_err)?;
        row.map(bus_from_row).transpose()
    }

    async fn find_route(&mut self, id: Uuid) -> Result<Option<Route>, StoreError> {
        let row: Option<RouteRow> =
            sqlx::query_as(&format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.conn())
                .await
                .map_err(map_sqlx_err)?;
        Ok(row.map(route_from_row))
    }

    async fn find_rider(&mut self, id: Uuid) -> Result<Option<Rider>, StoreError> {
        let row: Option<RiderRow> =
            sqlx::query_as(&format!("SELECT {RIDER_COLUMNS} FROM riders WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.conn())
                .await
                .map_err(map_sqlx_err)?;
        row.map(rider_from_row).transpose()
    }

    async fn held_seats(
        &mut self,
        bus_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<BTreeSet<u32>, StoreError> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT seat_number FROM booking_seats \
             WHERE bus_id = $1 AND travel_date = $2 AND active",
        )
        .bind(bus_id)
        .bind(travel_date)
        .fetch_all(self.conn())
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|(seat,)| u32::try_from(seat).ok())
            .collect())
    }

    async fn reference_exists(&mut self, reference: &str) -> Result<bool, StoreError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM bookings WHERE reference = $1")
            .bind(reference)
            .fetch_optional(self.conn())
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.is_some())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        let mut seats = Vec::with_capacity(booking.seat_numbers.len());
        for seat in &booking.seat_numbers {
            seats.push(
                i32::try_from(*seat)
                    .map_err(|_| StoreError::Backend("seat number out of range".into()))?,
            );
        }

        // Single statement: the bookings row and its seat claims land
        // atomically even on the autocommit path.
        sqlx::query(
            "WITH b AS ( \
                 INSERT INTO bookings \
                     (id, reference, rider_id, bus_id, route_id, travel_date, seat_numbers, \
                      total_price_cents, status, payment_status, note, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                 RETURNING id, bus_id, travel_date \
             ) \
             INSERT INTO booking_seats (booking_id, bus_id, travel_date, seat_number, active) \
             SELECT b.id, b.bus_id, b.travel_date, s.seat, TRUE \
             FROM b CROSS JOIN UNNEST($7::int[]) AS s(seat)",
        )
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.rider_id)
        .bind(booking.bus_id)
        .bind(booking.route_id)
        .bind(booking.travel_date)
        .bind(&seats)
        .bind(booking.total_price_cents)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(&booking.note)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(self.conn())
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        match self.conn {
            SessionConn::Tx(tx) => tx.commit().await.map_err(map_sqlx_err),
            SessionConn::Auto(_) => Ok(()),
        }
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        match self.conn {
            SessionConn::Tx(tx) => tx.rollback().await.map_err(map_sqlx_err),
            SessionConn::Auto(_) => Ok(()),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

fn push_filters(qb: &mut QueryBuilder<Postgres>, filter: &BookingFilter) {
    if let Some(rider_id) = filter.rider_id {
        qb.push(" AND rider_id = ").push_bind(rider_id);
    }
    if let Some(bus_id) = filter.bus_id {
        qb.push(" AND bus_id = ").push_bind(bus_id);
    }
    if let Some(route_id) = filter.route_id {
        qb.push(" AND route_id = ").push_bind(route_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(payment_status) = filter.payment_status {
        qb.push(" AND payment_status = ").push_bind(payment_status.as_str());
    }
    if let Some(travel_date) = filter.travel_date {
        qb.push(" AND travel_date = ").push_bind(travel_date);
    }
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        if !self.transactions_enabled {
            return Err(StoreError::TransactionsUnsupported(
                "transactions disabled for this deployment".into(),
            ));
        }
        let tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        Ok(Box::new(PgSession {
            conn: SessionConn::Tx(tx),
        }))
    }

    async fn autocommit(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_err)?;
        Ok(Box::new(PgSession {
            conn: SessionConn::Auto(conn),
        }))
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(booking_from_row).transpose()
    }

    async fn find_booking_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(booking_from_row).transpose()
    }

    async fn cancel_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        // Status flip and seat release in one statement; already-cancelled
        // bookings are left untouched.
        sqlx::query(
            "WITH b AS ( \
                 UPDATE bookings SET status = 'cancelled', updated_at = NOW() \
                 WHERE id = $1 AND status <> 'cancelled' \
                 RETURNING id \
             ) \
             UPDATE booking_seats SET active = FALSE \
             WHERE booking_id IN (SELECT id FROM b)",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        self.find_booking(id).await
    }

    async fn set_payment_status(
        &self,
        id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Booking>, StoreError> {
        sqlx::query("UPDATE bookings SET payment_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        self.find_booking(id).await
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
    ) -> Result<(Vec<Booking>, i64), StoreError> {
        let limit = i64::from(filter.limit.max(1));
        let offset = i64::from(filter.page.max(1) - 1) * limit;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1=1"
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<BookingRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings WHERE 1=1");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            bookings.push(booking_from_row(row)?);
        }
        Ok((bookings, total))
    }

    async fn bookings_for_rider(&self, rider_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE rider_id = $1 ORDER BY created_at DESC"
        ))
        .bind(rider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter().map(booking_from_row).collect()
    }

    async fn held_seats(
        &self,
        bus_id: Uuid,
        travel_date: NaiveDate,
    ) -> Result<BTreeSet<u32>, StoreError> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT seat_number FROM booking_seats \
             WHERE bus_id = $1 AND travel_date = $2 AND active",
        )
        .bind(bus_id)
        .bind(travel_date)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|(seat,)| u32::try_from(seat).ok())
            .collect())
    }
}

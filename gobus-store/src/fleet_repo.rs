use sqlx::PgPool;
use uuid::Uuid;

use gobus_core::model::{Bus, Route};
use gobus_core::store::StoreError;

use crate::pg_store::{
    bus_from_row, map_sqlx_err, route_from_row, BusRow, RouteRow, BUS_COLUMNS, ROUTE_COLUMNS,
};

pub struct NewBus {
    pub name: String,
    pub fleet_number: String,
    pub capacity: u32,
    pub image_url: Option<String>,
    pub description: String,
}

/// Partial update: `None` leaves the column unchanged.
#[derive(Default)]
pub struct BusUpdate {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

pub struct NewRoute {
    pub name: String,
    pub start_location: String,
    pub end_location: String,
    pub distance_km: f64,
    pub bus_id: Uuid,
    pub map_url: Option<String>,
}

#[derive(Default)]
pub struct RouteUpdate {
    pub name: Option<String>,
    pub start_location: Option<String>,
    pub end_location: Option<String>,
    pub distance_km: Option<f64>,
    pub map_url: Option<String>,
}

/// Admin CRUD for buses and routes. Uniqueness on fleet number and route
/// name surfaces as `StoreError::Conflict`; deletion does not cascade into
/// bookings.
pub struct FleetRepository {
    pool: PgPool,
}

impl FleetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_bus(&self, new: &NewBus) -> Result<Bus, StoreError> {
        let capacity = i32::try_from(new.capacity)
            .map_err(|_| StoreError::Backend("bus capacity out of range".into()))?;
        let row: BusRow = sqlx::query_as(&format!(
            "INSERT INTO buses \
                 (id, name, fleet_number, capacity, image_url, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) \
             RETURNING {BUS_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.fleet_number)
        .bind(capacity)
        .bind(&new.image_url)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        bus_from_row(row)
    }

    pub async fn list_buses(&self) -> Result<Vec<Bus>, StoreError> {
        let rows: Vec<BusRow> =
            sqlx::query_as(&format!("SELECT {BUS_COLUMNS} FROM buses ORDER BY name"))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        rows.into_iter().map(bus_from_row).collect()
    }

    pub async fn get_bus(&self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        let row: Option<BusRow> =
            sqlx::query_as(&format!("SELECT {BUS_COLUMNS} FROM buses WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(bus_from_row).transpose()
    }

    pub async fn update_bus(&self, id: Uuid, update: &BusUpdate) -> Result<Option<Bus>, StoreError> {
        let capacity = match update.capacity {
            Some(c) => Some(
                i32::try_from(c)
                    .map_err(|_| StoreError::Backend("bus capacity out of range".into()))?,
            ),
            None => None,
        };
        let row: Option<BusRow> = sqlx::query_as(&format!(
            "UPDATE buses SET \
                 name = COALESCE($2, name), \
                 capacity = COALESCE($3, capacity), \
                 image_url = COALESCE($4, image_url), \
                 description = COALESCE($5, description), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {BUS_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.name)
        .bind(capacity)
        .bind(&update.image_url)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.map(bus_from_row).transpose()
    }

    pub async fn delete_bus(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM buses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn create_route(&self, new: &NewRoute) -> Result<Route, StoreError> {
        let row: RouteRow = sqlx::query_as(&format!(
            "INSERT INTO routes \
                 (id, name, start_location, end_location, distance_km, bus_id, map_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) \
             RETURNING {ROUTE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.start_location)
        .bind(&new.end_location)
        .bind(new.distance_km)
        .bind(new.bus_id)
        .bind(&new.map_url)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(route_from_row(row))
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        let rows: Vec<RouteRow> =
            sqlx::query_as(&format!("SELECT {ROUTE_COLUMNS} FROM routes ORDER BY name"))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(route_from_row).collect())
    }

    pub async fn get_route(&self, id: Uuid) -> Result<Option<Route>, StoreError> {
        let row: Option<RouteRow> =
            sqlx::query_as(&format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(row.map(route_from_row))
    }

    pub async fn update_route(
        &self,
        id: Uuid,
        update: &RouteUpdate,
    ) -> Result<Option<Route>, StoreError> {
        let row: Option<RouteRow> = sqlx::query_as(&format!(
            "UPDATE routes SET \
                 name = COALESCE($2, name), \
                 start_location = COALESCE($3, start_location), \
                 end_location = COALESCE($4, end_location), \
                 distance_km = COALESCE($5, distance_km), \
                 map_url = COALESCE($6, map_url), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {ROUTE_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.start_location)
        .bind(&update.end_location)
        .bind(update.distance_km)
        .bind(&update.map_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.map(route_from_row))
    }

    pub async fn delete_route(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use gobus_core::store::StoreError;
use gobus_store::fleet_repo::{BusUpdate, NewBus, NewRoute, RouteUpdate};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateBusRequest {
    name: String,
    fleet_number: String,
    capacity: u32,
    image_url: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateBusRequest {
    name: Option<String>,
    capacity: Option<u32>,
    image_url: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRouteRequest {
    name: String,
    start_location: String,
    end_location: String,
    distance_km: f64,
    bus_id: Uuid,
    map_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateRouteRequest {
    name: Option<String>,
    start_location: Option<String>,
    end_location: Option<String>,
    distance_km: Option<f64>,
    map_url: Option<String>,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/buses", get(list_buses))
        .route("/v1/buses/{id}", get(get_bus))
        .route("/v1/routes", get(list_routes))
        .route("/v1/routes/{id}", get(get_route))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/buses", post(create_bus))
        .route("/v1/admin/buses/{id}", put(update_bus))
        .route("/v1/admin/buses/{id}", delete(delete_bus))
        .route("/v1/admin/routes", post(create_route))
        .route("/v1/admin/routes/{id}", put(update_route))
        .route("/v1/admin/routes/{id}", delete(delete_route))
}

// ============================================================================
// Bus Handlers
// ============================================================================

/// POST /v1/admin/buses
async fn create_bus(
    State(state): State<AppState>,
    Json(req): Json<CreateBusRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::ValidationError("name is required".into()));
    }
    if req.fleet_number.trim().is_empty() {
        return Err(ApiError::ValidationError("fleet_number is required".into()));
    }
    if req.capacity == 0 {
        return Err(ApiError::ValidationError(
            "capacity must be a positive integer".into(),
        ));
    }

    let bus = state
        .fleet
        .create_bus(&NewBus {
            name: req.name.trim().to_string(),
            fleet_number: req.fleet_number.trim().to_string(),
            capacity: req.capacity,
            image_url: req.image_url,
            description: req.description.unwrap_or_default(),
        })
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => {
                ApiError::ConflictError("fleet number already exists".into())
            }
            other => other.into(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Bus created", "bus": bus })),
    ))
}

/// GET /v1/buses
async fn list_buses(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let buses = state.fleet.list_buses().await?;
    Ok(Json(json!({ "count": buses.len(), "buses": buses })))
}

/// GET /v1/buses/{id}
async fn get_bus(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let bus = state
        .fleet
        .get_bus(id)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("bus not found".into()))?;
    Ok(Json(json!({ "bus": bus })))
}

/// PUT /v1/admin/buses/{id}
async fn update_bus(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.capacity == Some(0) {
        return Err(ApiError::ValidationError(
            "capacity must be a positive integer".into(),
        ));
    }

    let bus = state
        .fleet
        .update_bus(
            id,
            &BusUpdate {
                name: req.name,
                capacity: req.capacity,
                image_url: req.image_url,
                description: req.description,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFoundError("bus not found".into()))?;

    Ok(Json(json!({ "message": "Bus updated", "bus": bus })))
}

/// DELETE /v1/admin/buses/{id}
async fn delete_bus(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.fleet.delete_bus(id).await?;
    if !deleted {
        return Err(ApiError::NotFoundError("bus not found".into()));
    }
    Ok(Json(json!({ "message": "Bus deleted" })))
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /v1/admin/routes
async fn create_route(
    State(state): State<AppState>,
    Json(req): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::ValidationError("name is required".into()));
    }
    if req.start_location.trim().is_empty() || req.end_location.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "start_location and end_location are required".into(),
        ));
    }
    if req.distance_km <= 0.0 {
        return Err(ApiError::ValidationError(
            "distance_km must be positive".into(),
        ));
    }

    // The owning bus must exist before a route can reference it.
    state
        .fleet
        .get_bus(req.bus_id)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("bus not found".into()))?;

    let route = state
        .fleet
        .create_route(&NewRoute {
            name: req.name.trim().to_string(),
            start_location: req.start_location.trim().to_string(),
            end_location: req.end_location.trim().to_string(),
            distance_km: req.distance_km,
            bus_id: req.bus_id,
            map_url: req.map_url,
        })
        .await
        .map_err(|err| match err {
            StoreError::Conflict(_) => ApiError::ConflictError("route name already exists".into()),
            other => other.into(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Route created", "route": route })),
    ))
}

/// GET /v1/routes
async fn list_routes(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let routes = state.fleet.list_routes().await?;
    Ok(Json(json!({ "count": routes.len(), "routes": routes })))
}

/// GET /v1/routes/{id}
async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let route = state
        .fleet
        .get_route(id)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("route not found".into()))?;
    Ok(Json(json!({ "route": route })))
}

/// PUT /v1/admin/routes/{id}
async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRouteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if matches!(req.distance_km, Some(d) if d <= 0.0) {
        return Err(ApiError::ValidationError(
            "distance_km must be positive".into(),
        ));
    }

    let route = state
        .fleet
        .update_route(
            id,
            &RouteUpdate {
                name: req.name,
                start_location: req.start_location,
                end_location: req.end_location,
                distance_km: req.distance_km,
                map_url: req.map_url,
            },
        )
        .await?
        .ok_or_else(|| ApiError::NotFoundError("route not found".into()))?;

    Ok(Json(json!({ "message": "Route updated", "route": route })))
}

/// DELETE /v1/admin/routes/{id}
async fn delete_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.fleet.delete_route(id).await?;
    if !deleted {
        return Err(ApiError::NotFoundError("route not found".into()));
    }
    Ok(Json(json!({ "message": "Route deleted" })))
}

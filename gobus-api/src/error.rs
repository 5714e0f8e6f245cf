use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use gobus_core::error::ReservationError;
use gobus_core::store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    SeatConflict(Vec<u32>),
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::AuthenticationError(msg) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": msg }))
            }
            ApiError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::NotFoundError(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::ConflictError(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::SeatConflict(seats) => (
                StatusCode::CONFLICT,
                json!({ "error": "Seats already booked", "seats": seats }),
            ),
            ApiError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Validation(msg) => ApiError::ValidationError(msg),
            ReservationError::NotFound(entity) => {
                ApiError::NotFoundError(format!("{entity} not found"))
            }
            ReservationError::Consistency(msg) => ApiError::ValidationError(msg),
            ReservationError::SeatConflict { seats } => ApiError::SeatConflict(seats),
            ReservationError::TransientInfrastructure(msg) | ReservationError::Server(msg) => {
                ApiError::InternalServerError(msg)
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::ConflictError(msg),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_conflict_maps_to_409() {
        let err: ApiError = ReservationError::SeatConflict { seats: vec![6] }.into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_maps_to_400() {
        let err: ApiError = ReservationError::Validation("bad seats".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err: ApiError = ReservationError::not_found("bus").into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn server_errors_are_opaque_500s() {
        let err: ApiError = ReservationError::server("pool exploded").into();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use gobus_core::model::{Rider, RiderRole};
use gobus_store::mailer;
use gobus_store::rider_repo::NewRider;
use gobus_store::RefreshTokenStore;

use crate::error::ApiError;
use crate::middleware::auth::Claims;
use crate::password::PasswordHasher;
use crate::state::{AppState, AuthConfig};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    phone_number: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct RiderResponse {
    id: Uuid,
    username: String,
    email: String,
    phone_number: String,
    role: RiderRole,
    is_verified: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/refresh", post(refresh))
        .route("/v1/auth/logout", post(logout))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RiderResponse>), ApiError> {
    if req.username.trim().is_empty() {
        return Err(ApiError::ValidationError("username is required".into()));
    }
    if !req.email.contains('@') || req.email.contains('<') || req.email.contains('>') {
        return Err(ApiError::ValidationError("valid email is required".into()));
    }
    if req.phone_number.trim().is_empty() {
        return Err(ApiError::ValidationError("phone_number is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::ValidationError(
            "password must be at least 8 characters".into(),
        ));
    }

    let password_hash = PasswordHasher::new().hash_password(&req.password)?;

    let rider = state
        .riders
        .create(&NewRider {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            phone_number: req.phone_number.trim().to_string(),
            password_hash,
            role: RiderRole::Rider,
        })
        .await
        .map_err(|err| match err {
            gobus_core::store::StoreError::Conflict(_) => {
                ApiError::ConflictError("email already registered".into())
            }
            other => other.into(),
        })?;

    // Fire-and-forget welcome email (do not block registration)
    let notifier = state.notifier.clone();
    let content = mailer::welcome(&rider.username);
    let to = rider.email.clone();
    tokio::spawn(async move {
        if let Err(err) = notifier
            .send(&to, &content.subject, &content.html, &content.text)
            .await
        {
            warn!("welcome email failed: {}", err);
        }
    });

    Ok((StatusCode::CREATED, Json(rider_response(rider))))
}

/// POST /v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let rider = state
        .riders
        .find_by_email(&req.email.trim().to_lowercase())
        .await?
        .ok_or_else(|| ApiError::AuthenticationError("invalid credentials".into()))?;

    let valid = PasswordHasher::new().verify_password(&req.password, &rider.password_hash)?;
    if !valid {
        return Err(ApiError::AuthenticationError("invalid credentials".into()));
    }

    let refresh_token = RefreshTokenStore::issue_token();
    state
        .tokens
        .store(&refresh_token, rider.id)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("token store: {e}")))?;

    let access_token = issue_access_token(&state.auth, &rider)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.auth.access_ttl_seconds,
    }))
}

/// POST /v1/auth/refresh
///
/// Rotates the refresh token: the presented token is revoked and a new one
/// issued atomically, so each token is good for exactly one refresh.
async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let rider_id = state
        .tokens
        .lookup(&req.refresh_token)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("token store: {e}")))?
        .ok_or_else(|| ApiError::AuthenticationError("invalid or expired refresh token".into()))?;

    let rider = state
        .riders
        .find_by_id(rider_id)
        .await?
        .ok_or_else(|| ApiError::AuthenticationError("invalid or expired refresh token".into()))?;

    let new_refresh = RefreshTokenStore::issue_token();
    state
        .tokens
        .rotate(&req.refresh_token, &new_refresh, rider.id)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("token store: {e}")))?;

    let access_token = issue_access_token(&state.auth, &rider)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: new_refresh,
        token_type: "Bearer",
        expires_in: state.auth.access_ttl_seconds,
    }))
}

/// POST /v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .tokens
        .revoke(&req.refresh_token)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("token store: {e}")))?;
    Ok(Json(serde_json::json!({ "message": "logged out" })))
}

fn issue_access_token(auth: &AuthConfig, rider: &Rider) -> Result<String, ApiError> {
    let claims = Claims {
        sub: rider.id.to_string(),
        email: rider.email.clone(),
        role: rider.role.as_str().to_string(),
        exp: (Utc::now() + Duration::seconds(auth.access_ttl_seconds as i64)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.secret.as_bytes()),
    )
    .map_err(|e| ApiError::InternalServerError(format!("token encoding failed: {e}")))
}

fn rider_response(rider: Rider) -> RiderResponse {
    RiderResponse {
        id: rider.id,
        username: rider.username,
        email: rider.email,
        phone_number: rider.phone_number,
        role: rider.role,
        is_verified: rider.is_verified,
        created_at: rider.created_at,
    }
}

use sqlx::PgPool;
use uuid::Uuid;

use gobus_core::model::{Rider, RiderRole};
use gobus_core::store::StoreError;

use crate::pg_store::{map_sqlx_err, rider_from_row, RiderRow, RIDER_COLUMNS};

pub struct NewRider {
    pub username: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub role: RiderRole,
}

pub struct RiderRepository {
    pool: PgPool,
}

impl RiderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new rider. A duplicate email surfaces as
    /// `StoreError::Conflict` via the unique index.
    pub async fn create(&self, new: &NewRider) -> Result<Rider, StoreError> {
        let row: RiderRow = sqlx::query_as(&format!(
            "INSERT INTO riders \
                 (id, username, email, phone_number, password_hash, role, is_verified, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW(), NOW()) \
             RETURNING {RIDER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.phone_number)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rider_from_row(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Rider>, StoreError> {
        let row: Option<RiderRow> =
            sqlx::query_as(&format!("SELECT {RIDER_COLUMNS} FROM riders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(rider_from_row).transpose()
    }

    /// Elevates a rider to the admin role and marks them verified. Used by
    /// the startup bootstrap that ensures an administrator account exists.
    pub async fn promote_to_admin(&self, id: Uuid) -> Result<Option<Rider>, StoreError> {
        let row: Option<RiderRow> = sqlx::query_as(&format!(
            "UPDATE riders SET role = 'admin', is_verified = TRUE, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {RIDER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        row.map(rider_from_row).transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Rider>, StoreError> {
        let row: Option<RiderRow> =
            sqlx::query_as(&format!("SELECT {RIDER_COLUMNS} FROM riders WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        row.map(rider_from_row).transpose()
    }
}

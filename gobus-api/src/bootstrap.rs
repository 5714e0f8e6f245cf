use std::env;

use tracing::{error, info, warn};

use gobus_core::model::RiderRole;
use gobus_store::rider_repo::NewRider;
use gobus_store::RiderRepository;

use crate::password::PasswordHasher;

/// Ensures an admin rider exists at startup.
///
/// Reads credentials from the environment: `ADMIN_EMAIL`, `ADMIN_PASSWORD`,
/// `ADMIN_USERNAME`. Skips quietly when they are absent; never fails server
/// startup.
pub async fn ensure_admin_rider(riders: &RiderRepository) {
    let email = env::var("ADMIN_EMAIL")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let password = env::var("ADMIN_PASSWORD").unwrap_or_default();
    let username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "Administrator".to_string());

    if email.is_empty() || password.is_empty() {
        warn!("ADMIN_EMAIL or ADMIN_PASSWORD missing, skipping admin bootstrap");
        return;
    }

    match riders.find_by_email(&email).await {
        Ok(Some(rider)) => {
            if rider.role == RiderRole::Admin && rider.is_verified {
                info!("admin already present: {}", email);
                return;
            }
            match riders.promote_to_admin(rider.id).await {
                Ok(_) => info!("existing rider elevated to admin: {}", email),
                Err(err) => error!("failed to elevate rider to admin: {}", err),
            }
        }
        Ok(None) => {
            let password_hash = match PasswordHasher::new().hash_password(&password) {
                Ok(hash) => hash,
                Err(err) => {
                    error!("admin bootstrap could not hash password: {:?}", err);
                    return;
                }
            };

            let created = riders
                .create(&NewRider {
                    username,
                    email: email.clone(),
                    phone_number: "0000000000".to_string(),
                    password_hash,
                    role: RiderRole::Admin,
                })
                .await;

            match created {
                // create() leaves is_verified false; the promotion flips it.
                Ok(rider) => match riders.promote_to_admin(rider.id).await {
                    Ok(_) => info!("admin rider created: {}", email),
                    Err(err) => error!("failed to verify new admin rider: {}", err),
                },
                Err(err) => error!("failed to create admin rider: {}", err),
            }
        }
        Err(err) => error!("admin bootstrap failed: {}", err),
    }
}

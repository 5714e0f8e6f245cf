use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use gobus_core::error::ReservationError;
use gobus_core::model::{Booking, BookingStatus, PaymentStatus};
use gobus_core::store::{ReservationStore, StoreError};

/// Owns booking state transitions. Authorization (owner or administrator)
/// is enforced by the caller, not here.
pub struct BookingLifecycle {
    store: Arc<dyn ReservationStore>,
}

pub struct CancelOutcome {
    pub booking: Booking,
    /// True when the booking was already cancelled and nothing was mutated.
    pub already_cancelled: bool,
}

impl BookingLifecycle {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    pub async fn find(&self, id: Uuid) -> Result<Booking, ReservationError> {
        self.store
            .find_booking(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::not_found("booking"))
    }

    /// Cancelled is a terminal absorbing state: re-cancelling an already
    /// cancelled booking succeeds without mutation. Cancellation does not
    /// free seats through any separate release step; the availability
    /// query's active-status filter is what makes them bookable again.
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, ReservationError> {
        let existing = self.find(id).await?;
        if existing.status == BookingStatus::Cancelled {
            return Ok(CancelOutcome {
                booking: existing,
                already_cancelled: true,
            });
        }

        let booking = self
            .store
            .cancel_booking(id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::not_found("booking"))?;

        info!(booking_id = %id, reference = %booking.reference, "booking cancelled");
        Ok(CancelOutcome {
            booking,
            already_cancelled: false,
        })
    }

    /// Flips the payment sub-state to paid. No cross-check against the
    /// cancellation status; paying a cancelled booking stays representable
    /// and any further policy belongs to the caller.
    pub async fn mark_paid(&self, id: Uuid) -> Result<Booking, ReservationError> {
        let booking = self
            .store
            .set_payment_status(id, PaymentStatus::Paid)
            .await
            .map_err(store_err)?
            .ok_or_else(|| ReservationError::not_found("booking"))?;

        info!(booking_id = %id, reference = %booking.reference, "booking marked paid");
        Ok(booking)
    }
}

fn store_err(err: StoreError) -> ReservationError {
    ReservationError::server(err.to_string())
}

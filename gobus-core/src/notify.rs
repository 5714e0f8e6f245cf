use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget delivery collaborator. Callers log failures and never let
/// them propagate into the reservation result; dispatch always happens on a
/// detached task after the booking is durably committed.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), NotifyError>;
}

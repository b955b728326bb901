//! Outbound notifications (invitation emails and the like).

use async_trait::async_trait;

/// Delivers notifications to users outside the API.
///
/// Delivery is best-effort: the vault never fails an operation because a
/// notification could not be sent.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Tell `email` they have been invited to `org_name`, with a link
    /// carrying `invitation_id`.
    async fn invitation(&self, email: &str, org_name: &str, invitation_id: uuid::Uuid);
}

/// A [`Notifier`] that only logs. Used in tests and deployments without
/// an email provider configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn invitation(&self, email: &str, org_name: &str, invitation_id: uuid::Uuid) {
        tracing::info!(%email, org = %org_name, %invitation_id, "invitation issued");
    }
}

//! Notification dispatch seam
//!
//! The engine only composes notifications; delivery belongs to an external
//! dispatcher behind the `Notifier` trait. Dispatch is fire-and-forget: a
//! failed delivery is the dispatcher's problem, never the pass's.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Notification kinds emitted by the circulation engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationType {
    AllocationReady,
    AllocationExpired,
    ReservationCancelled,
    BookOverdue,
    PenaltyAssessed,
    LostClaimRecorded,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NotificationType::AllocationReady => "allocation-ready",
            NotificationType::AllocationExpired => "allocation-expired",
            NotificationType::ReservationCancelled => "reservation-cancelled",
            NotificationType::BookOverdue => "book-overdue",
            NotificationType::PenaltyAssessed => "penalty-assessed",
            NotificationType::LostClaimRecorded => "lost-claim-recorded",
        };
        write!(f, "{}", label)
    }
}

/// External notification dispatcher
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationType, payload: Value);
}

/// Default dispatcher that only logs the notification
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, kind: NotificationType, payload: Value) {
        tracing::info!(kind = %kind, %payload, "notification");
    }
}

/// Send one notification per payload, skipping empty batches
pub(crate) async fn announce<T: Serialize + Sync>(
    notifier: &dyn Notifier,
    kind: NotificationType,
    payloads: &[T],
) {
    if payloads.is_empty() {
        return;
    }
    match serde_json::to_value(payloads) {
        Ok(value) => notifier.notify(kind, value).await,
        Err(e) => tracing::warn!("failed to serialize {} payload: {}", kind, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_announce_skips_empty_batch() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        announce::<i32>(&notifier, NotificationType::AllocationReady, &[]).await;
    }

    #[tokio::test]
    async fn test_announce_sends_batch_once() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|kind, payload| {
                *kind == NotificationType::AllocationReady && payload == &json!([1, 2, 3])
            })
            .times(1)
            .return_const(());
        announce(&notifier, NotificationType::AllocationReady, &[1, 2, 3]).await;
    }
}

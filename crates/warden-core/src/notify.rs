//! Dashboard notifications.
//!
//! After a cycle persists, the orchestrator emits a [`DashboardUpdate`] so
//! the UI layer can refresh aggregate counts. Delivery is fire-and-forget:
//! it runs under a deadline and its failure never rolls back stored state.

use crate::error::NotifyError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use warden_registry::Site;

/// Signal that a site's dashboard entry changed.
#[derive(Debug, Clone)]
pub struct DashboardUpdate {
    /// The site as persisted (or as it was before deletion).
    pub site: Site,
    /// True if the site was deleted.
    pub was_deleted: bool,
}

/// Receiver of dashboard updates.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one update.
    async fn emit(&self, update: DashboardUpdate) -> Result<(), NotifyError>;
}

/// Fans updates out over a tokio broadcast channel.
///
/// Having no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<DashboardUpdate>,
}

impl BroadcastNotifier {
    /// Creates a channel buffering up to `capacity` updates per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to future updates.
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn emit(&self, update: DashboardUpdate) -> Result<(), NotifyError> {
        match self.tx.send(update) {
            Ok(receivers) => debug!(receivers, "Dashboard update sent"),
            Err(_) => debug!("Dashboard update dropped, no subscribers"),
        }
        Ok(())
    }
}

/// Emits `update` under `timeout`. Returns whether delivery succeeded.
pub async fn emit_bounded(notifier: &dyn Notifier, update: DashboardUpdate, timeout: Duration) -> bool {
    let url = update.site.url.clone();
    let result = match tokio::time::timeout(timeout, notifier.emit(update)).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(url = %url, error = %e, "Dashboard notification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn emit(&self, _update: DashboardUpdate) -> Result<(), NotifyError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn update() -> DashboardUpdate {
        DashboardUpdate {
            site: Site::new("https://a.example", "t", None),
            was_deleted: false,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        assert!(emit_bounded(&notifier, update(), Duration::from_secs(1)).await);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.site.url, "https://a.example");
    }

    #[tokio::test]
    async fn test_no_subscribers_is_ok() {
        let notifier = BroadcastNotifier::default();
        assert!(emit_bounded(&notifier, update(), Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_stalled_notifier_times_out() {
        assert!(!emit_bounded(&Stalled, update(), Duration::from_millis(20)).await);
    }
}

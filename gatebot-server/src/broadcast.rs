//! Bounded fan-out of one message to many users.
//!
//! The dispatcher is given its recipient list up front and never reads the
//! store. At most `concurrency` deliveries are in flight; each one gets
//! `delivery_timeout` before it is counted as failed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{future, stream, StreamExt};
use gatebot_core::UserId;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::state_machine::effect::Reply;
use crate::transport::Messenger;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome counts of one broadcast.
///
/// `succeeded + failed + cancelled` always equals the number of recipients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Recipients never attempted because the broadcast was cancelled.
    pub cancelled: usize,
}

impl BroadcastReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Owner side of a cancellation flag shared with running broadcasts.
#[derive(Clone)]
pub struct BroadcastHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for BroadcastHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Stop starting new deliveries. Deliveries already in flight finish or
    /// time out.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver side of a [`BroadcastHandle`].
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

pub struct BroadcastDispatcher {
    messenger: Arc<dyn Messenger>,
    concurrency: usize,
    delivery_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(messenger: Arc<dyn Messenger>, concurrency: usize, delivery_timeout: Duration) -> Self {
        Self {
            messenger,
            concurrency: concurrency.max(1),
            delivery_timeout,
        }
    }

    /// Deliver `reply` to every recipient, tolerating individual failures.
    pub async fn broadcast(
        &self,
        recipients: Vec<UserId>,
        reply: &Reply,
        cancel: &CancelSignal,
    ) -> BroadcastReport {
        let total = recipients.len();
        let messenger = &self.messenger;
        let timeout = self.delivery_timeout;

        let outcomes: Vec<bool> = stream::iter(recipients)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|user| async move {
                match tokio::time::timeout(timeout, messenger.deliver(user, reply)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!("Broadcast delivery to {} failed: {}", user, e);
                        false
                    }
                    Err(_) => {
                        warn!(
                            "Broadcast delivery to {} timed out after {:?}",
                            user, timeout
                        );
                        false
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let report = BroadcastReport {
            succeeded,
            failed: outcomes.len() - succeeded,
            cancelled: total - outcomes.len(),
        };

        info!(
            "Broadcast finished: {} sent, {} failed, {} cancelled",
            report.succeeded, report.failed, report.cancelled
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fakes::RecordingMessenger;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn users(n: i64) -> Vec<UserId> {
        (1..=n).map(UserId).collect()
    }

    fn announcement() -> Reply {
        Reply::Announcement {
            text: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.fail_for(UserId(2));
        messenger.fail_for(UserId(4));
        let dispatcher = BroadcastDispatcher::new(messenger.clone(), 8, DEFAULT_DELIVERY_TIMEOUT);

        let report = dispatcher
            .broadcast(users(5), &announcement(), &BroadcastHandle::new().signal())
            .await;

        assert_eq!(
            report,
            BroadcastReport {
                succeeded: 3,
                failed: 2,
                cancelled: 0
            }
        );
        let mut delivered: Vec<UserId> = messenger.sent().into_iter().map(|(u, _)| u).collect();
        delivered.sort();
        assert_eq!(delivered, vec![UserId(1), UserId(3), UserId(5)]);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.stall_for(UserId(3));
        let dispatcher =
            BroadcastDispatcher::new(messenger.clone(), 2, Duration::from_millis(50));

        let report = dispatcher
            .broadcast(users(4), &announcement(), &BroadcastHandle::new().signal())
            .await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total(), 4);
    }

    #[tokio::test]
    async fn test_empty_recipient_list() {
        let dispatcher = BroadcastDispatcher::new(
            Arc::new(RecordingMessenger::new()),
            8,
            DEFAULT_DELIVERY_TIMEOUT,
        );
        let report = dispatcher
            .broadcast(Vec::new(), &announcement(), &BroadcastHandle::new().signal())
            .await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_cancel_before_start_attempts_nothing() {
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = BroadcastDispatcher::new(messenger.clone(), 8, DEFAULT_DELIVERY_TIMEOUT);
        let handle = BroadcastHandle::new();
        handle.cancel();

        let report = dispatcher
            .broadcast(users(5), &announcement(), &handle.signal())
            .await;

        assert_eq!(
            report,
            BroadcastReport {
                succeeded: 0,
                failed: 0,
                cancelled: 5
            }
        );
        assert!(messenger.sent().is_empty());
    }

    /// Cancels the broadcast from inside the first delivery.
    struct CancelOnFirst {
        handle: BroadcastHandle,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Messenger for CancelOnFirst {
        async fn deliver(&self, _user: UserId, _reply: &Reply) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.handle.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_broadcast_stops_new_deliveries() {
        let handle = BroadcastHandle::new();
        let messenger = Arc::new(CancelOnFirst {
            handle: handle.clone(),
            calls: AtomicUsize::new(0),
        });
        let dispatcher = BroadcastDispatcher::new(messenger.clone(), 1, DEFAULT_DELIVERY_TIMEOUT);

        let report = dispatcher
            .broadcast(users(5), &announcement(), &handle.signal())
            .await;

        assert_eq!(messenger.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            report,
            BroadcastReport {
                succeeded: 1,
                failed: 0,
                cancelled: 4
            }
        );
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let dispatcher = BroadcastDispatcher::new(
            Arc::new(RecordingMessenger::new()),
            0,
            DEFAULT_DELIVERY_TIMEOUT,
        );
        assert_eq!(dispatcher.concurrency, 1);
    }
}

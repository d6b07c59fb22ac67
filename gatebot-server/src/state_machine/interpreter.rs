//! Effect interpreter.
//!
//! The boundary between the state machines and the chat platform. Deliveries
//! are best-effort: a failed send is logged and forgotten. Broadcasts run on
//! their own task so the admin who asked for one gets control back at once.

use std::sync::Arc;

use gatebot_core::{UserDocument, UserId};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::effect::{Effect, LogLevel, Reply};
use crate::broadcast::{BroadcastDispatcher, BroadcastHandle, BroadcastReport};
use crate::store::DocumentStore;
use crate::transport::Messenger;

pub struct Interpreter {
    messenger: Arc<dyn Messenger>,
    dispatcher: Arc<BroadcastDispatcher>,
    users: DocumentStore<UserDocument>,
    cancel: BroadcastHandle,
    broadcasts: Mutex<JoinSet<BroadcastReport>>,
}

impl Interpreter {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        dispatcher: BroadcastDispatcher,
        users: DocumentStore<UserDocument>,
    ) -> Self {
        Self {
            messenger,
            dispatcher: Arc::new(dispatcher),
            users,
            cancel: BroadcastHandle::new(),
            broadcasts: Mutex::new(JoinSet::new()),
        }
    }

    /// Execute effects in order. Nothing here fails the caller.
    pub async fn execute_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Deliver { to, reply } => {
                    deliver(self.messenger.as_ref(), to, &reply).await;
                }
                Effect::Broadcast { requested_by, text } => {
                    self.spawn_broadcast(requested_by, text).await;
                }
                Effect::Log { level, message } => match level {
                    LogLevel::Debug => debug!("{}", message),
                    LogLevel::Info => info!("{}", message),
                    LogLevel::Warn => warn!("{}", message),
                    LogLevel::Error => error!("{}", message),
                },
            }
        }
    }

    async fn spawn_broadcast(&self, requested_by: UserId, text: String) {
        let messenger = self.messenger.clone();
        let dispatcher = self.dispatcher.clone();
        let users = self.users.clone();
        let signal = self.cancel.signal();

        let task = async move {
            // The recipient list is fixed here; users who join mid-broadcast
            // are not included.
            let recipients = match users.load().await {
                Ok(doc) => doc.user_ids(),
                Err(e) => {
                    error!("Broadcast by {} aborted, could not load users: {}", requested_by, e);
                    deliver(messenger.as_ref(), requested_by, &Reply::TemporaryFailure).await;
                    return BroadcastReport::default();
                }
            };

            info!(
                "Broadcast by {} to {} users started",
                requested_by,
                recipients.len()
            );
            deliver(
                messenger.as_ref(),
                requested_by,
                &Reply::BroadcastStarted {
                    recipients: recipients.len(),
                },
            )
            .await;

            let report = dispatcher
                .broadcast(recipients, &Reply::Announcement { text }, &signal)
                .await;

            deliver(
                messenger.as_ref(),
                requested_by,
                &Reply::BroadcastFinished { report },
            )
            .await;
            report
        };

        let mut broadcasts = self.broadcasts.lock().await;
        while let Some(joined) = broadcasts.try_join_next() {
            match joined {
                Ok(report) => debug!("Reaped finished broadcast: {:?}", report),
                Err(e) => error!("Broadcast task failed: {}", e),
            }
        }
        broadcasts.spawn(task);
    }

    #[cfg(test)]
    async fn tracked_broadcasts(&self) -> usize {
        self.broadcasts.lock().await.len()
    }

    /// Stop all running broadcasts from starting new deliveries.
    pub fn cancel_broadcasts(&self) {
        self.cancel.cancel();
    }

    /// Wait for every broadcast not yet reaped and return their reports.
    ///
    /// Broadcasts that had already finished when a later one was spawned are
    /// not included; their requesters were told the outcome at the time.
    pub async fn wait_for_broadcasts(&self) -> Vec<BroadcastReport> {
        let mut running = std::mem::take(&mut *self.broadcasts.lock().await);
        let mut reports = Vec::new();
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("Broadcast task failed: {}", e),
            }
        }
        reports
    }
}

async fn deliver(messenger: &dyn Messenger, to: UserId, reply: &Reply) {
    if let Err(e) = messenger.deliver(to, reply).await {
        warn!("Failed to deliver to {}: {}", to, e);
    }
}

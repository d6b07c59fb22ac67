//! Collaborator traits for the chat platform.
//!
//! The state machines only ever talk to the outside world through these two
//! traits, so tests drive them with recording doubles and production wires in
//! the Telegram client.

use async_trait::async_trait;
use gatebot_core::UserId;
use thiserror::Error;

use crate::state_machine::effect::Reply;

/// A failed call to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },

    #[error("timed out")]
    Timeout,
}

/// Answer from the membership oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Joined,
    NotJoined,
    /// The platform answered but the status could not be interpreted.
    Unknown,
}

#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Whether `user` is currently a member of the channel `channel_id`.
    async fn is_member(&self, channel_id: &str, user: UserId)
        -> Result<Membership, TransportError>;
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send one reply to `user`. Failures are reported, never retried here.
    async fn deliver(&self, user: UserId, reply: &Reply) -> Result<(), TransportError>;

    /// Acknowledge a pressed inline button so the client stops waiting.
    async fn acknowledge_callback(&self, _callback_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Recording doubles for tests.
#[cfg(test)]
pub mod fakes {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Records every delivery; can be told to fail or stall for some users.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<(UserId, Reply)>>,
        pub failing: Mutex<HashSet<UserId>>,
        pub stalling: Mutex<HashSet<UserId>>,
        pub acknowledged: Mutex<Vec<String>>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_for(&self, user: UserId) {
            self.failing.lock().unwrap().insert(user);
        }

        pub fn stall_for(&self, user: UserId) {
            self.stalling.lock().unwrap().insert(user);
        }

        pub fn sent(&self) -> Vec<(UserId, Reply)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, user: UserId) -> Vec<Reply> {
            self.sent()
                .into_iter()
                .filter(|(to, _)| *to == user)
                .map(|(_, reply)| reply)
                .collect()
        }

        pub fn acknowledged(&self) -> Vec<String> {
            self.acknowledged.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn deliver(&self, user: UserId, reply: &Reply) -> Result<(), TransportError> {
            let stall = self.stalling.lock().unwrap().contains(&user);
            if stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.failing.lock().unwrap().contains(&user) {
                return Err(TransportError::Api {
                    status: 403,
                    description: "Forbidden: bot was blocked by the user".to_string(),
                });
            }
            self.sent.lock().unwrap().push((user, reply.clone()));
            Ok(())
        }

        async fn acknowledge_callback(&self, callback_id: &str) -> Result<(), TransportError> {
            self.acknowledged
                .lock()
                .unwrap()
                .push(callback_id.to_string());
            Ok(())
        }
    }

    /// Membership answers keyed by (channel id, user). Missing entries are
    /// `NotJoined`; channels in `broken` return a transport error.
    #[derive(Default)]
    pub struct FakeOracle {
        pub answers: Mutex<HashMap<(String, UserId), Membership>>,
        pub broken: Mutex<HashSet<String>>,
    }

    impl FakeOracle {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, channel_id: &str, user: UserId, membership: Membership) {
            self.answers
                .lock()
                .unwrap()
                .insert((channel_id.to_string(), user), membership);
        }

        pub fn break_channel(&self, channel_id: &str) {
            self.broken.lock().unwrap().insert(channel_id.to_string());
        }
    }

    #[async_trait]
    impl MembershipOracle for FakeOracle {
        async fn is_member(
            &self,
            channel_id: &str,
            user: UserId,
        ) -> Result<Membership, TransportError> {
            if self.broken.lock().unwrap().contains(channel_id) {
                return Err(TransportError::Request("connection reset".to_string()));
            }
            Ok(self
                .answers
                .lock()
                .unwrap()
                .get(&(channel_id.to_string(), user))
                .copied()
                .unwrap_or(Membership::NotJoined))
        }
    }
}

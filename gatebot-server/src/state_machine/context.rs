//! What the machines can see while handling an event.

use std::sync::Arc;

use gatebot_core::{ConfigDocument, UserDocument, UserId};

use super::effect::Effect;
use crate::store::DocumentStore;
use crate::transport::MembershipOracle;

/// Fixed settings the handlers need.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub root_admin: UserId,
    pub reward_link: String,
    /// Username without the leading `@`, used to build referral links.
    pub bot_username: String,
}

impl BotSettings {
    pub fn referral_link(&self, user: UserId) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, user)
    }
}

#[derive(Clone)]
pub struct BotContext {
    pub users: DocumentStore<UserDocument>,
    pub config: DocumentStore<ConfigDocument>,
    pub oracle: Arc<dyn MembershipOracle>,
    pub settings: BotSettings,
}

/// New state plus the effects to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S> {
    pub state: S,
    pub effects: Vec<Effect>,
}

impl<S> Transition<S> {
    pub fn new(state: S, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }

    /// Stay in `state` with no effects.
    pub fn stay(state: S) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }
}

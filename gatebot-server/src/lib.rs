pub mod broadcast;
pub mod config;
pub mod error;
pub mod render;
pub mod repository;
pub mod state_machine;
pub mod status;
pub mod store;
pub mod telegram;
pub mod transport;
pub mod webhook;

use std::sync::Arc;

pub use error::{BotError, BotResult};
pub use state_machine::{BotContext, BotSettings, Interpreter, SessionStore};
pub use store::{Document, DocumentStore, Versioned};
pub use transport::{Membership, MembershipOracle, Messenger, TransportError};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn get_bot_version() -> String {
    // First check for a hash injected by the deployment build
    if let Some(git_hash) = option_env!("GATEBOT_GIT_HASH") {
        short_hash(git_hash)
    } else if let Some(git_hash) = built_info::GIT_COMMIT_HASH {
        // Fall back to built crate's git detection (for cargo builds)
        short_hash(git_hash)
    } else {
        "unknown".to_string()
    }
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(8).collect()
}

/// Byte comparison that does not stop at the first difference.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Everything the HTTP handlers share.
pub struct AppState {
    pub bot: BotContext,
    pub sessions: SessionStore,
    pub interpreter: Interpreter,
    pub messenger: Arc<dyn Messenger>,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`. Unchecked when `None`.
    pub webhook_secret: Option<String>,
    /// Bearer token for `/status`. The endpoint is disabled when `None`.
    pub status_auth_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "01234567");
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}

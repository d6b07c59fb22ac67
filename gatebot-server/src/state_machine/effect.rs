//! Effects (side effects as data).
//!
//! Handlers return effects instead of calling the chat platform directly. The
//! interpreter executes them; tests inspect them.

use gatebot_core::{AdminAction, ChannelDescriptor, UserId, ValidationError};

use crate::broadcast::BroadcastReport;
use crate::error::{BotError, NotFoundTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send one reply to one user. Best-effort: failures are logged only.
    Deliver { to: UserId, reply: Reply },

    /// Fan `text` out to every known user, then report to `requested_by`.
    Broadcast { requested_by: UserId, text: String },

    Log { level: LogLevel, message: String },
}

impl Effect {
    pub fn deliver(to: UserId, reply: Reply) -> Self {
        Effect::Deliver { to, reply }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Effect::Log {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Which configuration list a picker or "none found" reply is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigList {
    Channels,
    Folders,
}

/// A typed outbound message. Rendering to platform text lives in `render`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    // Onboarding
    /// Join buttons for every channel and folder. `missing` names the
    /// channels a failed join check found the user outside of.
    ChannelGate {
        channels: Vec<ChannelDescriptor>,
        folders: Vec<(String, String)>,
        missing: Vec<String>,
    },
    MainMenu,
    PleaseStart,
    ReferralStatus { count: usize, remaining: usize },
    ReferralLink { link: String },
    Reward { link: String, first_unlock: bool },
    NotEligible { remaining: usize },
    NewReferral { referral_count: usize },
    QuotaReached,

    // Admin
    PermissionDenied,
    AdminPanel,
    InputPrompt { action: AdminAction },
    ChannelPicker { channels: Vec<String> },
    FolderPicker { folders: Vec<String> },
    NothingToDelete { list: ConfigList },
    ChannelAdded { name: String },
    FolderSaved { name: String },
    AdminAdded { id: UserId },
    AlreadyAdmin { id: UserId },
    ChannelDeleted { name: String },
    FolderDeleted { name: String },
    InvalidInput { error: ValidationError },
    NotFound { target: NotFoundTarget },

    // Broadcast
    Announcement { text: String },
    BroadcastStarted { recipients: usize },
    BroadcastFinished { report: BroadcastReport },

    /// Something failed on our side; nothing was changed.
    TemporaryFailure,
}

impl Reply {
    /// The reply a user sees for a failed operation.
    pub fn for_error(err: &BotError) -> Reply {
        match err {
            BotError::Validation(error) => Reply::InvalidInput {
                error: error.clone(),
            },
            BotError::Unauthorized => Reply::PermissionDenied,
            BotError::NotFound(target) => Reply::NotFound {
                target: target.clone(),
            },
            BotError::Persistence(_) => Reply::TemporaryFailure,
        }
    }
}

/// Effects reporting `err` to `user`, logging it when it is our fault.
pub fn error_effects(user: UserId, err: &BotError) -> Vec<Effect> {
    let mut effects = Vec::new();
    if let BotError::Persistence(e) = err {
        effects.push(Effect::log(
            LogLevel::Error,
            format!("Operation for user {} not committed: {}", user, e),
        ));
    }
    effects.push(Effect::deliver(user, Reply::for_error(err)));
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryError;

    #[test]
    fn test_error_replies() {
        assert_eq!(
            Reply::for_error(&BotError::Unauthorized),
            Reply::PermissionDenied
        );
        assert_eq!(
            Reply::for_error(&BotError::NotFound(NotFoundTarget::Folder("F1".into()))),
            Reply::NotFound {
                target: NotFoundTarget::Folder("F1".into())
            }
        );
        assert_eq!(
            Reply::for_error(&BotError::Validation(ValidationError::EmptyMessage)),
            Reply::InvalidInput {
                error: ValidationError::EmptyMessage
            }
        );
    }

    #[test]
    fn test_persistence_error_is_logged_and_reported() {
        let err = BotError::Persistence(RepositoryError::storage("put", "disk full"));
        let effects = error_effects(UserId(3), &err);
        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[0], Effect::Log { level: LogLevel::Error, .. }));
        assert_eq!(
            effects[1],
            Effect::deliver(UserId(3), Reply::TemporaryFailure)
        );
    }
}

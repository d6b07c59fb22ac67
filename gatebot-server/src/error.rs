//! Errors surfaced by bot operations.

use gatebot_core::ValidationError;
use thiserror::Error;

use crate::repository::RepositoryError;

/// What a delete selection pointed at that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundTarget {
    Channel(usize),
    Folder(String),
}

impl std::fmt::Display for NotFoundTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundTarget::Channel(index) => write!(f, "channel #{}", index + 1),
            NotFoundTarget::Folder(name) => write!(f, "folder '{}'", name),
        }
    }
}

/// Failure of a single bot operation.
///
/// Every variant except `Persistence` is an expected outcome reported back to
/// the caller. `Persistence` means the operation was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("caller is not an admin")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(NotFoundTarget),

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

pub type BotResult<T> = Result<T, BotError>;

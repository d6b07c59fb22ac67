//! Repository abstraction for document persistence.
//!
//! The bot keeps its whole state in two JSON documents (users and
//! configuration). This module defines the `DocumentRepository` trait that
//! stores those documents as opaque bodies tagged with a revision, so callers
//! can detect concurrent writers with compare-and-swap. Implementations can
//! provide different backends (in-memory, SQLite).

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Per-document revision counter.
///
/// Revision 0 means "no document stored yet"; every successful write bumps
/// it by one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    pub const ABSENT: Revision = Revision(0);

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A stored document body with its revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub revision: Revision,
    pub body: String,
}

/// Errors from repository operations.
///
/// Any of these means the caller's mutation was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("corrupted {what}")]
    Corruption { what: String },

    #[error("revision conflict on '{key}': expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: Revision,
        actual: Revision,
    },

    #[error("gave up updating '{key}' after {attempts} conflicting attempts")]
    RetriesExhausted { key: String, attempts: u32 },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Repository trait for persisting whole documents.
///
/// Writes replace the full body; there is no partial merge. A write either
/// lands completely with a new revision or not at all.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Get a document, returning None if it was never written.
    async fn get(&self, key: &str) -> Result<Option<StoredDocument>, RepositoryError>;

    /// Overwrite a document unconditionally. Returns the new revision.
    async fn put(&self, key: &str, body: String) -> Result<Revision, RepositoryError>;

    /// Overwrite a document only if its current revision is `expected`.
    ///
    /// `Revision::ABSENT` means "only if no document exists yet". On mismatch
    /// returns `RepositoryError::Conflict` carrying the actual revision.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Revision,
        body: String,
    ) -> Result<Revision, RepositoryError>;

    /// Keys of all stored documents.
    async fn keys(&self) -> Result<Vec<String>, RepositoryError>;
}

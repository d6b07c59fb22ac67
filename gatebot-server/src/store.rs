//! Typed document store over a `DocumentRepository`.
//!
//! The repository deals in opaque JSON bodies. `DocumentStore<D>` binds one
//! document type to its key and adds the read-modify-write loop every mutating
//! bot operation goes through.
//!
//! # Concurrency
//!
//! `update` holds a per-document writer lock while it loads, mutates and
//! commits, so two events in this process never interleave on the same
//! document. The commit itself is a revision compare-and-swap: if another
//! process (the operator CLI) wrote in between, the swap fails and the whole
//! mutation is re-run against a fresh load.

use std::marker::PhantomData;
use std::sync::Arc;

use gatebot_core::{ConfigDocument, UserDocument};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::repository::{DocumentRepository, RepositoryError, Revision};

/// Attempts `update` makes before giving up on a contended document.
pub const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// A document type persisted under a fixed key.
pub trait Document:
    Serialize + DeserializeOwned + Default + Clone + PartialEq + Send + Sync + 'static
{
    const KEY: &'static str;
}

impl Document for UserDocument {
    const KEY: &'static str = "users";
}

impl Document for ConfigDocument {
    const KEY: &'static str = "config";
}

/// A document together with the revision it was loaded at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<D> {
    pub revision: Revision,
    pub document: D,
}

pub struct DocumentStore<D: Document> {
    repo: Arc<dyn DocumentRepository>,
    write_lock: Arc<Mutex<()>>,
    _document: PhantomData<fn() -> D>,
}

// Not derived: a derive would require `D: Clone` on the PhantomData.
impl<D: Document> Clone for DocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            write_lock: self.write_lock.clone(),
            _document: PhantomData,
        }
    }
}

impl<D: Document> DocumentStore<D> {
    /// Create a store for `D` over `repo`.
    ///
    /// Clones share the writer lock. Create exactly one store per document per
    /// process and clone it, otherwise in-process writers only serialize
    /// through the revision check.
    pub fn new(repo: Arc<dyn DocumentRepository>) -> Self {
        Self {
            repo,
            write_lock: Arc::new(Mutex::new(())),
            _document: PhantomData,
        }
    }

    /// Load the current document, or the default one if none was written.
    pub async fn load(&self) -> Result<D, RepositoryError> {
        Ok(self.load_versioned().await?.document)
    }

    /// Load the current document with its revision.
    ///
    /// A missing document loads as `D::default()` at `Revision::ABSENT`.
    pub async fn load_versioned(&self) -> Result<Versioned<D>, RepositoryError> {
        match self.repo.get(D::KEY).await? {
            Some(stored) => {
                let document = serde_json::from_str(&stored.body).map_err(|e| {
                    RepositoryError::corruption(format!("{} document: {}", D::KEY, e))
                })?;
                Ok(Versioned {
                    revision: stored.revision,
                    document,
                })
            }
            None => Ok(Versioned {
                revision: Revision::ABSENT,
                document: D::default(),
            }),
        }
    }

    /// Overwrite the stored document unconditionally.
    pub async fn save(&self, document: &D) -> Result<Revision, RepositoryError> {
        let body = encode(document)?;
        self.repo.put(D::KEY, body).await
    }

    /// Write `versioned.document` only if the stored revision still equals
    /// `versioned.revision`.
    pub async fn compare_and_swap(&self, versioned: &Versioned<D>) -> Result<Revision, RepositoryError> {
        let body = encode(&versioned.document)?;
        self.repo
            .compare_and_swap(D::KEY, versioned.revision, body)
            .await
    }

    /// Load, apply `mutate`, and commit.
    ///
    /// `mutate` may run more than once when a concurrent writer gets in first,
    /// so it must only touch the document it is given. Its return value from
    /// the attempt that committed is returned. When the document comes out
    /// unchanged nothing is written.
    pub async fn update<R, F>(&self, mut mutate: F) -> Result<R, RepositoryError>
    where
        R: Send,
        F: FnMut(&mut D) -> R + Send,
    {
        let _guard = self.write_lock.lock().await;

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let Versioned { revision, document } = self.load_versioned().await?;
            let mut next = document.clone();
            let result = mutate(&mut next);

            if next == document {
                debug!("{} unchanged at {}, skipping write", D::KEY, revision);
                return Ok(result);
            }

            let committed = self
                .compare_and_swap(&Versioned {
                    revision,
                    document: next,
                })
                .await;

            match committed {
                Ok(new_revision) => {
                    debug!("{} committed {} -> {}", D::KEY, revision, new_revision);
                    return Ok(result);
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Concurrent write to {} (attempt {}/{}): {}",
                        D::KEY,
                        attempt,
                        MAX_UPDATE_ATTEMPTS,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(RepositoryError::RetriesExhausted {
            key: D::KEY.to_string(),
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }
}

fn encode<D: Document>(document: &D) -> Result<String, RepositoryError> {
    serde_json::to_string(document)
        .map_err(|e| RepositoryError::storage(format!("encode {}", D::KEY), e.to_string()))
}

//! In-memory implementation of `DocumentRepository`.
//!
//! All documents are held in memory and lost on restart. Used by tests and
//! for throwaway local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DocumentRepository, RepositoryError, Revision, StoredDocument};

/// In-memory document repository.
///
/// Stores documents in a `HashMap` protected by a `RwLock`. The write lock
/// makes compare-and-swap atomic.
pub struct InMemoryRepository {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<StoredDocument>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.get(key).cloned())
    }

    async fn put(&self, key: &str, body: String) -> Result<Revision, RepositoryError> {
        let mut documents = self.documents.write().await;
        let revision = documents
            .get(key)
            .map(|d| d.revision)
            .unwrap_or(Revision::ABSENT)
            .next();
        documents.insert(key.to_string(), StoredDocument { revision, body });
        Ok(revision)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Revision,
        body: String,
    ) -> Result<Revision, RepositoryError> {
        let mut documents = self.documents.write().await;
        let actual = documents
            .get(key)
            .map(|d| d.revision)
            .unwrap_or(Revision::ABSENT);

        if actual != expected {
            return Err(RepositoryError::Conflict {
                key: key.to_string(),
                expected,
                actual,
            });
        }

        let revision = actual.next();
        documents.insert(key.to_string(), StoredDocument { revision, body });
        Ok(revision)
    }

    async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut keys: Vec<String> = documents.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

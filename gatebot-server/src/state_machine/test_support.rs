//! Shared fixtures for state machine tests.

use std::sync::Arc;

use async_trait::async_trait;
use gatebot_core::{ChannelDescriptor, ConfigDocument, UserDocument, UserId};

use super::context::{BotContext, BotSettings};
use crate::repository::{
    DocumentRepository, InMemoryRepository, RepositoryError, Revision, StoredDocument,
};
use crate::store::DocumentStore;
use crate::transport::fakes::FakeOracle;

pub const ROOT_ADMIN: UserId = UserId(1000);
pub const REWARD_LINK: &str = "https://t.me/+reward";

/// A bot context over in-memory storage and a scripted oracle.
pub struct TestBot {
    pub ctx: BotContext,
    pub oracle: Arc<FakeOracle>,
}

impl TestBot {
    pub async fn new() -> Self {
        Self::over(Arc::new(InMemoryRepository::new()))
    }

    /// A context whose every storage call fails.
    pub async fn failing() -> Self {
        Self::over(Arc::new(BrokenRepository))
    }

    fn over(repo: Arc<dyn DocumentRepository>) -> Self {
        let oracle = Arc::new(FakeOracle::new());
        let ctx = BotContext {
            users: DocumentStore::new(repo.clone()),
            config: DocumentStore::new(repo),
            oracle: oracle.clone(),
            settings: BotSettings {
                root_admin: ROOT_ADMIN,
                reward_link: REWARD_LINK.to_string(),
                bot_username: "test_gate_bot".to_string(),
            },
        };
        Self { ctx, oracle }
    }

    pub async fn add_channel(&self, name: &str, id: &str) {
        let channel = ChannelDescriptor {
            name: name.to_string(),
            link: format!("https://t.me/{}", name.to_lowercase()),
            external_chat_id: id.to_string(),
        };
        self.ctx
            .config
            .update(|config| config.channels.push(channel.clone()))
            .await
            .unwrap();
    }

    pub async fn users(&self) -> UserDocument {
        self.ctx.users.load().await.unwrap()
    }

    pub async fn config(&self) -> ConfigDocument {
        self.ctx.config.load().await.unwrap()
    }
}

struct BrokenRepository;

#[async_trait]
impl DocumentRepository for BrokenRepository {
    async fn get(&self, _key: &str) -> Result<Option<StoredDocument>, RepositoryError> {
        Err(RepositoryError::storage("get", "disk unavailable"))
    }

    async fn put(&self, _key: &str, _body: String) -> Result<Revision, RepositoryError> {
        Err(RepositoryError::storage("put", "disk unavailable"))
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Revision,
        _body: String,
    ) -> Result<Revision, RepositoryError> {
        Err(RepositoryError::storage("compare_and_swap", "disk unavailable"))
    }

    async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        Err(RepositoryError::storage("keys", "disk unavailable"))
    }
}

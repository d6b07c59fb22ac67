//! Per-user session store and event entry point.

use std::collections::HashMap;
use std::sync::Arc;

use gatebot_core::UserId;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::context::BotContext;
use super::event::Event;
use super::interpreter::Interpreter;
use super::state::Session;
use super::{admin, onboarding};

/// In-memory sessions, one per user.
///
/// # Concurrency
///
/// Events for the same user are serialized by a per-user lock held for the
/// whole transition, so a session is never read and written by two events at
/// once. Events for different users run concurrently; their writes to the
/// shared documents are serialized by the document store.
pub struct SessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
    user_locks: RwLock<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            user_locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user: UserId) -> Option<Session> {
        self.sessions.read().await.get(&user).cloned()
    }

    async fn set(&self, user: UserId, session: Session) {
        let mut sessions = self.sessions.write().await;
        if session == Session::default() {
            sessions.remove(&user);
        } else {
            sessions.insert(user, session);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn lock_for(&self, user: UserId) -> Arc<Mutex<()>> {
        {
            let locks = self.user_locks.read().await;
            if let Some(lock) = locks.get(&user) {
                return lock.clone();
            }
        }

        let mut locks = self.user_locks.write().await;
        locks
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget `user`'s lock once no other event holds or awaits it.
    async fn release_lock(&self, user: UserId, lock: Arc<Mutex<()>>) {
        let mut locks = self.user_locks.write().await;
        // Only the map and `lock` itself reference it. Our reference is
        // dropped under the map lock so the next releaser sees an exact count.
        let unused = Arc::strong_count(&lock) == 2;
        drop(lock);
        if unused {
            locks.remove(&user);
        }
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.user_locks.read().await.len()
    }

    /// Run one event through the matching machine, execute its effects and
    /// store the resulting session.
    pub async fn process_event(
        &self,
        ctx: &BotContext,
        interpreter: &Interpreter,
        event: Event,
    ) -> Session {
        let user = event.user();
        let lock = self.lock_for(user).await;
        let guard = lock.lock().await;

        let session = self.get(user).await.unwrap_or_default();
        info!(
            "Processing {} for user {} in {:?}",
            event.log_summary(),
            user,
            session
        );

        let (session, effects) = if event.is_admin() {
            let transition = admin::handle(ctx, session.admin, &event).await;
            (
                Session {
                    admin: transition.state,
                    ..session
                },
                transition.effects,
            )
        } else {
            let transition = onboarding::handle(ctx, session.onboarding, &event).await;
            (
                Session {
                    onboarding: transition.state,
                    ..session
                },
                transition.effects,
            )
        };

        interpreter.execute_effects(effects).await;
        self.set(user, session.clone()).await;

        drop(guard);
        self.release_lock(user, lock).await;
        session
    }
}

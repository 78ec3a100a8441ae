//! Token-to-user lookup kept in memory.
//!
//! Account management is not part of the forum core. This provider only
//! exists so the backend has something to resolve tokens against.

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{DomainError, Result, SessionProvider, User, UserId};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemorySessions {
    tokens: DashMap<String, UserId>,
    users: DashMap<UserId, User>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Issues a fresh opaque token for a registered user.
    pub fn open_session(&self, user_id: UserId) -> Result<String> {
        if !self.users.contains_key(&user_id) {
            return Err(DomainError::NotFound { kind: "user", id: user_id.to_string() });
        }
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user_id);
        debug!(user = %user_id, "session opened");
        Ok(token)
    }

    /// Replaces the stored account, e.g. after a ban was issued.
    pub fn update_user(&self, user: User) -> Result<()> {
        match self.users.get_mut(&user.id) {
            Some(mut stored) => {
                *stored = user;
                Ok(())
            }
            None => Err(DomainError::NotFound { kind: "user", id: user.id.to_string() }),
        }
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

#[async_trait]
impl SessionProvider for InMemorySessions {
    async fn user_by_token(&self, token: &str) -> Result<Option<User>> {
        let Some(user_id) = self.tokens.get(token).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }
}

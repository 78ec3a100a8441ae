//! Forum creation and freezing.

use crate::guards::{require_forum_admin, require_not_banned};
use domains::{
    Clock, DomainError, Forum, ForumId, ForumRepository, ForumType, Result, User,
};
use std::sync::Arc;
use tracing::info;

pub struct ForumService {
    forums: Arc<dyn ForumRepository>,
    clock: Arc<dyn Clock>,
    max_name_length: usize,
    max_ban_count: u32,
}

impl ForumService {
    pub fn new(
        forums: Arc<dyn ForumRepository>,
        clock: Arc<dyn Clock>,
        max_name_length: usize,
        max_ban_count: u32,
    ) -> Self {
        Self { forums, clock, max_name_length, max_ban_count }
    }

    /// Creates a forum owned by `owner`. Names are trimmed and must be unique.
    #[tracing::instrument(skip(self, owner), fields(user = %owner.id))]
    pub async fn create_forum(&self, owner: &User, name: &str, forum_type: ForumType) -> Result<Forum> {
        let now = self.clock.now();
        require_not_banned(owner, now, self.max_ban_count)?;

        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("forum name must not be empty".into()));
        }
        if name.chars().count() > self.max_name_length {
            return Err(DomainError::Validation(format!(
                "forum name exceeds {} characters",
                self.max_name_length
            )));
        }

        let forum = Forum {
            id: ForumId::new(),
            forum_type,
            name: name.to_string(),
            owner: owner.id,
            created_at: now,
            readonly: false,
        };
        self.forums.create_forum(forum.clone()).await?;
        info!(forum = %forum.id, forum_type = forum_type.as_str(), "forum created");
        Ok(forum)
    }

    /// Freezes or thaws a forum. Owner and superusers only.
    #[tracing::instrument(skip(self, requester), fields(user = %requester.id))]
    pub async fn set_readonly(&self, requester: &User, forum_id: ForumId, readonly: bool) -> Result<Forum> {
        let mut forum = self
            .forums
            .get_forum(forum_id)
            .await?
            .ok_or_else(|| DomainError::forum_not_found(forum_id))?;
        require_forum_admin(requester, &forum)?;

        self.forums.set_forum_readonly(forum_id, readonly).await?;
        forum.readonly = readonly;
        info!(forum = %forum_id, readonly, "forum read-only flag changed");
        Ok(forum)
    }
}

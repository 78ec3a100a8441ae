//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be used by the services.
//! Every write method on a repository is one atomic unit: it either applies
//! completely or fails with `DomainError::Persistence` having changed nothing.

use crate::errors::Result;
use crate::history::HistoryChange;
use crate::ids::{ForumId, MessageId, TreeId, UserId};
use crate::models::{Forum, MessageItem, MessageTree, Rating, RatingSummary, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Resolves session tokens into users. Token issuance lives elsewhere.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn user_by_token(&self, token: &str) -> Result<Option<User>>;
}

/// Forum persistence. Doubles as the read-only forum lookup used by the engines.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ForumRepository: Send + Sync {
    async fn get_forum(&self, id: ForumId) -> Result<Option<Forum>>;

    /// Fails with `DomainError::Conflict` when the name is taken.
    async fn create_forum(&self, forum: Forum) -> Result<()>;

    async fn set_forum_readonly(&self, id: ForumId, readonly: bool) -> Result<()>;
}

/// Tree, message and history persistence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn get_message(&self, id: MessageId) -> Result<Option<MessageItem>>;
    async fn get_tree(&self, id: TreeId) -> Result<Option<MessageTree>>;

    /// Every message of the tree, root included, in creation order.
    async fn tree_messages(&self, id: TreeId) -> Result<Vec<MessageItem>>;

    async fn list_trees(&self, forum_id: ForumId) -> Result<Vec<MessageTree>>;

    /// Tree row, root message, first history item and tags together.
    async fn create_tree(&self, tree: MessageTree, root: MessageItem) -> Result<()>;

    /// Comment row plus first history item; also links it under its parent.
    async fn create_comment(&self, comment: MessageItem) -> Result<()>;

    async fn apply_history(
        &self,
        id: MessageId,
        change: HistoryChange,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Removes the tree and every message, version and rating in it.
    async fn delete_tree(&self, id: TreeId) -> Result<()>;

    /// Removes a single comment. Callers guarantee it has no comments of its own.
    async fn delete_message(&self, id: MessageId) -> Result<()>;

    /// Creates `tree` with `message_id` as its root, detaching the message
    /// and its whole subtree from the old tree.
    async fn split_branch(&self, message_id: MessageId, tree: MessageTree) -> Result<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Inserts or replaces the rating of `(message, user)`.
    async fn upsert_rating(&self, rating: Rating) -> Result<()>;

    /// Returns whether a rating existed.
    async fn delete_rating(&self, message_id: MessageId, user_id: UserId) -> Result<bool>;

    async fn ratings_for(&self, message_id: MessageId) -> Result<Vec<Rating>>;

    /// Summaries for a batch of messages. Unrated messages may be absent.
    async fn rating_summaries(
        &self,
        message_ids: Vec<MessageId>,
    ) -> Result<HashMap<MessageId, RatingSummary>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

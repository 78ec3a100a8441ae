//! Shared wiring: the port handles and the tunables every engine reads.

use domains::{
    Clock, DomainError, Forum, ForumRepository, MessageId, MessageItem, MessageRepository,
    MessageTree, Page, RatingRepository, Result, SessionProvider,
};
use std::sync::Arc;

/// Adapter handles. Cloning is cheap.
#[derive(Clone)]
pub struct Ports {
    pub sessions: Arc<dyn SessionProvider>,
    pub forums: Arc<dyn ForumRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub ratings: Arc<dyn RatingRepository>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Number of bans after which a user stays banned for good.
    pub max_ban_count: u32,
    pub default_page: Page,
    pub max_forum_name_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ban_count: 3,
            default_page: Page { offset: 0, limit: 20 },
            max_forum_name_length: 128,
        }
    }
}

/// A message together with the tree and forum it currently belongs to.
#[derive(Debug, Clone)]
pub(crate) struct Located {
    pub message: MessageItem,
    pub tree: MessageTree,
    pub forum: Forum,
}

pub(crate) async fn locate(
    messages: &dyn MessageRepository,
    forums: &dyn ForumRepository,
    id: MessageId,
) -> Result<Located> {
    let message = messages
        .get_message(id)
        .await?
        .ok_or_else(|| DomainError::message_not_found(id))?;
    let tree = messages
        .get_tree(message.tree_id)
        .await?
        .ok_or_else(|| DomainError::tree_not_found(message.tree_id))?;
    let forum = forums
        .get_forum(tree.forum_id)
        .await?
        .ok_or_else(|| DomainError::forum_not_found(tree.forum_id))?;
    Ok(Located { message, tree, forum })
}

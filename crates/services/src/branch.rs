//! # BranchSplitter
//!
//! Turns an existing comment into the root of a new tree in the same forum.
//! The comment moves with its whole subtree, history and ratings; nothing
//! is copied.

use crate::context::{locate, Located};
use crate::guards::{require_forum_owner, require_not_readonly};
use crate::moderation::WriteResponse;
use domains::{
    Clock, DomainError, ForumRepository, MessageId, MessageRepository, MessageTree, Priority,
    Result, TreeId, User,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBranch {
    pub subject: String,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
}

pub struct BranchSplitter {
    forums: Arc<dyn ForumRepository>,
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl BranchSplitter {
    pub fn new(
        forums: Arc<dyn ForumRepository>,
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { forums, messages, clock }
    }

    /// Splits `message_id` off into its own tree. Only the forum owner may split.
    #[tracing::instrument(skip(self, requester, branch), fields(user = %requester.id))]
    pub async fn split_branch(
        &self,
        requester: &User,
        message_id: MessageId,
        branch: NewBranch,
    ) -> Result<WriteResponse> {
        let Located { message, tree: old_tree, forum } =
            locate(self.messages.as_ref(), self.forums.as_ref(), message_id).await?;

        require_forum_owner(requester, &forum)?;
        require_not_readonly(&forum)?;
        if message.is_root() {
            return Err(DomainError::MessageAlreadyBranch(message_id));
        }

        let tree = MessageTree {
            id: TreeId::new(),
            forum_id: forum.id,
            subject: branch.subject,
            root_id: message_id,
            priority: branch.priority,
            tags: branch.tags,
            created_at: self.clock.now(),
        };
        let tree_id = tree.id;

        self.messages.split_branch(message_id, tree).await?;
        info!(message = %message_id, from = %old_tree.id, to = %tree_id, "branch split");
        Ok(WriteResponse { id: message_id, tree_id, state: message.state() })
    }
}

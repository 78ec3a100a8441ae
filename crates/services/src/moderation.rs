//! # ModerationEngine
//!
//! Decides the publication state of new content and edits, and applies the
//! forum owner's publish/reject decisions.
//!
//! Per-message state machine, tracked on the newest history item:
//!
//! ```text
//! UNPUBLISHED --YES--> PUBLISHED
//! UNPUBLISHED --NO---> previous version | message deleted | tree deleted
//! PUBLISHED --edit--> UNPUBLISHED   (moderated forum, editor is not the owner)
//! PUBLISHED --edit--> PUBLISHED     (unmoderated forum, or forum owner)
//! ```

use crate::context::{locate, Located};
use crate::guards::{
    require_forum_owner, require_not_banned, require_not_readonly, require_owner,
};
use chrono::{DateTime, Utc};
use domains::{
    Clock, Decision, DomainError, Forum, ForumId, ForumRepository, ForumType, History,
    HistoryChange, HistoryItem, MessageId, MessageItem, MessageRepository, MessageTree,
    Priority, PublicationState, Result, TreeId, User, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Result of a successful write: the message touched and its resulting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: MessageId,
    pub tree_id: TreeId,
    pub state: PublicationState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Published { id: MessageId },
    /// A pending edit was dropped; the previous version is current again.
    Reverted { id: MessageId, state: PublicationState },
    MessageDeleted { id: MessageId },
    TreeDeleted { id: TreeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "deleted", rename_all = "snake_case")]
pub enum Deletion {
    Message { id: MessageId },
    Tree { id: TreeId },
}

/// State a fresh message or comment starts in.
///
/// Unmoderated forums publish immediately; in a moderated forum only the
/// owner's own content skips the queue.
pub fn state_for_new_content(forum: &Forum, author: UserId) -> PublicationState {
    if forum.forum_type == ForumType::Unmoderated || forum.is_owned_by(author) {
        PublicationState::Published
    } else {
        PublicationState::Unpublished
    }
}

/// A pending history change produced by an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub item: HistoryItem,
    /// `true` when the edit grows the history instead of replacing its head.
    pub appended: bool,
}

impl Edit {
    /// Plans an edit of `history`.
    ///
    /// A published head is kept and the edit is pushed in front of it; a
    /// pending head is overwritten and stays pending.
    pub fn plan(
        history: &History,
        forum: &Forum,
        editor: UserId,
        body: String,
        now: DateTime<Utc>,
    ) -> Self {
        match history.latest_state() {
            PublicationState::Published => Self {
                item: HistoryItem::new(body, state_for_new_content(forum, editor), now),
                appended: true,
            },
            PublicationState::Unpublished | PublicationState::Rejected => Self {
                item: HistoryItem::new(body, PublicationState::Unpublished, now),
                appended: false,
            },
        }
    }

    pub fn into_change(self) -> HistoryChange {
        if self.appended {
            HistoryChange::Append(self.item)
        } else {
            HistoryChange::OverwriteLatest(self.item)
        }
    }
}

pub struct ModerationEngine {
    forums: Arc<dyn ForumRepository>,
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
    max_ban_count: u32,
}

impl ModerationEngine {
    pub fn new(
        forums: Arc<dyn ForumRepository>,
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
        max_ban_count: u32,
    ) -> Self {
        Self { forums, messages, clock, max_ban_count }
    }

    /// Starts a new tree in `forum_id` with its root message.
    #[tracing::instrument(skip(self, creator, message), fields(user = %creator.id))]
    pub async fn create_message(
        &self,
        creator: &User,
        forum_id: ForumId,
        message: NewMessage,
    ) -> Result<WriteResponse> {
        let forum = self
            .forums
            .get_forum(forum_id)
            .await?
            .ok_or_else(|| DomainError::forum_not_found(forum_id))?;
        let now = self.clock.now();

        require_not_banned(creator, now, self.max_ban_count)?;
        require_not_readonly(&forum)?;

        let state = state_for_new_content(&forum, creator.id);
        let tree_id = TreeId::new();
        let root = MessageItem {
            id: MessageId::new(),
            owner: creator.id,
            parent_id: None,
            tree_id,
            history: History::new(HistoryItem::new(message.body, state, now)),
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let tree = MessageTree {
            id: tree_id,
            forum_id,
            subject: message.subject,
            root_id: root.id,
            priority: message.priority,
            tags: message.tags,
            created_at: now,
        };
        let response = WriteResponse { id: root.id, tree_id, state };

        self.messages.create_tree(tree, root).await?;
        info!(tree = %tree_id, message = %response.id, state = state.as_str(), "message tree created");
        Ok(response)
    }

    /// Adds a comment under `parent_id`. The parent's newest version must be published.
    #[tracing::instrument(skip(self, creator, body), fields(user = %creator.id))]
    pub async fn create_comment(
        &self,
        creator: &User,
        parent_id: MessageId,
        body: String,
    ) -> Result<WriteResponse> {
        let Located { message: parent, forum, .. } =
            locate(self.messages.as_ref(), self.forums.as_ref(), parent_id).await?;
        let now = self.clock.now();

        require_not_banned(creator, now, self.max_ban_count)?;
        if parent.state() != PublicationState::Published {
            return Err(DomainError::MessageNotPublished(parent.id));
        }
        require_not_readonly(&forum)?;

        let state = state_for_new_content(&forum, creator.id);
        let comment = MessageItem {
            id: MessageId::new(),
            owner: creator.id,
            parent_id: Some(parent.id),
            tree_id: parent.tree_id,
            history: History::new(HistoryItem::new(body, state, now)),
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let response = WriteResponse { id: comment.id, tree_id: comment.tree_id, state };

        self.messages.create_comment(comment).await?;
        info!(parent = %parent_id, message = %response.id, state = state.as_str(), "comment created");
        Ok(response)
    }

    /// Edits the author's own message or comment.
    #[tracing::instrument(skip(self, requester, body), fields(user = %requester.id))]
    pub async fn edit_content(
        &self,
        requester: &User,
        message_id: MessageId,
        body: String,
    ) -> Result<WriteResponse> {
        let Located { message, forum, .. } =
            locate(self.messages.as_ref(), self.forums.as_ref(), message_id).await?;

        require_owner(requester, &message)?;
        require_not_readonly(&forum)?;

        let now = self.clock.now();
        let edit = Edit::plan(&message.history, &forum, requester.id, body, now);
        let (state, appended) = (edit.item.state, edit.appended);

        self.messages.apply_history(message_id, edit.into_change(), now).await?;
        info!(message = %message_id, state = state.as_str(), appended, "message edited");
        Ok(WriteResponse { id: message_id, tree_id: message.tree_id, state })
    }

    /// Applies the forum owner's verdict on a pending version.
    #[tracing::instrument(skip(self, moderator), fields(user = %moderator.id))]
    pub async fn decide(
        &self,
        moderator: &User,
        message_id: MessageId,
        decision: Decision,
    ) -> Result<DecisionOutcome> {
        let Located { message, tree, forum } =
            locate(self.messages.as_ref(), self.forums.as_ref(), message_id).await?;

        require_forum_owner(moderator, &forum)?;
        if message.state() == PublicationState::Published {
            return Err(DomainError::MessageAlreadyPublished(message_id));
        }

        let now = self.clock.now();
        let outcome = match decision {
            Decision::Yes => {
                self.messages
                    .apply_history(
                        message_id,
                        HistoryChange::SetLatestState(PublicationState::Published),
                        now,
                    )
                    .await?;
                DecisionOutcome::Published { id: message_id }
            }
            Decision::No if message.history.len() > 1 => {
                let previous = message.history.versions()[1].state;
                self.messages
                    .apply_history(message_id, HistoryChange::DiscardLatest, now)
                    .await?;
                DecisionOutcome::Reverted { id: message_id, state: previous }
            }
            Decision::No if message.is_root() => {
                self.messages.delete_tree(tree.id).await?;
                DecisionOutcome::TreeDeleted { id: tree.id }
            }
            Decision::No => {
                if message.has_comments() {
                    return Err(DomainError::MessageHasComments(message_id));
                }
                self.messages.delete_message(message_id).await?;
                DecisionOutcome::MessageDeleted { id: message_id }
            }
        };

        info!(message = %message_id, ?decision, ?outcome, "moderation decision applied");
        Ok(outcome)
    }

    /// Deletes the author's own childless message; a root takes its tree with it.
    #[tracing::instrument(skip(self, requester), fields(user = %requester.id))]
    pub async fn delete_message(&self, requester: &User, message_id: MessageId) -> Result<Deletion> {
        let Located { message, tree, forum } =
            locate(self.messages.as_ref(), self.forums.as_ref(), message_id).await?;

        require_owner(requester, &message)?;
        require_not_readonly(&forum)?;
        if message.has_comments() {
            return Err(DomainError::MessageHasComments(message_id));
        }

        let deletion = if message.is_root() {
            self.messages.delete_tree(tree.id).await?;
            Deletion::Tree { id: tree.id }
        } else {
            self.messages.delete_message(message_id).await?;
            Deletion::Message { id: message_id }
        };
        info!(message = %message_id, ?deletion, "message deleted");
        Ok(deletion)
    }
}

//! Read models returned by tree queries.

use crate::history::{HistoryItem, PublicationState};
use crate::ids::{ForumId, MessageId, TreeId, UserId};
use crate::models::{Priority, RatingSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Order {
    /// Highest average rating first, ties by ascending id.
    Rating,
    /// Oldest first.
    #[default]
    Date,
}

/// What to include when materializing a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeQuery {
    pub order: Order,
    pub include_comments: bool,
    pub include_all_versions: bool,
    pub include_unpublished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionView {
    pub body: String,
    pub state: PublicationState,
    pub created_at: DateTime<Utc>,
}

impl From<&HistoryItem> for VersionView {
    fn from(item: &HistoryItem) -> Self {
        Self { body: item.body.clone(), state: item.state, created_at: item.created_at }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub owner: UserId,
    pub parent_id: Option<MessageId>,
    /// State of the newest stored version, whether or not it is shown.
    pub state: PublicationState,
    /// Newest first.
    pub versions: Vec<VersionView>,
    pub rating: RatingSummary,
    pub comments: Vec<MessageView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageView {
    /// Depth-first walk over this message and every comment below it.
    pub fn walk(&self) -> Vec<&MessageView> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(view) = stack.pop() {
            out.push(view);
            stack.extend(view.comments.iter().rev());
        }
        out
    }
}

/// Comment chains can be arbitrarily deep; tear them down without recursion.
impl Drop for MessageView {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.comments);
        while let Some(mut comment) = pending.pop() {
            pending.append(&mut comment.comments);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeView {
    pub id: TreeId,
    pub forum_id: ForumId,
    pub subject: String,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub root: MessageView,
}

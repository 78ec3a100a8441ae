//! Request shapes accepted by [`ForumBackend`](crate::ForumBackend).
//!
//! Field formats are validated upstream; the engines only enforce business rules.

use domains::{Decision, ForumId, ForumType, MessageId, Order, Priority, TreeQuery};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateForumRequest {
    pub name: String,
    pub forum_type: ForumType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub forum_id: ForumId,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub parent_id: MessageId,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditMessageRequest {
    pub message_id: MessageId,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub message_id: MessageId,
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitBranchRequest {
    pub message_id: MessageId,
    pub subject: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// `value: None` withdraws an earlier rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRequest {
    pub message_id: MessageId,
    pub value: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTreesRequest {
    #[serde(default)]
    pub order: Order,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    #[serde(default)]
    pub include_comments: bool,
    #[serde(default)]
    pub include_all_versions: bool,
    #[serde(default)]
    pub include_unpublished: bool,
}

impl ListTreesRequest {
    pub fn query(&self) -> TreeQuery {
        TreeQuery {
            order: self.order,
            include_comments: self.include_comments,
            include_all_versions: self.include_all_versions,
            include_unpublished: self.include_unpublished,
        }
    }
}

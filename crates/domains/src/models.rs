//! # Domain Models
//!
//! These structs represent the core entities of the forum engine.
//! Messages form a tree but are stored as a flat arena: each item carries
//! its `parent_id` and `tree_id` instead of references to other items.

use crate::history::{History, PublicationState};
use crate::ids::{ForumId, MessageId, TreeId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    User,
    Superuser,
}

/// An account as seen by the core. Owned by the session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub banned_until: Option<DateTime<Utc>>,
    pub ban_count: u32,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            role: UserRole::User,
            banned_until: None,
            ban_count: 0,
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.role == UserRole::Superuser
    }

    /// A temporary ban lasts until `banned_until`; reaching `max_ban_count`
    /// bans makes it permanent.
    pub fn is_banned_at(&self, now: DateTime<Utc>, max_ban_count: u32) -> bool {
        if self.ban_count >= max_ban_count {
            return true;
        }
        matches!(self.banned_until, Some(until) if until > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForumType {
    Unmoderated,
    Moderated,
    ReadOnly,
}

impl ForumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmoderated => "UNMODERATED",
            Self::Moderated => "MODERATED",
            Self::ReadOnly => "READ_ONLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNMODERATED" => Some(Self::Unmoderated),
            "MODERATED" => Some(Self::Moderated),
            "READ_ONLY" => Some(Self::ReadOnly),
            _ => None,
        }
    }
}

/// A named forum. `owner` and `forum_type` never change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forum {
    pub id: ForumId,
    pub forum_type: ForumType,
    pub name: String,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    /// Freezes the forum: no new messages, comments or edits.
    pub readonly: bool,
}

impl Forum {
    pub fn is_read_only(&self) -> bool {
        self.readonly || self.forum_type == ForumType::ReadOnly
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(Self::Normal),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

/// One top-level message and the comments under it. The unit of deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTree {
    pub id: TreeId,
    pub forum_id: ForumId,
    pub subject: String,
    pub root_id: MessageId,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// A root message or a comment, stored flat in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: MessageId,
    pub owner: UserId,
    /// `None` exactly when this item is the root of its tree.
    pub parent_id: Option<MessageId>,
    pub tree_id: TreeId,
    pub history: History,
    /// Direct comments in creation order.
    pub children: Vec<MessageId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageItem {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn has_comments(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn state(&self) -> PublicationState {
        self.history.latest_state()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Yes,
    No,
}

/// A score in `1..=5`. Construction is the only validation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct RatingValue(u8);

impl RatingValue {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 5;

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for RatingValue {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(format!("rating must be between {} and {}, got {value}", Self::MIN, Self::MAX))
        }
    }
}

impl From<RatingValue> for i32 {
    fn from(value: RatingValue) -> Self {
        i32::from(value.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub value: RatingValue,
}

/// Average and count of all ratings of one message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u64,
}

impl RatingSummary {
    pub fn from_values<I: IntoIterator<Item = RatingValue>>(values: I) -> Self {
        let (sum, count) = values
            .into_iter()
            .fold((0u64, 0u64), |(sum, count), v| (sum + u64::from(v.get()), count + 1));
        if count == 0 {
            return Self::default();
        }
        Self { average: sum as f64 / count as f64, count }
    }
}

/// A resolved pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    /// Fills whichever side the caller left out from `defaults`.
    pub fn resolve(offset: Option<u64>, limit: Option<u64>, defaults: Page) -> Self {
        Self {
            offset: offset.unwrap_or(defaults.offset),
            limit: limit.unwrap_or(defaults.limit),
        }
    }
}

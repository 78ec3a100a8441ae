//! # Message history
//!
//! Each message keeps an ordered log of versions, newest first. Only the
//! head (index 0) may change: a pending edit is overwritten in place, a
//! moderator may flip its state, and a rejected pending edit is dropped.
//! Everything behind the head is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationState {
    Published,
    Unpublished,
    /// Reserved bookkeeping value; no built-in flow produces it.
    Rejected,
}

impl PublicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "PUBLISHED",
            Self::Unpublished => "UNPUBLISHED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PUBLISHED" => Some(Self::Published),
            "UNPUBLISHED" => Some(Self::Unpublished),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One versioned body + state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub body: String,
    pub state: PublicationState,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    pub fn new(body: impl Into<String>, state: PublicationState, created_at: DateTime<Utc>) -> Self {
        Self { body: body.into(), state, created_at }
    }
}

/// A mutation of the history head, applied as one atomic unit by storage.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryChange {
    /// Push a new head; the previous head becomes immutable.
    Append(HistoryItem),
    /// Replace the pending head in place; length is unchanged.
    OverwriteLatest(HistoryItem),
    SetLatestState(PublicationState),
    /// Drop the head, reverting to the previous version.
    DiscardLatest,
}

/// Error raised when a change would leave the log without any version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastVersion;

/// Newest-first version log. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<HistoryItem>", into = "Vec<HistoryItem>")]
pub struct History {
    items: Vec<HistoryItem>,
}

impl TryFrom<Vec<HistoryItem>> for History {
    type Error = String;

    fn try_from(items: Vec<HistoryItem>) -> Result<Self, Self::Error> {
        Self::from_newest_first(items).ok_or_else(|| "history needs at least one version".to_string())
    }
}

impl From<History> for Vec<HistoryItem> {
    fn from(history: History) -> Self {
        history.items
    }
}

impl History {
    pub fn new(first: HistoryItem) -> Self {
        Self { items: vec![first] }
    }

    /// Rebuilds a log from storage rows already ordered newest-first.
    /// Returns `None` for an empty row set.
    pub fn from_newest_first(items: Vec<HistoryItem>) -> Option<Self> {
        if items.is_empty() {
            None
        } else {
            Some(Self { items })
        }
    }

    pub fn latest(&self) -> &HistoryItem {
        &self.items[0]
    }

    pub fn latest_state(&self) -> PublicationState {
        self.latest().state
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All versions, newest first.
    pub fn versions(&self) -> &[HistoryItem] {
        &self.items
    }

    /// The newest version a reader without moderation rights may see.
    pub fn latest_published(&self) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.state == PublicationState::Published)
    }

    pub fn push(&mut self, item: HistoryItem) {
        self.items.insert(0, item);
    }

    /// Replaces the head's body. The head always ends up `Unpublished`.
    pub fn overwrite_latest(&mut self, body: impl Into<String>, now: DateTime<Utc>) {
        self.items[0] = HistoryItem::new(body, PublicationState::Unpublished, now);
    }

    pub fn set_latest_state(&mut self, state: PublicationState) {
        self.items[0].state = state;
    }

    pub fn discard_latest(&mut self) -> Result<HistoryItem, LastVersion> {
        if self.items.len() == 1 {
            return Err(LastVersion);
        }
        Ok(self.items.remove(0))
    }

    pub fn apply(&mut self, change: HistoryChange) -> Result<(), LastVersion> {
        match change {
            HistoryChange::Append(item) => self.push(item),
            HistoryChange::OverwriteLatest(item) => self.items[0] = item,
            HistoryChange::SetLatestState(state) => self.set_latest_state(state),
            HistoryChange::DiscardLatest => {
                self.discard_latest()?;
            }
        }
        Ok(())
    }
}

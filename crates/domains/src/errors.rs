//! # DomainError
//!
//! Centralized error handling for the forum core.
//! Every business-rule violation names the entity it was raised for, so the
//! caller can surface it verbatim. None of these are retried by the core.

use crate::ids::{ForumId, MessageId, TreeId, UserId};
use thiserror::Error;

/// The primary error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// No session, or the session token does not resolve to a user.
    #[error("authentication required")]
    Auth,

    /// Resource not found (e.g., Forum, Tree, Message)
    #[error("{kind} not found with ID {id}")]
    NotFound { kind: &'static str, id: String },

    /// Role or ownership mismatch.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("forum {0} is read-only")]
    ForumReadOnly(ForumId),

    #[error("user {0} is banned")]
    UserBanned(UserId),

    #[error("message {0} is not published")]
    MessageNotPublished(MessageId),

    #[error("message {0} is already published")]
    MessageAlreadyPublished(MessageId),

    #[error("message {0} is already the root of a tree")]
    MessageAlreadyBranch(MessageId),

    #[error("message {0} has comments")]
    MessageHasComments(MessageId),

    #[error("user {user} cannot rate own message {message}")]
    SelfRating { user: UserId, message: MessageId },

    /// Input rejected before reaching the engine (e.g., forum name too long).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource already exists (e.g., duplicate forum name)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure. The atomic unit was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl DomainError {
    pub fn forum_not_found(id: ForumId) -> Self {
        Self::NotFound { kind: "forum", id: id.to_string() }
    }

    pub fn tree_not_found(id: TreeId) -> Self {
        Self::NotFound { kind: "tree", id: id.to_string() }
    }

    pub fn message_not_found(id: MessageId) -> Self {
        Self::NotFound { kind: "message", id: id.to_string() }
    }

    /// Wraps an adapter failure. Used as `.map_err(DomainError::persistence)`.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// `true` for rule violations the caller caused, as opposed to
    /// infrastructure failures.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}

/// A specialized Result type for forum-core logic.
pub type Result<T> = std::result::Result<T, DomainError>;

//! Guard predicates shared by every write operation.
//!
//! Each guard is a plain function returning `Ok(())` or the error to
//! surface. Operations call the guards they need explicitly, in order.

use chrono::{DateTime, Utc};
use domains::{DomainError, Forum, MessageItem, Result, User};

/// The requester must be the author of `message`.
pub fn require_owner(user: &User, message: &MessageItem) -> Result<()> {
    if message.owner != user.id {
        return Err(DomainError::Forbidden(format!(
            "user {} does not own message {}",
            user.id, message.id
        )));
    }
    Ok(())
}

/// The requester must own the forum (the forum's moderator).
pub fn require_forum_owner(user: &User, forum: &Forum) -> Result<()> {
    if !forum.is_owned_by(user.id) {
        return Err(DomainError::Forbidden(format!(
            "user {} does not own forum {}",
            user.id, forum.id
        )));
    }
    Ok(())
}

/// Forum owner or superuser.
pub fn require_forum_admin(user: &User, forum: &Forum) -> Result<()> {
    if user.is_superuser() {
        return Ok(());
    }
    require_forum_owner(user, forum)
}

pub fn require_not_readonly(forum: &Forum) -> Result<()> {
    if forum.is_read_only() {
        return Err(DomainError::ForumReadOnly(forum.id));
    }
    Ok(())
}

pub fn require_not_banned(user: &User, now: DateTime<Utc>, max_ban_count: u32) -> Result<()> {
    if user.is_banned_at(now, max_ban_count) {
        return Err(DomainError::UserBanned(user.id));
    }
    Ok(())
}

//! # In-memory store
//!
//! Trees, messages, history and ratings live in a single arena behind one
//! `RwLock`. Each port method takes the lock exactly once, which makes every
//! call an atomic unit: readers never observe a half-applied split or cascade.
//! Forums sit in a `DashMap` with a second map enforcing unique names.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{
    DomainError, Forum, ForumId, ForumRepository, HistoryChange, MessageId, MessageItem,
    MessageRepository, MessageTree, Rating, RatingRepository, RatingSummary, RatingValue,
    Result, TreeId, UserId,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Arena {
    trees: HashMap<TreeId, MessageTree>,
    messages: HashMap<MessageId, MessageItem>,
    ratings: HashMap<MessageId, HashMap<UserId, RatingValue>>,
}

impl Arena {
    fn message_mut(&mut self, id: MessageId) -> Result<&mut MessageItem> {
        self.messages
            .get_mut(&id)
            .ok_or_else(|| DomainError::message_not_found(id))
    }

    /// `root` and every message below it, breadth first.
    fn subtree(&self, root: MessageId) -> Vec<MessageId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if let Some(message) = self.messages.get(&id) {
                queue.extend(message.children.iter().copied());
                out.push(id);
            }
        }
        out
    }

    fn unlink_from_parent(&mut self, id: MessageId, parent: Option<MessageId>) {
        if let Some(parent) = parent.and_then(|p| self.messages.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
    }

    fn remove_message(&mut self, id: MessageId) {
        self.messages.remove(&id);
        self.ratings.remove(&id);
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    forums: DashMap<ForumId, Forum>,
    forum_names: DashMap<String, ForumId>,
    arena: RwLock<Arena>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages across all trees.
    pub async fn message_count(&self) -> usize {
        self.arena.read().await.messages.len()
    }
}

#[async_trait]
impl ForumRepository for InMemoryStore {
    async fn get_forum(&self, id: ForumId) -> Result<Option<Forum>> {
        Ok(self.forums.get(&id).map(|f| f.value().clone()))
    }

    async fn create_forum(&self, forum: Forum) -> Result<()> {
        match self.forum_names.entry(forum.name.clone()) {
            Entry::Occupied(_) => Err(DomainError::Conflict(format!(
                "forum name '{}' is already taken",
                forum.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(forum.id);
                self.forums.insert(forum.id, forum);
                Ok(())
            }
        }
    }

    async fn set_forum_readonly(&self, id: ForumId, readonly: bool) -> Result<()> {
        let mut forum = self
            .forums
            .get_mut(&id)
            .ok_or_else(|| DomainError::forum_not_found(id))?;
        forum.readonly = readonly;
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn get_message(&self, id: MessageId) -> Result<Option<MessageItem>> {
        Ok(self.arena.read().await.messages.get(&id).cloned())
    }

    async fn get_tree(&self, id: TreeId) -> Result<Option<MessageTree>> {
        Ok(self.arena.read().await.trees.get(&id).cloned())
    }

    async fn tree_messages(&self, id: TreeId) -> Result<Vec<MessageItem>> {
        let arena = self.arena.read().await;
        let mut messages: Vec<MessageItem> = arena
            .messages
            .values()
            .filter(|m| m.tree_id == id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn list_trees(&self, forum_id: ForumId) -> Result<Vec<MessageTree>> {
        let arena = self.arena.read().await;
        let mut trees: Vec<MessageTree> = arena
            .trees
            .values()
            .filter(|t| t.forum_id == forum_id)
            .cloned()
            .collect();
        trees.sort_by_key(|t| t.id);
        Ok(trees)
    }

    async fn create_tree(&self, tree: MessageTree, root: MessageItem) -> Result<()> {
        if root.parent_id.is_some() || root.tree_id != tree.id || tree.root_id != root.id {
            return Err(DomainError::Persistence(format!(
                "root message {} does not match tree {}",
                root.id, tree.id
            )));
        }
        let mut arena = self.arena.write().await;
        if arena.trees.contains_key(&tree.id) || arena.messages.contains_key(&root.id) {
            return Err(DomainError::Conflict(format!("tree {} already exists", tree.id)));
        }
        debug!(tree = %tree.id, root = %root.id, "storing tree");
        arena.messages.insert(root.id, root);
        arena.trees.insert(tree.id, tree);
        Ok(())
    }

    async fn create_comment(&self, comment: MessageItem) -> Result<()> {
        let parent_id = comment.parent_id.ok_or_else(|| {
            DomainError::Persistence(format!("comment {} has no parent", comment.id))
        })?;
        let mut arena = self.arena.write().await;
        let parent = arena.message_mut(parent_id)?;
        if parent.tree_id != comment.tree_id {
            return Err(DomainError::Persistence(format!(
                "parent {} moved to another tree",
                parent_id
            )));
        }
        parent.children.push(comment.id);
        arena.messages.insert(comment.id, comment);
        Ok(())
    }

    async fn apply_history(
        &self,
        id: MessageId,
        change: HistoryChange,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut arena = self.arena.write().await;
        let message = arena.message_mut(id)?;
        message.history.apply(change).map_err(|_| {
            DomainError::Persistence(format!("message {id} cannot lose its only version"))
        })?;
        message.updated_at = updated_at;
        Ok(())
    }

    async fn delete_tree(&self, id: TreeId) -> Result<()> {
        let mut arena = self.arena.write().await;
        if arena.trees.remove(&id).is_none() {
            return Err(DomainError::tree_not_found(id));
        }
        let doomed: Vec<MessageId> = arena
            .messages
            .values()
            .filter(|m| m.tree_id == id)
            .map(|m| m.id)
            .collect();
        for message in &doomed {
            arena.remove_message(*message);
        }
        debug!(tree = %id, messages = doomed.len(), "tree deleted");
        Ok(())
    }

    async fn delete_message(&self, id: MessageId) -> Result<()> {
        let mut arena = self.arena.write().await;
        let message = arena
            .messages
            .get(&id)
            .ok_or_else(|| DomainError::message_not_found(id))?;
        if message.has_comments() {
            return Err(DomainError::MessageHasComments(id));
        }
        let parent = message.parent_id;
        arena.unlink_from_parent(id, parent);
        arena.remove_message(id);
        Ok(())
    }

    async fn split_branch(&self, message_id: MessageId, tree: MessageTree) -> Result<()> {
        let mut arena = self.arena.write().await;
        let message = arena
            .messages
            .get(&message_id)
            .ok_or_else(|| DomainError::message_not_found(message_id))?;
        let Some(old_parent) = message.parent_id else {
            return Err(DomainError::MessageAlreadyBranch(message_id));
        };
        if arena.trees.contains_key(&tree.id) {
            return Err(DomainError::Conflict(format!("tree {} already exists", tree.id)));
        }

        let moved = arena.subtree(message_id);
        arena.unlink_from_parent(message_id, Some(old_parent));
        for id in &moved {
            if let Some(m) = arena.messages.get_mut(id) {
                m.tree_id = tree.id;
            }
        }
        arena.message_mut(message_id)?.parent_id = None;
        debug!(message = %message_id, tree = %tree.id, moved = moved.len(), "branch split stored");
        arena.trees.insert(tree.id, tree);
        Ok(())
    }
}

#[async_trait]
impl RatingRepository for InMemoryStore {
    async fn upsert_rating(&self, rating: Rating) -> Result<()> {
        let mut arena = self.arena.write().await;
        if !arena.messages.contains_key(&rating.message_id) {
            return Err(DomainError::message_not_found(rating.message_id));
        }
        arena
            .ratings
            .entry(rating.message_id)
            .or_default()
            .insert(rating.user_id, rating.value);
        Ok(())
    }

    async fn delete_rating(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        let mut arena = self.arena.write().await;
        Ok(arena
            .ratings
            .get_mut(&message_id)
            .and_then(|by_user| by_user.remove(&user_id))
            .is_some())
    }

    async fn ratings_for(&self, message_id: MessageId) -> Result<Vec<Rating>> {
        let arena = self.arena.read().await;
        Ok(arena
            .ratings
            .get(&message_id)
            .map(|by_user| {
                by_user
                    .iter()
                    .map(|(user_id, value)| Rating { message_id, user_id: *user_id, value: *value })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rating_summaries(
        &self,
        message_ids: Vec<MessageId>,
    ) -> Result<HashMap<MessageId, RatingSummary>> {
        let arena = self.arena.read().await;
        Ok(message_ids
            .into_iter()
            .filter_map(|id| {
                let by_user = arena.ratings.get(&id)?;
                Some((id, RatingSummary::from_values(by_user.values().copied())))
            })
            .collect())
    }
}

//! # TreeQueryEngine
//!
//! Read-only materialization of message trees. The engine builds the full
//! view from storage, orders siblings, then prunes it to what the request
//! may see. Each item keeps its owner and state so callers can filter further.

use domains::{
    DomainError, ForumId, ForumRepository, MessageId, MessageItem, MessageRepository,
    MessageTree, MessageView, Order, Page, PublicationState, RatingRepository, RatingSummary,
    Result, TreeId, TreeQuery, TreeView, UserId, VersionView,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Which versions of which messages a reader receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    /// Show versions in every state, for every author.
    pub include_unpublished: bool,
    /// All versions newest-first, or only the newest visible one.
    pub include_all_versions: bool,
    /// Author whose own content is shown in every state.
    pub viewer: Option<UserId>,
}

impl Visibility {
    pub fn from_query(query: &TreeQuery, viewer: Option<UserId>) -> Self {
        Self {
            include_unpublished: query.include_unpublished,
            include_all_versions: query.include_all_versions,
            viewer,
        }
    }
}

/// Applies the version filter to a single message, ignoring its comments.
fn prune(mut view: MessageView, visibility: &Visibility) -> Option<MessageView> {
    let sees_everything = visibility.include_unpublished || visibility.viewer == Some(view.owner);
    if !sees_everything {
        view.versions.retain(|v| v.state == PublicationState::Published);
    }
    if view.versions.is_empty() {
        return None;
    }
    if !visibility.include_all_versions {
        view.versions.truncate(1);
    }
    Some(view)
}

/// A message whose comments are still being processed.
struct Frame<T> {
    node: T,
    /// Unvisited children, last one next.
    pending: Vec<T>,
    done: Vec<MessageView>,
}

impl Frame<MessageView> {
    fn open(mut view: MessageView) -> Self {
        let mut pending = std::mem::take(&mut view.comments);
        pending.reverse();
        Self { node: view, pending, done: Vec::new() }
    }
}

/// Prunes `view` to `visibility`. A message without any visible version is
/// dropped together with its comments.
pub fn restrict(view: MessageView, visibility: &Visibility) -> Option<MessageView> {
    let mut stack = vec![Frame::open(prune(view, visibility)?)];
    while let Some(mut frame) = stack.pop() {
        if let Some(child) = frame.pending.pop() {
            stack.push(frame);
            if let Some(child) = prune(child, visibility) {
                stack.push(Frame::open(child));
            }
            continue;
        }
        let mut view = frame.node;
        view.comments = frame.done;
        match stack.last_mut() {
            Some(parent) => parent.done.push(view),
            None => return Some(view),
        }
    }
    None
}

fn compare(order: Order, a: &MessageView, b: &MessageView) -> Ordering {
    match order {
        Order::Rating => b
            .rating
            .average
            .total_cmp(&a.rating.average)
            .then_with(|| a.id.cmp(&b.id)),
        Order::Date => a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)),
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

struct Builder {
    by_parent: HashMap<MessageId, Vec<MessageItem>>,
    summaries: HashMap<MessageId, RatingSummary>,
    order: Order,
    include_comments: bool,
}

impl Builder {
    fn open(&mut self, item: MessageItem) -> Frame<MessageItem> {
        let mut pending = if self.include_comments {
            self.by_parent.remove(&item.id).unwrap_or_default()
        } else {
            Vec::new()
        };
        pending.reverse();
        Frame { node: item, pending, done: Vec::new() }
    }

    fn finish(&self, frame: Frame<MessageItem>) -> MessageView {
        let Frame { node: item, mut done, .. } = frame;
        let order = self.order;
        done.sort_by(|a, b| compare(order, a, b));

        MessageView {
            id: item.id,
            owner: item.owner,
            parent_id: item.parent_id,
            state: item.history.latest_state(),
            versions: item.history.versions().iter().map(VersionView::from).collect(),
            rating: self.summaries.get(&item.id).copied().unwrap_or_default(),
            comments: done,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }

    /// Post-order over the arena with an explicit stack.
    fn build(&mut self, root: MessageItem) -> Option<MessageView> {
        let mut stack = vec![self.open(root)];
        while let Some(mut frame) = stack.pop() {
            if let Some(child) = frame.pending.pop() {
                stack.push(frame);
                let child = self.open(child);
                stack.push(child);
                continue;
            }
            let view = self.finish(frame);
            match stack.last_mut() {
                Some(parent) => parent.done.push(view),
                None => return Some(view),
            }
        }
        None
    }
}

pub struct TreeQueryEngine {
    forums: Arc<dyn ForumRepository>,
    messages: Arc<dyn MessageRepository>,
    ratings: Arc<dyn RatingRepository>,
}

impl TreeQueryEngine {
    pub fn new(
        forums: Arc<dyn ForumRepository>,
        messages: Arc<dyn MessageRepository>,
        ratings: Arc<dyn RatingRepository>,
    ) -> Self {
        Self { forums, messages, ratings }
    }

    pub async fn get_tree(&self, tree_id: TreeId, query: TreeQuery) -> Result<TreeView> {
        self.get_tree_visible_to(tree_id, query, None).await
    }

    /// Like [`get_tree`](Self::get_tree), additionally showing `viewer`'s own
    /// content in every state. A hidden root reads as a missing tree.
    #[tracing::instrument(skip(self))]
    pub async fn get_tree_visible_to(
        &self,
        tree_id: TreeId,
        query: TreeQuery,
        viewer: Option<UserId>,
    ) -> Result<TreeView> {
        let tree = self
            .messages
            .get_tree(tree_id)
            .await?
            .ok_or_else(|| DomainError::tree_not_found(tree_id))?;
        let visibility = Visibility::from_query(&query, viewer);
        self.view(tree, query.order, query.include_comments, &visibility)
            .await?
            .ok_or_else(|| DomainError::tree_not_found(tree_id))
    }

    pub async fn get_trees_by_forum(
        &self,
        forum_id: ForumId,
        query: TreeQuery,
        page: Page,
    ) -> Result<Vec<TreeView>> {
        self.get_trees_by_forum_visible_to(forum_id, query, page, None).await
    }

    /// Trees of a forum, high priority first, then by `query.order` on the
    /// root message. The page is cut after visibility filtering.
    #[tracing::instrument(skip(self))]
    pub async fn get_trees_by_forum_visible_to(
        &self,
        forum_id: ForumId,
        query: TreeQuery,
        page: Page,
        viewer: Option<UserId>,
    ) -> Result<Vec<TreeView>> {
        if self.forums.get_forum(forum_id).await?.is_none() {
            return Err(DomainError::forum_not_found(forum_id));
        }
        let visibility = Visibility::from_query(&query, viewer);

        let mut views = Vec::new();
        for tree in self.messages.list_trees(forum_id).await? {
            if let Some(view) = self.view(tree, query.order, query.include_comments, &visibility).await? {
                views.push(view);
            }
        }
        views.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| compare(query.order, &a.root, &b.root))
        });

        let total = views.len();
        let views: Vec<TreeView> = views
            .into_iter()
            .skip(to_usize(page.offset))
            .take(to_usize(page.limit))
            .collect();
        debug!(forum = %forum_id, total, returned = views.len(), "forum trees listed");
        Ok(views)
    }

    async fn view(
        &self,
        tree: MessageTree,
        order: Order,
        include_comments: bool,
        visibility: &Visibility,
    ) -> Result<Option<TreeView>> {
        let messages = self.messages.tree_messages(tree.id).await?;
        let ids = if include_comments {
            messages.iter().map(|m| m.id).collect()
        } else {
            vec![tree.root_id]
        };
        let summaries = self.ratings.rating_summaries(ids).await?;

        let mut root = None;
        let mut by_parent: HashMap<MessageId, Vec<MessageItem>> = HashMap::new();
        for message in messages {
            if message.id == tree.root_id {
                root = Some(message);
            } else if let Some(parent) = message.parent_id {
                by_parent.entry(parent).or_default().push(message);
            }
        }
        let root = root.ok_or_else(|| {
            DomainError::Persistence(format!("tree {} has no root message", tree.id))
        })?;

        let mut builder = Builder { by_parent, summaries, order, include_comments };
        let Some(root) = builder.build(root).and_then(|root| restrict(root, visibility)) else {
            return Ok(None);
        };
        Ok(Some(TreeView {
            id: tree.id,
            forum_id: tree.forum_id,
            subject: tree.subject,
            priority: tree.priority,
            tags: tree.tags,
            created_at: tree.created_at,
            root,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn view(owner: UserId, states: &[PublicationState], comments: Vec<MessageView>) -> MessageView {
        let now = Utc::now();
        MessageView {
            id: MessageId::new(),
            owner,
            parent_id: None,
            state: states[0],
            versions: states
                .iter()
                .enumerate()
                .map(|(i, s)| VersionView {
                    body: format!("v{}", states.len() - i),
                    state: *s,
                    created_at: now - Duration::minutes(i as i64),
                })
                .collect(),
            rating: RatingSummary::default(),
            comments,
            created_at: now,
            updated_at: now,
        }
    }

    const PUB: PublicationState = PublicationState::Published;
    const UNPUB: PublicationState = PublicationState::Unpublished;

    fn published_only() -> Visibility {
        Visibility { include_unpublished: false, include_all_versions: true, viewer: None }
    }

    #[test]
    fn pending_edit_hidden_behind_published_version() {
        let pruned = restrict(view(UserId::new(), &[UNPUB, PUB], Vec::new()), &published_only()).unwrap();
        assert_eq!(pruned.versions.len(), 1);
        assert_eq!(pruned.versions[0].state, PUB);
        // The real head state stays visible to callers.
        assert_eq!(pruned.state, UNPUB);
    }

    #[test]
    fn never_published_message_drops_with_subtree() {
        let author = UserId::new();
        let hidden = view(author, &[UNPUB], vec![view(UserId::new(), &[PUB], Vec::new())]);
        let root = view(UserId::new(), &[PUB], vec![hidden]);

        let pruned = restrict(root, &published_only()).unwrap();
        assert!(pruned.comments.is_empty());
    }

    #[test]
    fn viewer_sees_own_pending_content() {
        let author = UserId::new();
        let root = view(UserId::new(), &[PUB], vec![view(author, &[UNPUB], Vec::new())]);
        let visibility = Visibility { viewer: Some(author), ..published_only() };

        let pruned = restrict(root, &visibility).unwrap();
        assert_eq!(pruned.comments.len(), 1);
        assert_eq!(pruned.comments[0].versions[0].state, UNPUB);
    }

    #[test]
    fn latest_only_keeps_one_version() {
        let visibility = Visibility { include_unpublished: true, include_all_versions: false, viewer: None };
        let pruned = restrict(view(UserId::new(), &[UNPUB, PUB, PUB], Vec::new()), &visibility).unwrap();
        assert_eq!(pruned.versions.len(), 1);
        assert_eq!(pruned.versions[0].body, "v3");
    }

    #[test]
    fn deep_reply_chain_is_pruned_without_recursion() {
        let mut chain = view(UserId::new(), &[UNPUB], Vec::new());
        for _ in 0..20_000 {
            chain = view(UserId::new(), &[PUB], vec![chain]);
        }
        let pruned = restrict(chain, &published_only()).unwrap();
        // Only the unpublished leaf goes.
        assert_eq!(pruned.walk().len(), 20_000);
    }

    #[test]
    fn rating_order_breaks_ties_by_id() {
        let mut a = view(UserId::new(), &[PUB], Vec::new());
        let mut b = view(UserId::new(), &[PUB], Vec::new());
        let mut c = view(UserId::new(), &[PUB], Vec::new());
        a.rating = RatingSummary { average: 2.0, count: 1 };
        b.rating = RatingSummary { average: 4.0, count: 1 };
        c.rating = RatingSummary { average: 2.0, count: 3 };

        let mut all = vec![c.clone(), a.clone(), b.clone()];
        all.sort_by(|x, y| compare(Order::Rating, x, y));
        let ids: Vec<MessageId> = all.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![b.id, a.id, c.id]);
    }
}

//! Behaviour every storage adapter has to share.
//!
//! Each check creates its own forum with a unique name, so adapters backed
//! by one long-lived database can run them side by side. Timestamps are
//! whole seconds apart and never compared directly, since databases round
//! them.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use domains::{
    DomainError, Forum, ForumId, ForumRepository, ForumType, History, HistoryChange, HistoryItem,
    MessageId, MessageItem, MessageRepository, MessageTree, Priority, PublicationState, Rating,
    RatingRepository, RatingValue, Result, TreeId, UserId,
};
use std::collections::BTreeSet;

/// Everything a contract check needs from a store.
pub trait Store: ForumRepository + MessageRepository + RatingRepository {}

impl<S: ForumRepository + MessageRepository + RatingRepository> Store for S {}

struct Ticker {
    base: DateTime<Utc>,
    ticks: i64,
}

impl Ticker {
    fn new() -> Self {
        Self { base: Utc::now().trunc_subsecs(0), ticks: 0 }
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        self.base + Duration::seconds(self.ticks)
    }
}

fn forum(owner: UserId, at: DateTime<Utc>) -> Forum {
    let id = ForumId::new();
    Forum {
        id,
        forum_type: ForumType::Moderated,
        name: format!("contracts-{id}"),
        owner,
        created_at: at,
        readonly: false,
    }
}

async fn seeded_forum<S: Store>(store: &S, clock: &mut Ticker) -> Result<Forum> {
    let forum = forum(UserId::new(), clock.tick());
    store.create_forum(forum.clone()).await?;
    Ok(forum)
}

fn message(
    tree_id: TreeId,
    parent_id: Option<MessageId>,
    body: &str,
    at: DateTime<Utc>,
) -> MessageItem {
    MessageItem {
        id: MessageId::new(),
        owner: UserId::new(),
        parent_id,
        tree_id,
        history: History::new(HistoryItem::new(body, PublicationState::Published, at)),
        children: Vec::new(),
        created_at: at,
        updated_at: at,
    }
}

async fn new_tree<S: Store>(
    store: &S,
    forum_id: ForumId,
    clock: &mut Ticker,
) -> Result<(MessageTree, MessageItem)> {
    let at = clock.tick();
    let tree_id = TreeId::new();
    let root = message(tree_id, None, "root", at);
    let tree = MessageTree {
        id: tree_id,
        forum_id,
        subject: "contract tree".into(),
        root_id: root.id,
        priority: Priority::High,
        tags: BTreeSet::from(["alpha".to_string(), "beta".to_string()]),
        created_at: at,
    };
    store.create_tree(tree.clone(), root.clone()).await?;
    Ok((tree, root))
}

async fn reply<S: Store>(
    store: &S,
    parent: &MessageItem,
    body: &str,
    clock: &mut Ticker,
) -> Result<MessageItem> {
    let comment = message(parent.tree_id, Some(parent.id), body, clock.tick());
    store.create_comment(comment.clone()).await?;
    Ok(comment)
}

async fn stored<S: Store>(store: &S, id: MessageId) -> Result<MessageItem> {
    store
        .get_message(id)
        .await?
        .ok_or_else(|| DomainError::message_not_found(id))
}

async fn ids_in<S: Store>(store: &S, tree_id: TreeId) -> Result<Vec<MessageId>> {
    Ok(store.tree_messages(tree_id).await?.iter().map(|m| m.id).collect())
}

fn bodies(message: &MessageItem) -> Vec<(&str, PublicationState)> {
    message
        .history
        .versions()
        .iter()
        .map(|v| (v.body.as_str(), v.state))
        .collect()
}

fn rating(message_id: MessageId, user_id: UserId, value: i32) -> Result<Rating> {
    Ok(Rating {
        message_id,
        user_id,
        value: RatingValue::try_from(value).map_err(DomainError::Validation)?,
    })
}

pub async fn forum_names_are_unique<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let original = seeded_forum(store, &mut clock).await?;

    let mut twin = forum(UserId::new(), clock.tick());
    twin.name = original.name.clone();
    let err = store.create_forum(twin.clone()).await;
    assert!(matches!(err, Err(DomainError::Conflict(_))), "{err:?}");
    assert!(store.get_forum(twin.id).await?.is_none());

    let found = store.get_forum(original.id).await?;
    assert_eq!(found.map(|f| (f.name, f.owner)), Some((original.name, original.owner)));
    Ok(())
}

pub async fn readonly_flag_is_stored<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;

    store.set_forum_readonly(forum.id, true).await?;
    assert_eq!(store.get_forum(forum.id).await?.map(|f| f.readonly), Some(true));
    store.set_forum_readonly(forum.id, false).await?;
    assert_eq!(store.get_forum(forum.id).await?.map(|f| f.readonly), Some(false));

    let err = store.set_forum_readonly(ForumId::new(), true).await;
    assert!(matches!(err, Err(DomainError::NotFound { kind: "forum", .. })), "{err:?}");
    Ok(())
}

pub async fn comments_link_in_creation_order<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;
    let (tree, root) = new_tree(store, forum.id, &mut clock).await?;
    let first = reply(store, &root, "first", &mut clock).await?;
    let second = reply(store, &root, "second", &mut clock).await?;

    assert_eq!(stored(store, root.id).await?.children, vec![first.id, second.id]);
    assert_eq!(ids_in(store, tree.id).await?, vec![root.id, first.id, second.id]);

    let loaded = store.get_tree(tree.id).await?.ok_or_else(|| DomainError::tree_not_found(tree.id))?;
    assert_eq!(loaded.root_id, root.id);
    assert_eq!(loaded.priority, Priority::High);
    assert_eq!(loaded.tags, tree.tags);

    let listed: Vec<TreeId> = store.list_trees(forum.id).await?.iter().map(|t| t.id).collect();
    assert_eq!(listed, vec![tree.id]);
    Ok(())
}

pub async fn split_moves_the_whole_subtree<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;
    let (old_tree, root) = new_tree(store, forum.id, &mut clock).await?;
    let branch = reply(store, &root, "branch", &mut clock).await?;
    let leaf = reply(store, &branch, "leaf", &mut clock).await?;
    let sibling = reply(store, &root, "sibling", &mut clock).await?;
    let rater = UserId::new();
    store.upsert_rating(rating(leaf.id, rater, 4)?).await?;
    store
        .apply_history(
            leaf.id,
            HistoryChange::Append(HistoryItem::new("leaf v2", PublicationState::Unpublished, clock.tick())),
            clock.tick(),
        )
        .await?;

    let split_off = MessageTree {
        id: TreeId::new(),
        forum_id: forum.id,
        subject: "split off".into(),
        root_id: branch.id,
        priority: Priority::Normal,
        tags: BTreeSet::new(),
        created_at: clock.tick(),
    };
    store.split_branch(branch.id, split_off.clone()).await?;

    assert_eq!(ids_in(store, old_tree.id).await?, vec![root.id, sibling.id]);
    assert_eq!(ids_in(store, split_off.id).await?, vec![branch.id, leaf.id]);
    assert_eq!(stored(store, root.id).await?.children, vec![sibling.id]);

    let moved = stored(store, branch.id).await?;
    assert_eq!(moved.parent_id, None);
    assert_eq!(moved.tree_id, split_off.id);
    assert_eq!(moved.children, vec![leaf.id]);

    let moved_leaf = stored(store, leaf.id).await?;
    assert_eq!(moved_leaf.tree_id, split_off.id);
    assert_eq!(
        bodies(&moved_leaf),
        vec![("leaf v2", PublicationState::Unpublished), ("leaf", PublicationState::Published)]
    );
    assert_eq!(store.ratings_for(leaf.id).await?.len(), 1);

    let mut listed: Vec<TreeId> = store.list_trees(forum.id).await?.iter().map(|t| t.id).collect();
    listed.sort();
    let mut expected = vec![old_tree.id, split_off.id];
    expected.sort();
    assert_eq!(listed, expected);

    let err = store
        .split_branch(branch.id, MessageTree { id: TreeId::new(), ..split_off })
        .await;
    assert_eq!(err, Err(DomainError::MessageAlreadyBranch(branch.id)));
    Ok(())
}

pub async fn deleting_a_tree_removes_everything_in_it<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;
    let (tree, root) = new_tree(store, forum.id, &mut clock).await?;
    let comment = reply(store, &root, "comment", &mut clock).await?;
    store
        .apply_history(
            comment.id,
            HistoryChange::Append(HistoryItem::new("edited", PublicationState::Published, clock.tick())),
            clock.tick(),
        )
        .await?;
    store.upsert_rating(rating(comment.id, UserId::new(), 5)?).await?;
    store.upsert_rating(rating(root.id, UserId::new(), 2)?).await?;

    store.delete_tree(tree.id).await?;

    assert!(store.get_tree(tree.id).await?.is_none());
    assert!(store.get_message(root.id).await?.is_none());
    assert!(store.get_message(comment.id).await?.is_none());
    assert!(store.tree_messages(tree.id).await?.is_empty());
    assert!(store.ratings_for(comment.id).await?.is_empty());
    assert!(store.ratings_for(root.id).await?.is_empty());
    assert!(store.list_trees(forum.id).await?.is_empty());

    let err = store.delete_tree(tree.id).await;
    assert!(matches!(err, Err(DomainError::NotFound { kind: "tree", .. })), "{err:?}");
    Ok(())
}

pub async fn only_leaves_are_deleted<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;
    let (tree, root) = new_tree(store, forum.id, &mut clock).await?;
    let parent = reply(store, &root, "parent", &mut clock).await?;
    let leaf = reply(store, &parent, "leaf", &mut clock).await?;

    assert_eq!(
        store.delete_message(parent.id).await,
        Err(DomainError::MessageHasComments(parent.id))
    );
    assert_eq!(ids_in(store, tree.id).await?, vec![root.id, parent.id, leaf.id]);

    store.delete_message(leaf.id).await?;
    assert!(store.get_message(leaf.id).await?.is_none());
    assert!(stored(store, parent.id).await?.children.is_empty());

    let err = store.delete_message(leaf.id).await;
    assert!(matches!(err, Err(DomainError::NotFound { kind: "message", .. })), "{err:?}");
    Ok(())
}

pub async fn history_changes_apply_to_the_head<S: Store>(store: &S) -> Result<()> {
    use PublicationState::{Published, Unpublished};

    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;
    let (_, root) = new_tree(store, forum.id, &mut clock).await?;
    let id = root.id;

    store
        .apply_history(id, HistoryChange::Append(HistoryItem::new("v2", Unpublished, clock.tick())), clock.tick())
        .await?;
    assert_eq!(bodies(&stored(store, id).await?), vec![("v2", Unpublished), ("root", Published)]);

    store
        .apply_history(
            id,
            HistoryChange::OverwriteLatest(HistoryItem::new("v2 fixed", Unpublished, clock.tick())),
            clock.tick(),
        )
        .await?;
    assert_eq!(bodies(&stored(store, id).await?), vec![("v2 fixed", Unpublished), ("root", Published)]);

    store.apply_history(id, HistoryChange::SetLatestState(Published), clock.tick()).await?;
    assert_eq!(bodies(&stored(store, id).await?), vec![("v2 fixed", Published), ("root", Published)]);

    store.apply_history(id, HistoryChange::DiscardLatest, clock.tick()).await?;
    assert_eq!(bodies(&stored(store, id).await?), vec![("root", Published)]);

    let err = store.apply_history(id, HistoryChange::DiscardLatest, clock.tick()).await;
    assert!(matches!(err, Err(DomainError::Persistence(_))), "{err:?}");
    assert_eq!(bodies(&stored(store, id).await?), vec![("root", Published)]);

    let missing = MessageId::new();
    let err = store.apply_history(missing, HistoryChange::DiscardLatest, clock.tick()).await;
    assert_eq!(err, Err(DomainError::message_not_found(missing)));
    Ok(())
}

pub async fn one_rating_per_user<S: Store>(store: &S) -> Result<()> {
    let mut clock = Ticker::new();
    let forum = seeded_forum(store, &mut clock).await?;
    let (_, rated) = new_tree(store, forum.id, &mut clock).await?;
    let (_, unrated) = new_tree(store, forum.id, &mut clock).await?;
    let (carol, dave) = (UserId::new(), UserId::new());

    store.upsert_rating(rating(rated.id, carol, 4)?).await?;
    store.upsert_rating(rating(rated.id, carol, 2)?).await?;
    store.upsert_rating(rating(rated.id, dave, 5)?).await?;
    assert_eq!(store.ratings_for(rated.id).await?.len(), 2);

    let summaries = store.rating_summaries(vec![rated.id, unrated.id]).await?;
    let summary = summaries.get(&rated.id).copied().unwrap_or_default();
    assert_eq!(summary.count, 2);
    assert!((summary.average - 3.5).abs() < f64::EPSILON);
    assert_eq!(summaries.get(&unrated.id).map_or(0, |s| s.count), 0);

    assert!(store.delete_rating(rated.id, carol).await?);
    assert!(!store.delete_rating(rated.id, carol).await?);

    let summaries = store.rating_summaries(vec![rated.id]).await?;
    let summary = summaries.get(&rated.id).copied().unwrap_or_default();
    assert_eq!(summary.count, 1);
    assert!((summary.average - 5.0).abs() < f64::EPSILON);
    Ok(())
}

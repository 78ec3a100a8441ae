//! Moving a comment and its subtree into a new tree.

use domains::{DomainError, ForumType, MessageId, Priority, RatingSummary, TreeQuery};
use integration_tests::{new_comment, new_message, Harness};
use services::dto::{RateRequest, SplitBranchRequest};

fn split(message_id: MessageId, subject: &str) -> SplitBranchRequest {
    SplitBranchRequest {
        message_id,
        subject: subject.into(),
        priority: Priority::High,
        tags: ["split".to_string()].into(),
    }
}

fn with_comments() -> TreeQuery {
    TreeQuery { include_comments: true, ..TreeQuery::default() }
}

#[tokio::test]
async fn depth_two_comment_moves_with_its_children() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;

    // root -> a -> c -> d
    //      -> b
    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "root")).await.unwrap();
    h.tick();
    let a = h.backend.create_comment(&bob.token, new_comment(root.id, "a")).await.unwrap();
    h.tick();
    let b = h.backend.create_comment(&bob.token, new_comment(root.id, "b")).await.unwrap();
    h.tick();
    let c = h.backend.create_comment(&bob.token, new_comment(a.id, "c")).await.unwrap();
    h.tick();
    let d = h.backend.create_comment(&alice.token, new_comment(c.id, "d")).await.unwrap();
    h.backend.rate(&alice.token, RateRequest { message_id: c.id, value: Some(4) }).await.unwrap();

    let moved = h.backend.split_branch(&alice.token, split(c.id, "offshoot")).await.unwrap();
    assert_eq!(moved.id, c.id);
    assert_ne!(moved.tree_id, root.tree_id);

    let old = h.backend.get_tree(None, root.tree_id, with_comments()).await.unwrap();
    let old_ids: Vec<MessageId> = old.root.walk().iter().map(|m| m.id).collect();
    assert_eq!(old_ids, vec![root.id, a.id, b.id]);

    let new = h.backend.get_tree(None, moved.tree_id, with_comments()).await.unwrap();
    assert_eq!(new.subject, "offshoot");
    assert_eq!(new.priority, Priority::High);
    assert_eq!(new.forum_id, forum.id);
    assert_eq!(new.root.id, c.id);
    assert_eq!(new.root.parent_id, None);
    assert_eq!(new.root.comments.len(), 1);
    assert_eq!(new.root.comments[0].id, d.id);
    assert_eq!(new.root.rating, RatingSummary { average: 4.0, count: 1 });
}

#[tokio::test]
async fn roots_cannot_be_split_again() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "root")).await.unwrap();
    let comment = h.backend.create_comment(&alice.token, new_comment(root.id, "c")).await.unwrap();

    let err = h.backend.split_branch(&alice.token, split(root.id, "x")).await.unwrap_err();
    assert_eq!(err, DomainError::MessageAlreadyBranch(root.id));

    h.backend.split_branch(&alice.token, split(comment.id, "x")).await.unwrap();
    let err = h.backend.split_branch(&alice.token, split(comment.id, "y")).await.unwrap_err();
    assert_eq!(err, DomainError::MessageAlreadyBranch(comment.id));
}

#[tokio::test]
async fn only_forum_owner_splits_in_writable_forum() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let root = h.backend.create_message(&bob.token, new_message(forum.id, "t", "root")).await.unwrap();
    let comment = h.backend.create_comment(&bob.token, new_comment(root.id, "c")).await.unwrap();

    let err = h.backend.split_branch(&bob.token, split(comment.id, "x")).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    h.backend.set_forum_readonly(&alice.token, forum.id, true).await.unwrap();
    let err = h.backend.split_branch(&alice.token, split(comment.id, "x")).await.unwrap_err();
    assert_eq!(err, DomainError::ForumReadOnly(forum.id));
}

#[tokio::test]
async fn split_tree_shows_up_in_forum_listing() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "root")).await.unwrap();
    h.tick();
    let comment = h.backend.create_comment(&alice.token, new_comment(root.id, "c")).await.unwrap();

    let moved = h.backend.split_branch(&alice.token, split(comment.id, "offshoot")).await.unwrap();
    let trees = h.backend.list_trees(None, forum.id, Default::default()).await.unwrap();
    let ids: Vec<_> = trees.iter().map(|t| t.id).collect();
    // High priority first.
    assert_eq!(ids, vec![moved.tree_id, root.tree_id]);
}

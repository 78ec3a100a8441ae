//! Publication state of new content and the owner's publish/reject decisions.

use chrono::Duration;
use domains::{Clock, Decision, DomainError, ForumType, PublicationState, TreeQuery};
use integration_tests::{new_comment, new_message, Harness};
use services::dto::PublishRequest;
use services::DecisionOutcome;

fn yes(message_id: domains::MessageId) -> PublishRequest {
    PublishRequest { message_id, decision: Decision::Yes }
}

fn no(message_id: domains::MessageId) -> PublishRequest {
    PublishRequest { message_id, decision: Decision::No }
}

#[tokio::test]
async fn unmoderated_content_is_published_immediately() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "open", ForumType::Unmoderated).await;

    let root = h.backend.create_message(&bob.token, new_message(forum.id, "hi", "hi")).await.unwrap();
    assert_eq!(root.state, PublicationState::Published);

    let comment = h.backend.create_comment(&alice.token, new_comment(root.id, "hello")).await.unwrap();
    assert_eq!(comment.state, PublicationState::Published);
    assert_eq!(comment.tree_id, root.tree_id);
}

#[tokio::test]
async fn moderated_forum_holds_non_owner_content() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let own = h.backend.create_message(&alice.token, new_message(forum.id, "rules", "be nice")).await.unwrap();
    assert_eq!(own.state, PublicationState::Published);

    let pending = h.backend.create_message(&bob.token, new_message(forum.id, "q", "hi")).await.unwrap();
    assert_eq!(pending.state, PublicationState::Unpublished);

    let comment = h.backend.create_comment(&bob.token, new_comment(own.id, "ok")).await.unwrap();
    assert_eq!(comment.state, PublicationState::Unpublished);
}

#[tokio::test]
async fn publishing_twice_fails() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "hi", "hi")).await.unwrap();
    let outcome = h.backend.publish(&alice.token, yes(msg.id)).await.unwrap();
    assert_eq!(outcome, DecisionOutcome::Published { id: msg.id });

    let tree = h.backend.get_tree(None, msg.tree_id, TreeQuery::default()).await.unwrap();
    assert_eq!(tree.root.state, PublicationState::Published);

    let err = h.backend.publish(&alice.token, yes(msg.id)).await.unwrap_err();
    assert_eq!(err, DomainError::MessageAlreadyPublished(msg.id));
}

#[tokio::test]
async fn only_forum_owner_decides() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let admin = h.superuser("admin");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "hi", "hi")).await.unwrap();
    for token in [&bob.token, &admin.token] {
        let err = h.backend.publish(token, yes(msg.id)).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)), "{err:?}");
    }
}

#[tokio::test]
async fn rejecting_single_version_root_deletes_tree() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "spam", "spam")).await.unwrap();
    let outcome = h.backend.publish(&alice.token, no(msg.id)).await.unwrap();
    assert_eq!(outcome, DecisionOutcome::TreeDeleted { id: msg.tree_id });

    let query = TreeQuery { include_unpublished: true, ..TreeQuery::default() };
    let err = h.backend.get_tree(Some(&alice.token), msg.tree_id, query).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { kind: "tree", .. }));
    assert_eq!(h.store.message_count().await, 0);
}

#[tokio::test]
async fn rejecting_single_version_comment_deletes_only_it() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "t")).await.unwrap();
    let comment = h.backend.create_comment(&bob.token, new_comment(root.id, "c")).await.unwrap();

    let outcome = h.backend.publish(&alice.token, no(comment.id)).await.unwrap();
    assert_eq!(outcome, DecisionOutcome::MessageDeleted { id: comment.id });

    let query = TreeQuery { include_comments: true, include_unpublished: true, ..TreeQuery::default() };
    let tree = h.backend.get_tree(Some(&alice.token), root.tree_id, query).await.unwrap();
    assert!(tree.root.comments.is_empty());
}

#[tokio::test]
async fn comments_need_a_published_parent() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let pending = h.backend.create_message(&bob.token, new_message(forum.id, "q", "q")).await.unwrap();
    let err = h.backend.create_comment(&alice.token, new_comment(pending.id, "c")).await.unwrap_err();
    assert_eq!(err, DomainError::MessageNotPublished(pending.id));
}

#[tokio::test]
async fn banned_users_cannot_post_until_ban_expires() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let mut bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "t")).await.unwrap();

    let until = h.clock.now() + Duration::hours(1);
    h.update(&mut bob, |u| u.banned_until = Some(until));

    let err = h.backend.create_message(&bob.token, new_message(forum.id, "x", "x")).await.unwrap_err();
    assert_eq!(err, DomainError::UserBanned(bob.user.id));
    let err = h.backend.create_comment(&bob.token, new_comment(root.id, "x")).await.unwrap_err();
    assert_eq!(err, DomainError::UserBanned(bob.user.id));

    h.clock.advance(Duration::hours(2));
    h.backend.create_message(&bob.token, new_message(forum.id, "x", "x")).await.unwrap();
}

#[tokio::test]
async fn repeated_bans_are_permanent() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let mut bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;

    let max = h.backend.config().max_ban_count;
    h.update(&mut bob, |u| u.ban_count = max);
    h.clock.advance(Duration::days(365));
    let err = h.backend.create_message(&bob.token, new_message(forum.id, "x", "x")).await.unwrap_err();
    assert_eq!(err, DomainError::UserBanned(bob.user.id));
}

#[tokio::test]
async fn read_only_forum_refuses_new_content() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "t")).await.unwrap();

    h.backend.set_forum_readonly(&alice.token, forum.id, true).await.unwrap();
    let err = h.backend.create_message(&alice.token, new_message(forum.id, "x", "x")).await.unwrap_err();
    assert_eq!(err, DomainError::ForumReadOnly(forum.id));
    let err = h.backend.create_comment(&alice.token, new_comment(root.id, "x")).await.unwrap_err();
    assert_eq!(err, DomainError::ForumReadOnly(forum.id));
}

#[tokio::test]
async fn unknown_token_is_an_auth_error() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let err = h.backend.create_message("nope", new_message(forum.id, "x", "x")).await.unwrap_err();
    assert_eq!(err, DomainError::Auth);

    h.sessions.revoke(&alice.token);
    let err = h.backend.create_message(&alice.token, new_message(forum.id, "x", "x")).await.unwrap_err();
    assert_eq!(err, DomainError::Auth);
}

#[tokio::test]
async fn owner_deletes_childless_content_only() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;

    let root = h.backend.create_message(&alice.token, new_message(forum.id, "t", "t")).await.unwrap();
    let comment = h.backend.create_comment(&bob.token, new_comment(root.id, "c")).await.unwrap();

    let err = h.backend.delete_message(&bob.token, root.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
    let err = h.backend.delete_message(&alice.token, root.id).await.unwrap_err();
    assert_eq!(err, DomainError::MessageHasComments(root.id));

    let deleted = h.backend.delete_message(&bob.token, comment.id).await.unwrap();
    assert_eq!(deleted, services::Deletion::Message { id: comment.id });
    let deleted = h.backend.delete_message(&alice.token, root.id).await.unwrap();
    assert_eq!(deleted, services::Deletion::Tree { id: root.tree_id });
}

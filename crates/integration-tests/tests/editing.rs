//! Version history: appending, overwriting pending edits and reverting them.

use domains::{Decision, DomainError, ForumType, MessageView, PublicationState, TreeId, TreeQuery};
use integration_tests::{new_message, Actor, Harness};
use services::dto::{EditMessageRequest, PublishRequest};
use services::DecisionOutcome;

fn edit(message_id: domains::MessageId, body: &str) -> EditMessageRequest {
    EditMessageRequest { message_id, body: body.into() }
}

/// The root as the forum owner sees it: every version, every state.
async fn full_root(h: &Harness, owner: &Actor, tree_id: TreeId) -> MessageView {
    let query = TreeQuery { include_all_versions: true, include_unpublished: true, ..TreeQuery::default() };
    h.backend.get_tree(Some(&owner.token), tree_id, query).await.unwrap().root
}

fn bodies(view: &MessageView) -> Vec<(&str, PublicationState)> {
    view.versions.iter().map(|v| (v.body.as_str(), v.state)).collect()
}

#[tokio::test]
async fn moderated_edit_of_published_message_appends_pending_version() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "s", "v1")).await.unwrap();
    h.backend.publish(&alice.token, PublishRequest { message_id: msg.id, decision: Decision::Yes }).await.unwrap();
    h.tick();

    let edited = h.backend.edit_message(&bob.token, edit(msg.id, "v2")).await.unwrap();
    assert_eq!(edited.state, PublicationState::Unpublished);

    let root = full_root(&h, &alice, msg.tree_id).await;
    assert_eq!(
        bodies(&root),
        vec![("v2", PublicationState::Unpublished), ("v1", PublicationState::Published)]
    );
}

#[tokio::test]
async fn editing_a_pending_version_overwrites_it() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "s", "draft")).await.unwrap();
    let edited = h.backend.edit_message(&bob.token, edit(msg.id, "draft 2")).await.unwrap();
    assert_eq!(edited.state, PublicationState::Unpublished);

    let root = full_root(&h, &alice, msg.tree_id).await;
    assert_eq!(bodies(&root), vec![("draft 2", PublicationState::Unpublished)]);
}

#[tokio::test]
async fn forum_owner_edits_stay_published() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;
    let msg = h.backend.create_message(&alice.token, new_message(forum.id, "s", "v1")).await.unwrap();
    h.tick();

    // Only the author edits.
    let err = h.backend.edit_message(&bob.token, edit(msg.id, "x")).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
    let edited = h.backend.edit_message(&alice.token, edit(msg.id, "v2")).await.unwrap();
    assert_eq!(edited.state, PublicationState::Published);
    assert_eq!(full_root(&h, &alice, msg.tree_id).await.versions.len(), 2);
}

#[tokio::test]
async fn unmoderated_edits_publish_and_grow_history() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "s", "v1")).await.unwrap();
    for body in ["v2", "v3"] {
        h.tick();
        let edited = h.backend.edit_message(&bob.token, edit(msg.id, body)).await.unwrap();
        assert_eq!(edited.state, PublicationState::Published);
    }
    let root = full_root(&h, &alice, msg.tree_id).await;
    assert_eq!(root.versions.iter().map(|v| v.body.as_str()).collect::<Vec<_>>(), ["v3", "v2", "v1"]);
}

#[tokio::test]
async fn rejecting_pending_edit_restores_previous_version() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "s", "v1")).await.unwrap();
    h.backend.publish(&alice.token, PublishRequest { message_id: msg.id, decision: Decision::Yes }).await.unwrap();
    h.tick();
    h.backend.edit_message(&bob.token, edit(msg.id, "v2")).await.unwrap();

    let outcome = h
        .backend
        .publish(&alice.token, PublishRequest { message_id: msg.id, decision: Decision::No })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        DecisionOutcome::Reverted { id: msg.id, state: PublicationState::Published }
    );
    let root = full_root(&h, &alice, msg.tree_id).await;
    assert_eq!(bodies(&root), vec![("v1", PublicationState::Published)]);
}

#[tokio::test]
async fn readers_keep_seeing_published_version_during_review() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let carol = h.actor("carol");
    let forum = h.forum(&alice, "a", ForumType::Moderated).await;

    let msg = h.backend.create_message(&bob.token, new_message(forum.id, "s", "v1")).await.unwrap();
    h.backend.publish(&alice.token, PublishRequest { message_id: msg.id, decision: Decision::Yes }).await.unwrap();
    h.tick();
    h.backend.edit_message(&bob.token, edit(msg.id, "v2")).await.unwrap();

    let asks_for_all = TreeQuery { include_unpublished: true, ..TreeQuery::default() };
    let seen_by_carol = h.backend.get_tree(Some(&carol.token), msg.tree_id, asks_for_all).await.unwrap();
    assert_eq!(bodies(&seen_by_carol.root), vec![("v1", PublicationState::Published)]);

    let seen_by_bob = h.backend.get_tree(Some(&bob.token), msg.tree_id, asks_for_all).await.unwrap();
    assert_eq!(bodies(&seen_by_bob.root), vec![("v2", PublicationState::Unpublished)]);

    let anonymous = h.backend.get_tree(None, msg.tree_id, TreeQuery::default()).await.unwrap();
    assert_eq!(bodies(&anonymous.root), vec![("v1", PublicationState::Published)]);
}

#[tokio::test]
async fn frozen_forum_refuses_edits() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;
    let msg = h.backend.create_message(&alice.token, new_message(forum.id, "s", "v1")).await.unwrap();

    h.backend.set_forum_readonly(&alice.token, forum.id, true).await.unwrap();
    let err = h.backend.edit_message(&alice.token, edit(msg.id, "v2")).await.unwrap_err();
    assert_eq!(err, DomainError::ForumReadOnly(forum.id));
}

//! Forum creation and the read-only switch.

use domains::{DomainError, ForumType};
use integration_tests::{new_message, Harness};
use services::dto::CreateForumRequest;

fn request(name: &str) -> CreateForumRequest {
    CreateForumRequest { name: name.into(), forum_type: ForumType::Unmoderated }
}

#[tokio::test]
async fn forum_names_are_trimmed_and_unique() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");

    let forum = h.backend.create_forum(&alice.token, request("  general ")).await.unwrap();
    assert_eq!(forum.name, "general");
    assert_eq!(forum.owner, alice.user.id);
    assert!(!forum.readonly);

    let err = h.backend.create_forum(&bob.token, request("general")).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)), "{err:?}");
}

#[tokio::test]
async fn forum_names_are_validated() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let max = h.backend.config().max_forum_name_length;

    let err = h.backend.create_forum(&alice.token, request("   ")).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let too_long = "x".repeat(max + 1);
    let err = h.backend.create_forum(&alice.token, request(&too_long)).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    h.backend.create_forum(&alice.token, request(&"x".repeat(max))).await.unwrap();
}

#[tokio::test]
async fn banned_users_cannot_open_forums() {
    let h = Harness::new();
    let mut bob = h.actor("bob");
    let max = h.backend.config().max_ban_count;
    h.update(&mut bob, |u| u.ban_count = max);

    let err = h.backend.create_forum(&bob.token, request("bob's")).await.unwrap_err();
    assert_eq!(err, DomainError::UserBanned(bob.user.id));
}

#[tokio::test]
async fn owner_or_superuser_toggles_read_only() {
    let h = Harness::new();
    let alice = h.actor("alice");
    let bob = h.actor("bob");
    let admin = h.superuser("admin");
    let forum = h.forum(&alice, "a", ForumType::Unmoderated).await;

    let err = h.backend.set_forum_readonly(&bob.token, forum.id, true).await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));

    let frozen = h.backend.set_forum_readonly(&admin.token, forum.id, true).await.unwrap();
    assert!(frozen.readonly);
    let err = h.backend.create_message(&alice.token, new_message(forum.id, "t", "t")).await.unwrap_err();
    assert_eq!(err, DomainError::ForumReadOnly(forum.id));

    let thawed = h.backend.set_forum_readonly(&alice.token, forum.id, false).await.unwrap();
    assert!(!thawed.readonly);
    h.backend.create_message(&alice.token, new_message(forum.id, "t", "t")).await.unwrap();
}

#[tokio::test]
async fn read_only_forum_type_never_accepts_posts() {
    let h = Harness::new();
    let admin = h.superuser("admin");
    let forum = h.forum(&admin, "news", ForumType::ReadOnly).await;

    let err = h.backend.create_message(&admin.token, new_message(forum.id, "t", "t")).await.unwrap_err();
    assert_eq!(err, DomainError::ForumReadOnly(forum.id));

    let err = h.backend.set_forum_readonly(&admin.token, domains::ForumId::new(), true).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { kind: "forum", .. }));
}

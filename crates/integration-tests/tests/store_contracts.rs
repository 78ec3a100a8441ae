//! Storage contract checks against the in-memory store.

use integration_tests::contracts;
use storage_adapters::InMemoryStore;

#[tokio::test]
async fn forum_names_are_unique() {
    contracts::forum_names_are_unique(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn readonly_flag_is_stored() {
    contracts::readonly_flag_is_stored(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn comments_link_in_creation_order() {
    contracts::comments_link_in_creation_order(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn split_moves_the_whole_subtree() {
    contracts::split_moves_the_whole_subtree(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn deleting_a_tree_removes_everything_in_it() {
    contracts::deleting_a_tree_removes_everything_in_it(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn only_leaves_are_deleted() {
    contracts::only_leaves_are_deleted(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn history_changes_apply_to_the_head() {
    contracts::history_changes_apply_to_the_head(&InMemoryStore::new()).await.unwrap();
}

#[tokio::test]
async fn one_rating_per_user() {
    contracts::one_rating_per_user(&InMemoryStore::new()).await.unwrap();
}

//! forum-core/crates/domains/src/lib.rs
//!
//! Entities, ports and the error taxonomy of the forum message engine.
//! Nothing in this crate performs I/O; adapters live in `storage-adapters`
//! and the business rules live in `services`.

pub mod errors;
pub mod history;
pub mod ids;
pub mod models;
pub mod ports;
pub mod views;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use history::*;
pub use ids::*;
pub use models::*;
pub use ports::*;
pub use views::*;

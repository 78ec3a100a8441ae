//! forum-core/crates/services/src/lib.rs
//!
//! Business rules of the forum message engine: moderation, branch splits,
//! ratings and tree queries, plus the request-level [`ForumBackend`].
//! Everything here talks to storage through the ports in `domains`.

pub mod backend;
pub mod branch;
pub mod context;
pub mod dto;
pub mod forum;
pub mod guards;
pub mod moderation;
pub mod query;
pub mod rating;

pub use backend::ForumBackend;
pub use branch::{BranchSplitter, NewBranch};
pub use context::{EngineConfig, Ports};
pub use forum::ForumService;
pub use moderation::{
    state_for_new_content, DecisionOutcome, Deletion, Edit, ModerationEngine, NewMessage,
    WriteResponse,
};
pub use query::{restrict, TreeQueryEngine, Visibility};
pub use rating::RatingAggregator;

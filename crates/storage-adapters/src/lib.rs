//! Storage adapters implementing the repository ports in `domains`.
//!
//! The in-memory store is always available and backs the seed binary and
//! the integration tests. The PostgreSQL store sits behind `db-postgres`.

pub mod memory;
pub mod sessions;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::InMemoryStore;
pub use sessions::InMemorySessions;

#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;

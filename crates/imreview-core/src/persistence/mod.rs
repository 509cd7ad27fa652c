//! Persistence layer for imreview state
//!
//! Provides SQLite-backed storage for users, manuscripts, reviews, and the
//! event log.

mod repository;
mod schema;

pub use repository::Repository;
pub use schema::Schema;

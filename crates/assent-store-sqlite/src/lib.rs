//! SQLite backend for the consent service and the event directory.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Uniqueness of the active consent per
//! key and the "still Pending" update precondition are both enforced by the
//! database, not by the caller.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

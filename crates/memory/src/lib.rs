//! Session store implementations for Threadline.
//!
//! - [`InMemoryStore`] backs the `temporary` mode
//! - [`SqliteStore`] backs the `persistent` mode

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

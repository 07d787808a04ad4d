//! Persistence layer: forum queries, preferences, and the libSQL backend.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ForumStore, PreferenceStore};

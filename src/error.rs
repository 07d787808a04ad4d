//! Error types for the forum activity job.

use crate::activity::Phase;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DatabaseError {
    /// The store itself could not be reached, as opposed to a single
    /// statement failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Pool(_))
    }
}

/// Mail transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail transport failed: {reason}")]
    Transport { reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("None of the {skipped} recipient address(es) could be parsed")]
    NoValidRecipients { skipped: usize },

    /// The notification went out but some posts could not be marked as
    /// notified. Each entry is a post id and the store error.
    #[error("Notification sent but {} post(s) could not be marked queued", .failed.len())]
    StateNotRecorded { failed: Vec<(i64, String)> },
}

/// Conditions that abort a run.
///
/// Per-post failures are not represented here; they are recorded in the
/// [`RunReport`](crate::activity::RunReport) and the run carries on.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{phase} phase could not fetch posts: {source}")]
    Fetch {
        phase: Phase,
        #[source]
        source: DatabaseError,
    },

    #[error("{phase} phase could not look up recipients: {source}")]
    RecipientLookup {
        phase: Phase,
        #[source]
        source: DatabaseError,
    },

    #[error("Preference lookup for user {user_id} failed: {source}")]
    Preference {
        user_id: i64,
        #[source]
        source: DatabaseError,
    },

    #[error("New-post notification for {posts} post(s) failed: {source}")]
    NotifyBatch {
        posts: usize,
        #[source]
        source: MailError,
    },
}

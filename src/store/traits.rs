//! Store traits: the forum data the activity job reads and advances.
//!
//! The job owns no persistent state of its own; everything lives behind
//! these two traits.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::forum::{MailedState, Post, User};

/// Post, topic and user queries plus the single mailed-state mutation.
#[async_trait]
pub trait ForumStore: Send + Sync {
    // ── Posts ───────────────────────────────────────────────────────

    /// Posts in `PendingNotify`, joined with topic and author.
    async fn posts_pending_notify(&self) -> Result<Vec<Post>, DatabaseError>;

    /// Posts in `Queued`.
    async fn posts_queued(&self) -> Result<Vec<Post>, DatabaseError>;

    /// Posts in `ReadyToSend`.
    async fn posts_ready_to_send(&self) -> Result<Vec<Post>, DatabaseError>;

    /// Advance a post's mailed state. Backward moves are rejected with
    /// [`DatabaseError::Constraint`].
    async fn set_post_state(&self, post_id: i64, state: MailedState) -> Result<(), DatabaseError>;

    // ── Recipients ──────────────────────────────────────────────────

    /// Users subscribed to new-post alerts.
    async fn users_for_notification(&self) -> Result<Vec<User>, DatabaseError>;

    /// Users subscribed to the activity mailing.
    async fn users_for_sending(&self) -> Result<Vec<User>, DatabaseError>;
}

/// Per-user, per-domain key/value settings.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Read a setting, returning `default` when it is not stored.
    async fn get_preference(
        &self,
        user_id: i64,
        domain: &str,
        key: &str,
        default: &str,
    ) -> Result<String, DatabaseError>;
}

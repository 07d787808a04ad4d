//! Auto-send preference lookup.

use std::sync::Arc;

use tracing::warn;

use crate::activity::{FailureKind, Phase, RunReport};
use crate::error::{DatabaseError, RunError};
use crate::forum::{Post, SendPreference};
use crate::store::PreferenceStore;

/// Preference domain the forum settings live under.
pub const PREFERENCE_DOMAIN: &str = "forum";

/// Setting that opts an author into auto-send.
pub const AUTOMATIC_SEND_KEY: &str = "automatic_send";

/// Value assumed when the author never set a preference.
pub const AUTOMATIC_SEND_DEFAULT: &str = "0";

/// Resolves an author's auto-send preference.
///
/// Every call goes to the store, so a preference changed between phases is
/// honored by the later phase.
#[derive(Clone)]
pub struct PreferenceResolver {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// A store failure is returned as-is, never defaulted to `Manual`.
    pub async fn resolve(&self, user_id: i64) -> Result<SendPreference, DatabaseError> {
        let value = self
            .store
            .get_preference(
                user_id,
                PREFERENCE_DOMAIN,
                AUTOMATIC_SEND_KEY,
                AUTOMATIC_SEND_DEFAULT,
            )
            .await?;
        Ok(SendPreference::from_setting(&value))
    }

    /// Resolve the preference of `post`'s author within a phase.
    ///
    /// An unreachable store aborts the run. Any other lookup failure is
    /// recorded against the post and `None` is returned; the post keeps its
    /// state and is retried next run.
    pub async fn resolve_for_post(
        &self,
        post: &Post,
        phase: Phase,
        report: &mut RunReport,
    ) -> Result<Option<SendPreference>, RunError> {
        match self.resolve(post.user_id).await {
            Ok(preference) => Ok(Some(preference)),
            Err(source) if source.is_unavailable() => Err(RunError::Preference {
                user_id: post.user_id,
                source,
            }),
            Err(e) => {
                warn!(
                    %phase,
                    post_id = post.id,
                    user_id = post.user_id,
                    error = %e,
                    "Preference lookup failed, post left for next run"
                );
                report.record_failure(phase, post.id, FailureKind::Preference, e.to_string());
                Ok(None)
            }
        }
    }
}

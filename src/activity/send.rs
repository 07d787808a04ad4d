//! Send phase: one activity mail per ready post, then mark it sent.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::activity::{FailureKind, Phase, RunReport, advance};
use crate::error::RunError;
use crate::forum::MailedState;
use crate::mail::Mailer;
use crate::store::ForumStore;

/// Mails each ready post to the activity subscribers.
pub struct SendDispatcher {
    store: Arc<dyn ForumStore>,
    mailer: Arc<dyn Mailer>,
}

impl SendDispatcher {
    pub fn new(store: Arc<dyn ForumStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Run the send phase.
    ///
    /// Posts are independent: a failed send or state update is recorded and
    /// the remaining posts are still processed.
    pub async fn send(&self, report: &mut RunReport) -> Result<(), RunError> {
        let posts = self
            .store
            .posts_ready_to_send()
            .await
            .map_err(|source| RunError::Fetch {
                phase: Phase::Send,
                source,
            })?;

        if posts.is_empty() {
            return Ok(());
        }

        let recipients = self
            .store
            .users_for_sending()
            .await
            .map_err(|source| RunError::RecipientLookup {
                phase: Phase::Send,
                source,
            })?;

        for post in posts {
            info!(
                post_id = post.id,
                "Sending activity for post in {} by {}",
                post.topic.title,
                post.author.username
            );

            if let Err(e) = self
                .mailer
                .send_activity_notification(&post, &recipients)
                .await
            {
                warn!(post_id = post.id, error = %e, "Activity mail failed, post left ready");
                report.record_failure(Phase::Send, post.id, FailureKind::Dispatch, e.to_string());
                continue;
            }

            if advance(
                self.store.as_ref(),
                &post,
                MailedState::Sent,
                Phase::Send,
                report,
            )
            .await
            {
                report.sent.push(post.id);
            } else {
                error!(
                    post_id = post.id,
                    "Activity mail went out but post is still ready; next run will send it again"
                );
            }
        }

        Ok(())
    }
}

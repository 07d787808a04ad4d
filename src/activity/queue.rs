//! Queue phase: re-check queued posts and report the ones still held.

use std::sync::Arc;

use tracing::{debug, info};

use crate::activity::{
    NotifyOutcome, Phase, PreferenceResolver, QueueReportEntry, RunReport, advance,
};
use crate::config::SiteConfig;
use crate::error::RunError;
use crate::forum::{MailedState, SendPreference};
use crate::store::ForumStore;

/// Releases queued posts whose author switched to auto-send, and reports
/// the rest when this run sent a new-post notification.
pub struct QueueReporter {
    store: Arc<dyn ForumStore>,
    resolver: PreferenceResolver,
    site: SiteConfig,
}

impl QueueReporter {
    pub fn new(store: Arc<dyn ForumStore>, resolver: PreferenceResolver, site: SiteConfig) -> Self {
        Self {
            store,
            resolver,
            site,
        }
    }

    /// Run the queue phase.
    ///
    /// Queue entries are only reported alongside a live notification: with
    /// `sent_any_notification == false` manual posts are left silently.
    pub async fn report(
        &self,
        outcome: &NotifyOutcome,
        report: &mut RunReport,
    ) -> Result<(), RunError> {
        let posts = self
            .store
            .posts_queued()
            .await
            .map_err(|source| RunError::Fetch {
                phase: Phase::Queue,
                source,
            })?;

        for post in posts {
            let Some(preference) = self
                .resolver
                .resolve_for_post(&post, Phase::Queue, report)
                .await?
            else {
                continue;
            };
            if preference == SendPreference::Auto {
                info!(
                    post_id = post.id,
                    "Automatically sending {} by {}",
                    post.topic.title,
                    post.author.username
                );
                if advance(
                    self.store.as_ref(),
                    &post,
                    MailedState::ReadyToSend,
                    Phase::Queue,
                    report,
                )
                .await
                {
                    report.auto_sent.push(post.id);
                }
                continue;
            }

            if !outcome.sent_any_notification {
                debug!(post_id = post.id, "Queued post not reported, no notification this run");
                continue;
            }

            let link = self.site.topic_url(&post.topic.full_link_name);
            info!(
                post_id = post.id,
                "Queued post in {} by {}",
                post.topic.title,
                post.author.username
            );
            info!(post_id = post.id, "{}", link);
            report.queued.push(QueueReportEntry {
                post_id: post.id,
                title: post.topic.title.clone(),
                author: post.author.username.clone(),
                link,
            });
        }

        Ok(())
    }
}

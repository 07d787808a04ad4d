//! Notify phase: auto-advance or batch each post awaiting its first notice.

use std::sync::Arc;

use tracing::{error, info};

use crate::activity::{FailureKind, Phase, PreferenceResolver, RunReport, advance};
use crate::error::{MailError, RunError};
use crate::forum::{MailedState, SendPreference};
use crate::mail::Mailer;
use crate::store::ForumStore;

/// Result of the notify phase, handed to the queue phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyOutcome {
    /// The combined new-post notification went out this run.
    pub sent_any_notification: bool,
}

/// Decides, per pending post, between auto-send and the new-post batch.
pub struct NotificationDispatcher {
    store: Arc<dyn ForumStore>,
    resolver: PreferenceResolver,
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn ForumStore>,
        resolver: PreferenceResolver,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            resolver,
            mailer,
        }
    }

    /// Run the notify phase.
    ///
    /// Auto-send posts move to `ReadyToSend`. Manual posts keep their state
    /// and are carried by exactly one new-post notification, sent only when
    /// the batch is non-empty.
    pub async fn dispatch(&self, report: &mut RunReport) -> Result<NotifyOutcome, RunError> {
        let posts = self
            .store
            .posts_pending_notify()
            .await
            .map_err(|source| RunError::Fetch {
                phase: Phase::Notify,
                source,
            })?;

        let mut batch = Vec::new();
        for post in posts {
            let Some(preference) = self
                .resolver
                .resolve_for_post(&post, Phase::Notify, report)
                .await?
            else {
                continue;
            };
            match preference {
                SendPreference::Auto => {
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
                        Phase::Notify,
                        report,
                    )
                    .await
                    {
                        report.auto_sent.push(post.id);
                    }
                }
                SendPreference::Manual => {
                    info!(
                        post_id = post.id,
                        "Notifying for post in {} by {}",
                        post.topic.title,
                        post.author.username
                    );
                    batch.push(post);
                }
            }
        }

        if batch.is_empty() {
            return Ok(NotifyOutcome::default());
        }

        let recipients = self
            .store
            .users_for_notification()
            .await
            .map_err(|source| RunError::RecipientLookup {
                phase: Phase::Notify,
                source,
            })?;

        match self
            .mailer
            .send_new_post_notification(&batch, &recipients)
            .await
        {
            Ok(()) => {}
            // Delivered, but some posts were not marked; they will be
            // notified again next run.
            Err(MailError::StateNotRecorded { failed }) => {
                for (post_id, reason) in failed {
                    report.record_failure(Phase::Notify, post_id, FailureKind::Transition, reason);
                }
            }
            Err(source) => {
                error!(posts = batch.len(), error = %source, "New-post notification failed");
                return Err(RunError::NotifyBatch {
                    posts: batch.len(),
                    source,
                });
            }
        }

        info!(
            posts = batch.len(),
            recipients = recipients.len(),
            "New-post notification sent"
        );
        report.notified.extend(batch.iter().map(|p| p.id));
        report.sent_any_notification = true;
        Ok(NotifyOutcome {
            sent_any_notification: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::QueueOnDelivery;
    use crate::testing::{MemoryStore, RecordingMailer, post, user};

    fn dispatcher(store: &Arc<MemoryStore>, mailer: &Arc<RecordingMailer>) -> NotificationDispatcher {
        NotificationDispatcher::new(
            store.clone(),
            PreferenceResolver::new(store.clone()),
            mailer.clone(),
        )
    }

    #[tokio::test]
    async fn auto_post_ready_manual_post_batched() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        store.add_post(post(2, 20, "Post B", MailedState::PendingNotify));
        store.set_automatic_send(10, "1");
        store.set_automatic_send(20, "0");
        store.set_notify_users(vec![user(90), user(91)]);
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        let outcome = dispatcher(&store, &mailer).dispatch(&mut report).await.unwrap();

        assert!(outcome.sent_any_notification);
        assert_eq!(store.state_of(1), Some(MailedState::ReadyToSend));
        assert_eq!(store.state_of(2), Some(MailedState::PendingNotify));
        assert_eq!(mailer.new_post_calls(), vec![(vec![2], vec![90, 91])]);
        assert_eq!(report.auto_sent, vec![1]);
        assert_eq!(report.notified, vec![2]);
        assert!(report.sent_any_notification);
    }

    #[tokio::test]
    async fn manual_posts_share_one_call() {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=3 {
            store.add_post(post(id, id * 10, "Topic", MailedState::PendingNotify));
        }
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        dispatcher(&store, &mailer).dispatch(&mut report).await.unwrap();

        let calls = mailer.new_post_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![1, 2, 3]);
        assert!(store.transitions().is_empty());
    }

    #[tokio::test]
    async fn nothing_pending_sends_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        let outcome = dispatcher(&store, &mailer).dispatch(&mut report).await.unwrap();

        assert!(!outcome.sent_any_notification);
        assert!(mailer.new_post_calls().is_empty());
    }

    #[tokio::test]
    async fn all_auto_sends_no_notification() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        store.set_automatic_send(10, "1");
        // Recipient lookup would fail if it were reached.
        store.fail_recipients();
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        let outcome = dispatcher(&store, &mailer).dispatch(&mut report).await.unwrap();

        assert!(!outcome.sent_any_notification);
        assert!(mailer.new_post_calls().is_empty());
        assert_eq!(store.state_of(1), Some(MailedState::ReadyToSend));
    }

    #[tokio::test]
    async fn failed_transition_skips_post_and_continues() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        store.add_post(post(2, 10, "Post B", MailedState::PendingNotify));
        store.set_automatic_send(10, "1");
        store.fail_transition(1);
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        dispatcher(&store, &mailer).dispatch(&mut report).await.unwrap();

        assert_eq!(store.state_of(1), Some(MailedState::PendingNotify));
        assert_eq!(store.state_of(2), Some(MailedState::ReadyToSend));
        assert_eq!(report.auto_sent, vec![2]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].post_id, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Transition);
        assert!(mailer.new_post_calls().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        let mailer = Arc::new(RecordingMailer::new());
        mailer.fail_new_post();

        let mut report = RunReport::default();
        let err = dispatcher(&store, &mailer)
            .dispatch(&mut report)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::NotifyBatch { posts: 1, .. }));
        assert!(!report.sent_any_notification);
        assert!(report.notified.is_empty());
    }

    #[tokio::test]
    async fn preference_failure_aborts_before_any_change() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        store.set_automatic_send(10, "1");
        store.fail_preferences();
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        let err = dispatcher(&store, &mailer)
            .dispatch(&mut report)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Preference { user_id: 10, .. }));
        assert_eq!(store.state_of(1), Some(MailedState::PendingNotify));
        assert!(mailer.new_post_calls().is_empty());
    }

    #[tokio::test]
    async fn one_author_lookup_failure_skips_only_their_post() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        store.add_post(post(2, 20, "Post B", MailedState::PendingNotify));
        store.add_post(post(3, 30, "Post C", MailedState::PendingNotify));
        store.set_automatic_send(20, "1");
        store.fail_preference_for(10);
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        let outcome = dispatcher(&store, &mailer).dispatch(&mut report).await.unwrap();

        assert_eq!(store.state_of(1), Some(MailedState::PendingNotify));
        assert_eq!(store.state_of(2), Some(MailedState::ReadyToSend));
        assert!(outcome.sent_any_notification);
        assert_eq!(mailer.new_post_calls()[0].0, vec![3]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].post_id, 1);
        assert_eq!(report.failures[0].kind, FailureKind::Preference);
    }

    #[tokio::test]
    async fn unrecorded_queue_state_is_a_post_failure() {
        let store = Arc::new(MemoryStore::new());
        store.add_post(post(1, 10, "Post A", MailedState::PendingNotify));
        store.add_post(post(2, 20, "Post B", MailedState::PendingNotify));
        store.fail_transition(1);
        let mailer = Arc::new(QueueOnDelivery::new(RecordingMailer::new(), store.clone()));
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            PreferenceResolver::new(store.clone()),
            mailer,
        );

        let mut report = RunReport::default();
        let outcome = dispatcher.dispatch(&mut report).await.unwrap();

        assert!(outcome.sent_any_notification);
        assert_eq!(report.notified, vec![1, 2]);
        assert_eq!(store.state_of(1), Some(MailedState::PendingNotify));
        assert_eq!(store.state_of(2), Some(MailedState::Queued));
        assert!(report.has_failures());
        assert_eq!(report.failures[0].post_id, 1);
        assert_eq!(report.failures[0].phase, Phase::Notify);
        assert_eq!(report.failures[0].kind, FailureKind::Transition);
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_fetch();
        let mailer = Arc::new(RecordingMailer::new());

        let mut report = RunReport::default();
        let err = dispatcher(&store, &mailer)
            .dispatch(&mut report)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Fetch {
                phase: Phase::Notify,
                ..
            }
        ));
    }
}

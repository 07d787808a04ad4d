//! Run orchestrator: notify, report queue, send, in that order.

use std::sync::Arc;

use tracing::info;

use crate::activity::{
    NotificationDispatcher, PreferenceResolver, QueueReporter, RunReport, SendDispatcher,
};
use crate::config::SiteConfig;
use crate::error::RunError;
use crate::mail::Mailer;
use crate::store::{ForumStore, PreferenceStore};

/// Sequences the three phases of one run. Holds no state between runs.
///
/// Runs must not overlap: the scheduler invoking the job guarantees at most
/// one run at a time.
pub struct ActivityRunner {
    notify: NotificationDispatcher,
    queue: QueueReporter,
    send: SendDispatcher,
}

impl ActivityRunner {
    pub fn new(
        store: Arc<dyn ForumStore>,
        preferences: Arc<dyn PreferenceStore>,
        mailer: Arc<dyn Mailer>,
        site: SiteConfig,
    ) -> Self {
        let resolver = PreferenceResolver::new(preferences);
        Self {
            notify: NotificationDispatcher::new(
                Arc::clone(&store),
                resolver.clone(),
                Arc::clone(&mailer),
            ),
            queue: QueueReporter::new(Arc::clone(&store), resolver, site),
            send: SendDispatcher::new(store, mailer),
        }
    }

    /// Perform one run.
    ///
    /// A fatal error stops the run where it happened; what already committed
    /// stays committed and skipped posts are retried by the next run.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        info!("Forum activity run started");
        let mut report = RunReport::default();

        let outcome = self.notify.dispatch(&mut report).await?;
        self.queue.report(&outcome, &mut report).await?;
        self.send.send(&mut report).await?;

        info!(
            auto_sent = report.auto_sent.len(),
            notified = report.notified.len(),
            queued_reported = report.queued.len(),
            sent = report.sent.len(),
            failures = report.failures.len(),
            "Forum activity run finished"
        );
        Ok(report)
    }
}

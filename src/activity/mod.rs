//! Notification lifecycle: the three phases of a run and their sequencing.
//!
//! A run is a single pass: notify, then report the queue, then send. All
//! state lives in the store; nothing is carried between runs.

pub mod notify;
pub mod preference;
pub mod queue;
pub mod report;
pub mod runner;
pub mod send;

use tracing::warn;

use crate::forum::{MailedState, Post};
use crate::store::ForumStore;

pub use notify::{NotificationDispatcher, NotifyOutcome};
pub use preference::PreferenceResolver;
pub use queue::QueueReporter;
pub use report::{FailureKind, Phase, PostFailure, QueueReportEntry, RunReport};
pub use runner::ActivityRunner;
pub use send::SendDispatcher;

/// Move `post` to `target`, recording a transition failure on error.
///
/// Returns whether the store accepted the move.
async fn advance(
    store: &dyn ForumStore,
    post: &Post,
    target: MailedState,
    phase: Phase,
    report: &mut RunReport,
) -> bool {
    if !post.mailed_state.can_advance_to(target) {
        let reason = format!("cannot move from {} to {}", post.mailed_state, target);
        warn!(%phase, post_id = post.id, "Skipping post: {}", reason);
        report.record_failure(phase, post.id, FailureKind::Transition, reason);
        return false;
    }

    match store.set_post_state(post.id, target).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                %phase,
                post_id = post.id,
                target = %target,
                error = %e,
                "State update failed, post left for next run"
            );
            report.record_failure(phase, post.id, FailureKind::Transition, e.to_string());
            false
        }
    }
}

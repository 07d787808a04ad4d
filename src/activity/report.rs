//! Run report: what a run did, and what it could not do.

use serde::Serialize;

/// The three phases of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Notify,
    Queue,
    Send,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notify => write!(f, "notify"),
            Self::Queue => write!(f, "queue"),
            Self::Send => write!(f, "send"),
        }
    }
}

/// Why a single post was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The state mutation failed; the post keeps its state until next run.
    Transition,
    /// The mail hand-off for this post failed.
    Dispatch,
    /// The author's auto-send preference could not be read.
    Preference,
}

/// A post that could not be processed this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostFailure {
    pub phase: Phase,
    pub post_id: i64,
    pub kind: FailureKind,
    pub reason: String,
}

/// A still-queued post worth showing alongside a live notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueReportEntry {
    pub post_id: i64,
    pub title: String,
    pub author: String,
    pub link: String,
}

/// Accumulated outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Posts advanced straight to ready-to-send by an auto-send author.
    pub auto_sent: Vec<i64>,
    /// Posts carried by the new-post notification.
    pub notified: Vec<i64>,
    pub sent_any_notification: bool,
    pub queued: Vec<QueueReportEntry>,
    /// Posts whose activity mail went out and were marked sent.
    pub sent: Vec<i64>,
    pub failures: Vec<PostFailure>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn record_failure(
        &mut self,
        phase: Phase,
        post_id: i64,
        kind: FailureKind,
        reason: impl Into<String>,
    ) {
        self.failures.push(PostFailure {
            phase,
            post_id,
            kind,
            reason: reason.into(),
        });
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Auto-sent: {} post(s)", self.auto_sent.len())?;
        writeln!(
            f,
            "Notified: {} post(s){}",
            self.notified.len(),
            if self.sent_any_notification { " in one batch" } else { "" }
        )?;
        for entry in &self.queued {
            writeln!(f, "Queued post in {} by {}", entry.title, entry.author)?;
            writeln!(f, "{}", entry.link)?;
        }
        writeln!(f, "Sent: {} post(s)", self.sent.len())?;
        for failure in &self.failures {
            writeln!(
                f,
                "Failed ({} phase, post {}, {:?}): {}",
                failure.phase, failure.post_id, failure.kind, failure.reason
            )?;
        }
        Ok(())
    }
}

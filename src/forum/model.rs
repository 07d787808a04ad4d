//! Posts, topics, users and the mailed-state lifecycle.

use serde::{Deserialize, Serialize};

/// Where a post is in the notification lifecycle.
///
/// Ordered: `PendingNotify → Queued → ReadyToSend → Sent`, with the
/// `PendingNotify → ReadyToSend` fast path for auto-send authors. The state
/// never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailedState {
    /// Awaiting the first notification decision.
    PendingNotify,
    /// Notified to reviewers, waiting for release.
    Queued,
    /// Cleared for the activity mailing.
    ReadyToSend,
    /// Activity mail handed off.
    Sent,
}

impl MailedState {
    /// Integer stored in the `activity_mailed` column.
    pub const fn as_db(self) -> i64 {
        match self {
            Self::PendingNotify => 0,
            Self::Queued => 1,
            Self::ReadyToSend => 2,
            Self::Sent => 3,
        }
    }

    /// Parse the `activity_mailed` column.
    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::PendingNotify),
            1 => Some(Self::Queued),
            2 => Some(Self::ReadyToSend),
            3 => Some(Self::Sent),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a forward step.
    pub fn can_advance_to(self, next: MailedState) -> bool {
        next > self
    }
}

impl std::fmt::Display for MailedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingNotify => write!(f, "pending_notify"),
            Self::Queued => write!(f, "queued"),
            Self::ReadyToSend => write!(f, "ready_to_send"),
            Self::Sent => write!(f, "sent"),
        }
    }
}

impl std::str::FromStr for MailedState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_notify" => Ok(Self::PendingNotify),
            "queued" => Ok(Self::Queued),
            "ready_to_send" => Ok(Self::ReadyToSend),
            "sent" => Ok(Self::Sent),
            _ => Err(format!("Unknown mailed state: {}", s)),
        }
    }
}

/// A forum user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// A discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    /// Canonical link path, appended to `/discussions/`.
    pub full_link_name: String,
}

/// A forum post joined with its topic and author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub topic: Topic,
    pub author: User,
    pub mailed_state: MailedState,
}

/// A user's `automatic_send` preference, resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendPreference {
    /// Posts skip review and go straight to ready-to-send.
    Auto,
    /// Posts are held for the new-post notification.
    Manual,
}

impl SendPreference {
    /// `Auto` iff the stored value is exactly `"1"`.
    pub fn from_setting(value: &str) -> Self {
        if value == "1" { Self::Auto } else { Self::Manual }
    }
}

impl std::fmt::Display for SendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

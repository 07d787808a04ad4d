//! Outbound mail: the transport seam the activity phases hand off to.
//!
//! The phases only decide *that* a notification goes out and to whom.
//! Implementations of [`Mailer`] decide how it travels.

pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SiteConfig;
use crate::error::MailError;
use crate::forum::{MailedState, Post, User};
use crate::store::ForumStore;

pub use smtp::SmtpMailer;

/// Outbound messaging interface.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// One combined "new post" notification covering every post in `posts`.
    async fn send_new_post_notification(
        &self,
        posts: &[Post],
        recipients: &[User],
    ) -> Result<(), MailError>;

    /// One "activity" mail scoped to a single post.
    async fn send_activity_notification(
        &self,
        post: &Post,
        recipients: &[User],
    ) -> Result<(), MailError>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    async fn send_new_post_notification(
        &self,
        posts: &[Post],
        recipients: &[User],
    ) -> Result<(), MailError> {
        (**self).send_new_post_notification(posts, recipients).await
    }

    async fn send_activity_notification(
        &self,
        post: &Post,
        recipients: &[User],
    ) -> Result<(), MailError> {
        (**self).send_activity_notification(post, recipients).await
    }
}

// ── Message text ────────────────────────────────────────────────────

/// Subject and plain-text body of the combined new-post notification.
pub fn new_post_message(posts: &[Post], site: &SiteConfig) -> (String, String) {
    let subject = match posts {
        [single] => format!("New forum post in {}", single.topic.title),
        _ => format!("{} new forum posts awaiting review", posts.len()),
    };
    let body = posts
        .iter()
        .map(|post| summary_line(post, site))
        .collect::<Vec<_>>()
        .join("\n");
    (subject, body)
}

/// Subject and plain-text body of a single-post activity mail.
pub fn activity_message(post: &Post, site: &SiteConfig) -> (String, String) {
    (
        format!("Forum activity: {}", post.topic.title),
        summary_line(post, site),
    )
}

fn summary_line(post: &Post, site: &SiteConfig) -> String {
    format!(
        "{} by {}: {}",
        post.topic.title,
        post.author.username,
        site.topic_url(&post.topic.full_link_name)
    )
}

// ── Dry-run transport ───────────────────────────────────────────────

/// Transport that logs each message instead of sending it.
pub struct LogMailer {
    site: SiteConfig,
}

impl LogMailer {
    pub fn new(site: SiteConfig) -> Self {
        Self { site }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_new_post_notification(
        &self,
        posts: &[Post],
        recipients: &[User],
    ) -> Result<(), MailError> {
        let (subject, _) = new_post_message(posts, &self.site);
        info!(
            posts = posts.len(),
            recipients = recipients.len(),
            %subject,
            "Dry run: new-post notification not sent"
        );
        Ok(())
    }

    async fn send_activity_notification(
        &self,
        post: &Post,
        recipients: &[User],
    ) -> Result<(), MailError> {
        let (subject, _) = activity_message(post, &self.site);
        info!(
            post_id = post.id,
            recipients = recipients.len(),
            %subject,
            "Dry run: activity mail not sent"
        );
        Ok(())
    }
}

// ── Delivery confirmation ───────────────────────────────────────────

/// Marks posts `Queued` once their new-post notification was handed off.
///
/// The notify phase never changes the state of posts it batches; this
/// wrapper is the mail side recording that the batch went out. A post
/// whose state cannot be recorded stays `PendingNotify` and is reported
/// through [`MailError::StateNotRecorded`].
pub struct QueueOnDelivery<M> {
    inner: M,
    store: Arc<dyn ForumStore>,
}

impl<M: Mailer> QueueOnDelivery<M> {
    pub fn new(inner: M, store: Arc<dyn ForumStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<M: Mailer> Mailer for QueueOnDelivery<M> {
    async fn send_new_post_notification(
        &self,
        posts: &[Post],
        recipients: &[User],
    ) -> Result<(), MailError> {
        self.inner
            .send_new_post_notification(posts, recipients)
            .await?;

        let mut failed = Vec::new();
        for post in posts {
            if let Err(e) = self.store.set_post_state(post.id, MailedState::Queued).await {
                warn!(post_id = post.id, error = %e, "Could not mark notified post as queued");
                failed.push((post.id, e.to_string()));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(MailError::StateNotRecorded { failed })
        }
    }

    async fn send_activity_notification(
        &self,
        post: &Post,
        recipients: &[User],
    ) -> Result<(), MailError> {
        self.inner.send_activity_notification(post, recipients).await
    }
}

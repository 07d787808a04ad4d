//! SMTP transport via lettre.
//!
//! One message per recipient. lettre's `SmtpTransport` is blocking, so each
//! hand-off runs on the blocking pool.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::config::{SiteConfig, SmtpConfig};
use crate::error::MailError;
use crate::forum::{Post, User};
use crate::mail::{Mailer, activity_message, new_post_message};

/// Mailer that relays through an SMTP server.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    site: SiteConfig,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, site: SiteConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| MailError::Transport {
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        let from = parse_mailbox(&config.from_address)?;

        Ok(Self {
            transport,
            from,
            site,
        })
    }

    /// Build one message per recipient.
    ///
    /// Recipients whose address does not parse are skipped with a warning.
    /// Fails only when every recipient was skipped.
    fn build_messages(
        &self,
        recipients: &[User],
        subject: &str,
        body: &str,
    ) -> Result<Vec<Message>, MailError> {
        let mut messages = Vec::with_capacity(recipients.len());
        let mut skipped = 0;
        for user in recipients {
            let to = match parse_mailbox(&user.email) {
                Ok(to) => to,
                Err(e) => {
                    warn!(user_id = user.id, error = %e, "Skipping recipient");
                    skipped += 1;
                    continue;
                }
            };
            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .body(body.to_string())
                .map_err(|e| MailError::Build(e.to_string()))?;
            messages.push(message);
        }

        if messages.is_empty() && skipped > 0 {
            return Err(MailError::NoValidRecipients { skipped });
        }
        Ok(messages)
    }

    async fn deliver(&self, messages: Vec<Message>) -> Result<(), MailError> {
        if messages.is_empty() {
            return Ok(());
        }
        let transport = self.transport.clone();
        let count = messages.len();

        tokio::task::spawn_blocking(move || {
            for message in &messages {
                transport.send(message).map_err(|e| MailError::Transport {
                    reason: format!("SMTP send failed: {e}"),
                })?;
            }
            Ok::<(), MailError>(())
        })
        .await
        .map_err(|e| MailError::Transport {
            reason: format!("SMTP task failed: {e}"),
        })??;

        info!(messages = count, "Email handed to SMTP relay");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e| MailError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_new_post_notification(
        &self,
        posts: &[Post],
        recipients: &[User],
    ) -> Result<(), MailError> {
        let (subject, body) = new_post_message(posts, &self.site);
        let messages = self.build_messages(recipients, &subject, &body)?;
        self.deliver(messages).await
    }

    async fn send_activity_notification(
        &self,
        post: &Post,
        recipients: &[User],
    ) -> Result<(), MailError> {
        let (subject, body) = activity_message(post, &self.site);
        let messages = self.build_messages(recipients, &subject, &body)?;
        self.deliver(messages).await
    }
}

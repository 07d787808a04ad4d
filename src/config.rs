//! Configuration types, built from environment variables.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Site settings used to build canonical links.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// `http` or `https`.
    pub http_mode: String,
    /// Public host name, e.g. `forum.example.org`.
    pub server_name: String,
}

impl SiteConfig {
    /// Canonical URL of a topic: `{scheme}://{host}/discussions/{link}`.
    pub fn topic_url(&self, full_link_name: &str) -> String {
        format!(
            "{}://{}/discussions/{}",
            self.http_mode, self.server_name, full_link_name
        )
    }
}

/// SMTP transport settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Format of the run report written at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("expected 'text' or 'json', got '{}'", s)),
        }
    }
}

/// Everything a single run needs.
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    pub site: SiteConfig,
    pub db_path: PathBuf,
    /// `None` means mail is logged, not sent.
    pub smtp: Option<SmtpConfig>,
    pub report_format: ReportFormat,
}

impl ActivityConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_mode = non_empty("FORUM_HTTP_MODE").unwrap_or_else(|| "https".to_string());
        if http_mode != "http" && http_mode != "https" {
            return Err(ConfigError::InvalidValue {
                key: "FORUM_HTTP_MODE".into(),
                message: format!("expected 'http' or 'https', got '{http_mode}'"),
            });
        }

        let server_name = non_empty("FORUM_SERVER_NAME")
            .ok_or_else(|| ConfigError::MissingEnvVar("FORUM_SERVER_NAME".into()))?;

        let db_path = non_empty("FORUM_ACTIVITY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/forum.db"));

        let smtp = match non_empty("FORUM_SMTP_HOST") {
            Some(host) => {
                let port = match non_empty("FORUM_SMTP_PORT") {
                    Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                        key: "FORUM_SMTP_PORT".into(),
                        message: format!("{e}"),
                    })?,
                    None => 587,
                };
                let username = non_empty("FORUM_SMTP_USERNAME").unwrap_or_default();
                let password = SecretString::from(non_empty("FORUM_SMTP_PASSWORD").unwrap_or_default());
                let from_address = non_empty("FORUM_MAIL_FROM").unwrap_or_else(|| username.clone());
                if from_address.is_empty() {
                    return Err(ConfigError::MissingEnvVar("FORUM_MAIL_FROM".into()));
                }
                Some(SmtpConfig {
                    host,
                    port,
                    username,
                    password,
                    from_address,
                })
            }
            None => None,
        };

        let report_format = match non_empty("FORUM_ACTIVITY_REPORT_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "FORUM_ACTIVITY_REPORT_FORMAT".into(),
                    message,
                })?,
            None => ReportFormat::default(),
        };

        Ok(Self {
            site: SiteConfig {
                http_mode,
                server_name,
            },
            db_path,
            smtp,
            report_format,
        })
    }
}

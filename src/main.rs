use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use forum_activity::activity::ActivityRunner;
use forum_activity::config::{ActivityConfig, ReportFormat};
use forum_activity::mail::{LogMailer, Mailer, QueueOnDelivery, SmtpMailer};
use forum_activity::store::{ForumStore, LibSqlBackend, PreferenceStore};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ActivityConfig::from_env().context("invalid configuration")?;

    // ── Database ─────────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    let store: Arc<dyn ForumStore> = backend.clone();
    let preferences: Arc<dyn PreferenceStore> = backend;

    // ── Mail ─────────────────────────────────────────────────────────────
    let transport: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "Mail: SMTP");
            Arc::new(SmtpMailer::new(smtp, config.site.clone()).context("invalid SMTP settings")?)
        }
        None => {
            info!("Mail: dry run (FORUM_SMTP_HOST not set)");
            Arc::new(LogMailer::new(config.site.clone()))
        }
    };
    let mailer: Arc<dyn Mailer> = Arc::new(QueueOnDelivery::new(transport, Arc::clone(&store)));

    // ── Run ──────────────────────────────────────────────────────────────
    let runner = ActivityRunner::new(store, preferences, mailer, config.site.clone());
    let report = match runner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Forum activity run aborted");
            return Err(e.into());
        }
    };

    match config.report_format {
        ReportFormat::Text => print!("{report}"),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.has_failures() {
        warn!(
            failures = report.failures.len(),
            "Run finished with skipped posts; they will be retried next run"
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

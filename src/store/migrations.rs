//! Version-tracked database migrations for the libSQL backend.
//!
//! Every schema change is a numbered step; the highest applied number is
//! kept in `_migrations`.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "forum_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL,
                notify_new_posts INTEGER NOT NULL DEFAULT 0,
                receive_activity INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                full_link_name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                topic_id INTEGER NOT NULL REFERENCES topics(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                activity_mailed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_posts_activity_mailed ON posts(activity_mailed);
        "#,
    },
    Migration {
        version: 2,
        name: "user_config",
        sql: r#"
            CREATE TABLE IF NOT EXISTS user_config (
                user_id INTEGER NOT NULL REFERENCES users(id),
                domain TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, domain, key)
            );
        "#,
    },
];

/// Bring the schema up to the latest version.
///
/// Versions already recorded in `_migrations` are skipped, so this is safe
/// to call on every start.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| migration_err("create _migrations", e))?;

    let applied = schema_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying forum schema migration"
        );
        let step = format!("V{} {}", migration.version, migration.name);
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| migration_err(&step, e))?;
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| migration_err(&format!("record {step}"), e))?;
    }

    debug!(version = schema_version(conn).await?, "Forum schema up to date");
    Ok(())
}

/// Highest recorded migration version, 0 on a fresh database.
async fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| migration_err("read schema version", e))?;
    match rows.next().await.map_err(|e| migration_err("read schema version", e))? {
        Some(row) => row.get(0).map_err(|e| migration_err("parse schema version", e)),
        None => Ok(0),
    }
}

fn migration_err(step: &str, e: libsql::Error) -> DatabaseError {
    DatabaseError::Migration(format!("{step}: {e}"))
}

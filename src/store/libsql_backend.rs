//! libSQL backend: async `ForumStore` and `PreferenceStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::forum::{MailedState, Post, Topic, User};
use crate::store::migrations;
use crate::store::traits::{ForumStore, PreferenceStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Seeding ─────────────────────────────────────────────────────

    /// Insert a user with their subscription flags.
    pub async fn insert_user(
        &self,
        user: &User,
        notify_new_posts: bool,
        receive_activity: bool,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, email, notify_new_posts, receive_activity) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.username.as_str(),
                    user.email.as_str(),
                    notify_new_posts as i64,
                    receive_activity as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user: {e}")))?;
        Ok(())
    }

    /// Insert a topic.
    pub async fn insert_topic(&self, topic: &Topic) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO topics (id, title, full_link_name) VALUES (?1, ?2, ?3)",
                params![topic.id, topic.title.as_str(), topic.full_link_name.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_topic: {e}")))?;
        Ok(())
    }

    /// Insert a post in the given state.
    pub async fn insert_post(
        &self,
        id: i64,
        topic_id: i64,
        user_id: i64,
        state: MailedState,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO posts (id, topic_id, user_id, activity_mailed, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, topic_id, user_id, state.as_db(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_post: {e}")))?;
        Ok(())
    }

    /// Store a user setting, replacing any previous value.
    pub async fn set_preference(
        &self,
        user_id: i64,
        domain: &str,
        key: &str,
        value: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO user_config (user_id, domain, key, value, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id, domain, key) DO UPDATE SET value = ?4, updated_at = ?5",
                params![user_id, domain, key, value, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_preference: {e}")))?;
        Ok(())
    }

    /// Current mailed state of a post, if it exists.
    pub async fn get_post_state(&self, post_id: i64) -> Result<Option<MailedState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT activity_mailed FROM posts WHERE id = ?1",
                params![post_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_post_state: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let code: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_post_state row parse: {e}")))?;
                parse_state(code).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_post_state: {e}"))),
        }
    }

    async fn posts_in_state(&self, state: MailedState) -> Result<Vec<Post>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {POST_COLUMNS} {POST_JOIN} WHERE p.activity_mailed = ?1 ORDER BY p.id"),
                params![state.as_db()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("posts_in_state({state}): {e}")))?;

        let mut posts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("posts_in_state({state}): {e}")))?
        {
            posts.push(row_to_post(&row)?);
        }
        Ok(posts)
    }

    async fn users_where(&self, flag: &str) -> Result<Vec<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT id, username, email FROM users WHERE {flag} = 1 ORDER BY id"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("users_where({flag}): {e}")))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("users_where({flag}): {e}")))?
        {
            users.push(User {
                id: row.get(0).map_err(row_err)?,
                username: row.get(1).map_err(row_err)?,
                email: row.get(2).map_err(row_err)?,
            });
        }
        Ok(users)
    }
}

// ── Helper functions ────────────────────────────────────────────────

const POST_COLUMNS: &str =
    "p.id, p.user_id, p.activity_mailed, t.id, t.title, t.full_link_name, u.id, u.username, u.email";

const POST_JOIN: &str =
    "FROM posts p JOIN topics t ON t.id = p.topic_id JOIN users u ON u.id = p.user_id";

fn row_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("row parse: {e}"))
}

fn parse_state(code: i64) -> Result<MailedState, DatabaseError> {
    MailedState::from_db(code)
        .ok_or_else(|| DatabaseError::Query(format!("Unknown activity_mailed value: {code}")))
}

/// Map a libsql Row to a Post.
///
/// Column order matches POST_COLUMNS.
fn row_to_post(row: &libsql::Row) -> Result<Post, DatabaseError> {
    let state_code: i64 = row.get(2).map_err(row_err)?;
    Ok(Post {
        id: row.get(0).map_err(row_err)?,
        user_id: row.get(1).map_err(row_err)?,
        mailed_state: parse_state(state_code)?,
        topic: Topic {
            id: row.get(3).map_err(row_err)?,
            title: row.get(4).map_err(row_err)?,
            full_link_name: row.get(5).map_err(row_err)?,
        },
        author: User {
            id: row.get(6).map_err(row_err)?,
            username: row.get(7).map_err(row_err)?,
            email: row.get(8).map_err(row_err)?,
        },
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ForumStore for LibSqlBackend {
    async fn posts_pending_notify(&self) -> Result<Vec<Post>, DatabaseError> {
        self.posts_in_state(MailedState::PendingNotify).await
    }

    async fn posts_queued(&self) -> Result<Vec<Post>, DatabaseError> {
        self.posts_in_state(MailedState::Queued).await
    }

    async fn posts_ready_to_send(&self) -> Result<Vec<Post>, DatabaseError> {
        self.posts_in_state(MailedState::ReadyToSend).await
    }

    async fn set_post_state(&self, post_id: i64, state: MailedState) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE posts SET activity_mailed = ?1, updated_at = ?2 WHERE id = ?3 AND activity_mailed < ?1",
                params![state.as_db(), now, post_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_post_state: {e}")))?;

        if updated == 0 {
            return match self.get_post_state(post_id).await? {
                None => Err(DatabaseError::NotFound {
                    entity: "post".into(),
                    id: post_id.to_string(),
                }),
                Some(current) => Err(DatabaseError::Constraint(format!(
                    "post {post_id} cannot move from {current} to {state}"
                ))),
            };
        }

        debug!(post_id, state = %state, "Post state updated in DB");
        Ok(())
    }

    async fn users_for_notification(&self) -> Result<Vec<User>, DatabaseError> {
        self.users_where("notify_new_posts").await
    }

    async fn users_for_sending(&self) -> Result<Vec<User>, DatabaseError> {
        self.users_where("receive_activity").await
    }
}

#[async_trait]
impl PreferenceStore for LibSqlBackend {
    async fn get_preference(
        &self,
        user_id: i64,
        domain: &str,
        key: &str,
        default: &str,
    ) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT value FROM user_config WHERE user_id = ?1 AND domain = ?2 AND key = ?3",
                params![user_id, domain, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_preference: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row.get::<String>(0).map_err(row_err),
            Ok(None) => Ok(default.to_string()),
            Err(e) => Err(DatabaseError::Query(format!("get_preference: {e}"))),
        }
    }
}

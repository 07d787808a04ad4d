//! In-memory fakes for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::config::SiteConfig;
use crate::error::{DatabaseError, MailError};
use crate::forum::{MailedState, Post, Topic, User};
use crate::mail::Mailer;
use crate::store::{ForumStore, PreferenceStore};

pub fn site() -> SiteConfig {
    SiteConfig {
        http_mode: "https".into(),
        server_name: "forum.example.org".into(),
    }
}

pub fn user(id: i64) -> User {
    User {
        id,
        username: format!("user{id}"),
        email: format!("user{id}@example.com"),
    }
}

/// A post by `user{user_id}` in a topic titled `title`.
pub fn post(id: i64, user_id: i64, title: &str, state: MailedState) -> Post {
    Post {
        id,
        user_id,
        topic: Topic {
            id: id * 10,
            title: title.to_string(),
            full_link_name: title.to_lowercase().replace(' ', "-"),
        },
        author: user(user_id),
        mailed_state: state,
    }
}

/// Forum and preference store backed by plain collections.
#[derive(Default)]
pub struct MemoryStore {
    posts: Mutex<Vec<Post>>,
    preferences: Mutex<HashMap<i64, String>>,
    notify_users: Mutex<Vec<User>>,
    send_users: Mutex<Vec<User>>,
    failing_transitions: Mutex<HashSet<i64>>,
    failing_preferences: Mutex<HashSet<i64>>,
    fail_preferences: AtomicBool,
    fail_fetch: AtomicBool,
    fail_recipients: AtomicBool,
    transitions: Mutex<Vec<(i64, MailedState)>>,
    preference_lookups: Mutex<Vec<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_post(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }

    /// Store `automatic_send` for a user in the forum domain.
    pub fn set_automatic_send(&self, user_id: i64, value: &str) {
        self.preferences
            .lock()
            .unwrap()
            .insert(user_id, value.to_string());
    }

    pub fn set_notify_users(&self, users: Vec<User>) {
        *self.notify_users.lock().unwrap() = users;
    }

    pub fn set_send_users(&self, users: Vec<User>) {
        *self.send_users.lock().unwrap() = users;
    }

    pub fn fail_transition(&self, post_id: i64) {
        self.failing_transitions.lock().unwrap().insert(post_id);
    }

    pub fn fail_preferences(&self) {
        self.fail_preferences.store(true, Ordering::SeqCst);
    }

    /// Make preference reads for one user fail with a query error.
    pub fn fail_preference_for(&self, user_id: i64) {
        self.failing_preferences.lock().unwrap().insert(user_id);
    }

    pub fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fail_recipients(&self) {
        self.fail_recipients.store(true, Ordering::SeqCst);
    }

    pub fn state_of(&self, post_id: i64) -> Option<MailedState> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == post_id)
            .map(|p| p.mailed_state)
    }

    /// Successful `set_post_state` calls, in order.
    pub fn transitions(&self) -> Vec<(i64, MailedState)> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn preference_lookups(&self) -> Vec<i64> {
        self.preference_lookups.lock().unwrap().clone()
    }

    fn in_state(&self, state: MailedState) -> Result<Vec<Post>, DatabaseError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(DatabaseError::Pool("store offline".into()));
        }
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.mailed_state == state)
            .cloned()
            .collect())
    }

    fn recipients(&self, users: &Mutex<Vec<User>>) -> Result<Vec<User>, DatabaseError> {
        if self.fail_recipients.load(Ordering::SeqCst) {
            return Err(DatabaseError::Pool("store offline".into()));
        }
        Ok(users.lock().unwrap().clone())
    }
}

#[async_trait]
impl ForumStore for MemoryStore {
    async fn posts_pending_notify(&self) -> Result<Vec<Post>, DatabaseError> {
        self.in_state(MailedState::PendingNotify)
    }

    async fn posts_queued(&self) -> Result<Vec<Post>, DatabaseError> {
        self.in_state(MailedState::Queued)
    }

    async fn posts_ready_to_send(&self) -> Result<Vec<Post>, DatabaseError> {
        self.in_state(MailedState::ReadyToSend)
    }

    async fn set_post_state(&self, post_id: i64, state: MailedState) -> Result<(), DatabaseError> {
        if self.failing_transitions.lock().unwrap().contains(&post_id) {
            return Err(DatabaseError::Query(format!("update of post {post_id} failed")));
        }
        let mut posts = self.posts.lock().unwrap();
        let post = posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "post".into(),
                id: post_id.to_string(),
            })?;
        if !post.mailed_state.can_advance_to(state) {
            return Err(DatabaseError::Constraint(format!(
                "post {post_id} cannot move from {} to {state}",
                post.mailed_state
            )));
        }
        post.mailed_state = state;
        self.transitions.lock().unwrap().push((post_id, state));
        Ok(())
    }

    async fn users_for_notification(&self) -> Result<Vec<User>, DatabaseError> {
        self.recipients(&self.notify_users)
    }

    async fn users_for_sending(&self) -> Result<Vec<User>, DatabaseError> {
        self.recipients(&self.send_users)
    }
}

#[async_trait]
impl PreferenceStore for MemoryStore {
    async fn get_preference(
        &self,
        user_id: i64,
        domain: &str,
        key: &str,
        default: &str,
    ) -> Result<String, DatabaseError> {
        if self.fail_preferences.load(Ordering::SeqCst) {
            return Err(DatabaseError::Pool("preference store offline".into()));
        }
        self.preference_lookups.lock().unwrap().push(user_id);
        if self.failing_preferences.lock().unwrap().contains(&user_id) {
            return Err(DatabaseError::Query("row lock timeout".into()));
        }
        if domain != "forum" || key != "automatic_send" {
            return Ok(default.to_string());
        }
        Ok(self
            .preferences
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| default.to_string()))
    }
}

/// Mailer that records every call instead of sending.
#[derive(Default)]
pub struct RecordingMailer {
    new_post_calls: Mutex<Vec<(Vec<i64>, Vec<i64>)>>,
    activity_calls: Mutex<Vec<(i64, Vec<i64>)>>,
    fail_new_post: AtomicBool,
    failing_activity: Mutex<HashSet<i64>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_new_post(&self) {
        self.fail_new_post.store(true, Ordering::SeqCst);
    }

    pub fn fail_activity_for(&self, post_id: i64) {
        self.failing_activity.lock().unwrap().insert(post_id);
    }

    /// `(post ids, recipient ids)` per new-post call.
    pub fn new_post_calls(&self) -> Vec<(Vec<i64>, Vec<i64>)> {
        self.new_post_calls.lock().unwrap().clone()
    }

    /// `(post id, recipient ids)` per activity call, failed ones included.
    pub fn activity_calls(&self) -> Vec<(i64, Vec<i64>)> {
        self.activity_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_new_post_notification(
        &self,
        posts: &[Post],
        recipients: &[User],
    ) -> Result<(), MailError> {
        self.new_post_calls.lock().unwrap().push((
            posts.iter().map(|p| p.id).collect(),
            recipients.iter().map(|u| u.id).collect(),
        ));
        if self.fail_new_post.load(Ordering::SeqCst) {
            return Err(MailError::Transport {
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }

    async fn send_activity_notification(
        &self,
        post: &Post,
        recipients: &[User],
    ) -> Result<(), MailError> {
        self.activity_calls
            .lock()
            .unwrap()
            .push((post.id, recipients.iter().map(|u| u.id).collect()));
        if self.failing_activity.lock().unwrap().contains(&post.id) {
            return Err(MailError::Transport {
                reason: "mailbox unavailable".into(),
            });
        }
        Ok(())
    }
}

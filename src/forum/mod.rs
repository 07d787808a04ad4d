//! Forum domain types read and advanced by the activity job.

pub mod model;

pub use model::{MailedState, Post, SendPreference, Topic, User};

//! Forum activity: notification lifecycle job for forum posts.

pub mod activity;
pub mod config;
pub mod error;
pub mod forum;
pub mod mail;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

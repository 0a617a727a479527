//! Meta Quest store update watcher.
//!
//! Polls the store graph for a fixed list of apps, diffs each app's version
//! against the last persisted snapshot and posts a Discord notification on
//! first sight or change.

pub mod checker;
pub mod config;
pub mod detector;
pub mod meta;
pub mod notify;
pub mod store;

#[cfg(test)]
mod test_support;

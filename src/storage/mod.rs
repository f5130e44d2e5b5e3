// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent storage for the community feed, backed by a single embedded
//! [redb](https://docs.rs/redb) database file under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   feed.redb   # users, communities, memberships, posts, likes,
//!               # comments, notifications, id sequences
//! ```
//!
//! All operations are synchronous. Async callers run them on the blocking
//! pool (`tokio::task::spawn_blocking`).
//!
//! ## Submodules
//!
//! - `database` - table layout, errors, users
//! - `communities` - communities and memberships
//! - `posts` - posts, likes, comments, feed pages
//! - `notifications` - per-user notifications and read state

pub mod communities;
pub mod database;
pub mod notifications;
pub mod posts;

pub use database::{DbError, DbResult, FeedDatabase};
pub use notifications::NewNotification;
pub use posts::{LikeToggle, StoredPost};

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "feed.redb";

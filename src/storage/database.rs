// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded feed database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized UserProfile
//! - `communities`: community_id → serialized Community
//! - `memberships`: (user_id, community_id) → joined_at millis
//! - `community_members`: (community_id, user_id) → joined_at millis
//! - `posts`: post_id → serialized StoredPost
//! - `post_likes`: (post_id, user_id) → liked_at millis
//! - `comments`: comment_id → serialized Comment
//! - `post_comments`: (post_id, comment_id) → ()
//! - `notifications`: notification_id → serialized StoredNotification
//! - `user_notifications`: (user_id, notification_id) → ()
//! - `sequences`: entity name → last allocated id
//!
//! Ids are allocated from `sequences` inside the same write transaction that
//! stores the row, so they increase with insertion order.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

use crate::models::{UpdateProfileRequest, UserId, UserProfile};

// =============================================================================
// Table Definitions
// =============================================================================

pub(super) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
pub(super) const COMMUNITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("communities");
pub(super) const MEMBERSHIPS: TableDefinition<(u64, u64), i64> =
    TableDefinition::new("memberships");
pub(super) const COMMUNITY_MEMBERS: TableDefinition<(u64, u64), i64> =
    TableDefinition::new("community_members");
pub(super) const POSTS: TableDefinition<u64, &[u8]> = TableDefinition::new("posts");
pub(super) const POST_LIKES: TableDefinition<(u64, u64), i64> = TableDefinition::new("post_likes");
pub(super) const COMMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("comments");
pub(super) const POST_COMMENTS: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("post_comments");
pub(super) const NOTIFICATIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("notifications");
pub(super) const USER_NOTIFICATIONS: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("user_notifications");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Encoding Helpers
// =============================================================================

pub(super) fn to_json<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(super) fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(super) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Full key range of a `(prefix, _)` composite key.
pub(super) fn prefix_range(prefix: u64) -> std::ops::RangeInclusive<(u64, u64)> {
    (prefix, 0)..=(prefix, u64::MAX)
}

/// Allocate the next id for `sequence` inside `txn`.
///
/// Must be called while no other handle to the sequences table is open.
pub(super) fn next_id(txn: &WriteTransaction, sequence: &str) -> DbResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let next = table.get(sequence)?.map(|v| v.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

// =============================================================================
// FeedDatabase
// =============================================================================

/// Embedded ACID store for users, communities, posts and notifications.
pub struct FeedDatabase {
    pub(super) db: Database,
}

impl FeedDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(COMMUNITIES)?;
            let _ = write_txn.open_table(MEMBERSHIPS)?;
            let _ = write_txn.open_table(COMMUNITY_MEMBERS)?;
            let _ = write_txn.open_table(POSTS)?;
            let _ = write_txn.open_table(POST_LIKES)?;
            let _ = write_txn.open_table(COMMENTS)?;
            let _ = write_txn.open_table(POST_COMMENTS)?;
            let _ = write_txn.open_table(NOTIFICATIONS)?;
            let _ = write_txn.open_table(USER_NOTIFICATIONS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap readiness probe: opens a read transaction and a table.
    pub fn check(&self) -> DbResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SEQUENCES)?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Profile of a user, or an anonymous profile if none was stored.
    pub fn profile(&self, user_id: UserId) -> DbResult<UserProfile> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id.0)? {
            Some(value) => from_json(value.value()),
            None => Ok(UserProfile::anonymous(user_id)),
        }
    }

    /// Create or replace a user's profile names.
    pub fn upsert_profile(
        &self,
        user_id: UserId,
        request: &UpdateProfileRequest,
    ) -> DbResult<UserProfile> {
        let profile = UserProfile {
            user_id,
            first_name: normalize(request.first_name.as_deref()),
            last_name: normalize(request.last_name.as_deref()),
        };
        let json = to_json(&profile)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS)?;
            table.insert(user_id.0, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(profile)
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

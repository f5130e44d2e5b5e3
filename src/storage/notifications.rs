// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-user notifications.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::database::{
    from_json, next_id, prefix_range, to_json, DbError, DbResult, FeedDatabase, NOTIFICATIONS,
    USER_NOTIFICATIONS,
};
use crate::models::{NotificationKind, NotificationView, UserId};

/// A notification about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub content: String,
    pub reference_id: Option<u64>,
    pub reference_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNotification {
    id: u64,
    recipient: UserId,
    kind: NotificationKind,
    content: Option<String>,
    reference_id: Option<u64>,
    reference_type: Option<String>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl StoredNotification {
    fn view(&self) -> NotificationView {
        NotificationView {
            id: self.id,
            kind: self.kind,
            content: self.content.clone(),
            reference_id: self.reference_id,
            reference_type: self.reference_type.clone(),
            is_read: self.is_read,
            created_at: self.created_at,
        }
    }
}

impl FeedDatabase {
    /// Store a batch of notifications in one transaction.
    ///
    /// Returns the stored views in the same order as `batch`.
    pub fn create_notifications(
        &self,
        batch: &[NewNotification],
    ) -> DbResult<Vec<(UserId, NotificationView)>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let mut ids = Vec::with_capacity(batch.len());
        for _ in batch {
            ids.push(next_id(&write_txn, "notifications")?);
        }

        let mut created = Vec::with_capacity(batch.len());
        {
            let mut notifications = write_txn.open_table(NOTIFICATIONS)?;
            let mut index = write_txn.open_table(USER_NOTIFICATIONS)?;
            for (new, id) in batch.iter().zip(ids) {
                let stored = StoredNotification {
                    id,
                    recipient: new.recipient,
                    kind: new.kind,
                    content: Some(new.content.clone()),
                    reference_id: new.reference_id,
                    reference_type: new.reference_type.clone(),
                    is_read: false,
                    created_at: now,
                };
                notifications.insert(id, to_json(&stored)?.as_slice())?;
                index.insert((new.recipient.0, id), ())?;
                created.push((new.recipient, stored.view()));
            }
        }
        write_txn.commit()?;
        Ok(created)
    }

    /// Newest-first notifications of `user`, with the total matching count.
    pub fn list_notifications(
        &self,
        user: UserId,
        page: u32,
        limit: u32,
        unread_only: bool,
    ) -> DbResult<(Vec<NotificationView>, u64)> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_NOTIFICATIONS)?;
        let notifications = read_txn.open_table(NOTIFICATIONS)?;
        let offset = (u64::from(page.max(1)) - 1) * u64::from(limit);

        let mut total = 0u64;
        let mut items = Vec::new();
        for entry in index.range(prefix_range(user.0))?.rev() {
            let (key, _) = entry?;
            let Some(value) = notifications.get(key.value().1)? else {
                continue;
            };
            let stored: StoredNotification = from_json(value.value())?;
            if unread_only && stored.is_read {
                continue;
            }
            total += 1;
            if total > offset && (items.len() as u64) < u64::from(limit) {
                items.push(stored.view());
            }
        }
        Ok((items, total))
    }

    /// Mark one of `user`'s notifications as read.
    pub fn mark_notification_read(&self, user: UserId, notification_id: u64) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let index = write_txn.open_table(USER_NOTIFICATIONS)?;
            if index.get((user.0, notification_id))?.is_none() {
                return Err(DbError::NotFound(format!("Notification {notification_id} not found")));
            }

            let mut notifications = write_txn.open_table(NOTIFICATIONS)?;
            let mut stored: StoredNotification = match notifications.get(notification_id)? {
                Some(value) => from_json(value.value())?,
                None => return Err(DbError::NotFound(format!("Notification {notification_id} not found"))),
            };
            if !stored.is_read {
                stored.is_read = true;
                notifications.insert(notification_id, to_json(&stored)?.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Mark every notification of `user` as read. Returns how many changed.
    pub fn mark_all_notifications_read(&self, user: UserId) -> DbResult<u64> {
        let write_txn = self.db.begin_write()?;
        let mut changed = 0;
        {
            let index = write_txn.open_table(USER_NOTIFICATIONS)?;
            let mut notifications = write_txn.open_table(NOTIFICATIONS)?;

            let mut ids = Vec::new();
            for entry in index.range(prefix_range(user.0))? {
                let (key, _) = entry?;
                ids.push(key.value().1);
            }

            for id in ids {
                let stored: Option<StoredNotification> = match notifications.get(id)? {
                    Some(value) => Some(from_json(value.value())?),
                    None => None,
                };
                if let Some(mut stored) = stored.filter(|n| !n.is_read) {
                    stored.is_read = true;
                    notifications.insert(id, to_json(&stored)?.as_slice())?;
                    changed += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(changed)
    }

    /// Number of unread notifications of `user`.
    pub fn unread_notification_count(&self, user: UserId) -> DbResult<u64> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_NOTIFICATIONS)?;
        let notifications = read_txn.open_table(NOTIFICATIONS)?;

        let mut count = 0;
        for entry in index.range(prefix_range(user.0))? {
            let (key, _) = entry?;
            if let Some(value) = notifications.get(key.value().1)? {
                let stored: StoredNotification = from_json(value.value())?;
                if !stored.is_read {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::database::test_support::temp_db;
    use super::*;

    fn notice(recipient: u64, content: &str) -> NewNotification {
        NewNotification {
            recipient: UserId(recipient),
            kind: NotificationKind::PostLiked,
            content: content.to_string(),
            reference_id: Some(1),
            reference_type: Some("POST".to_string()),
        }
    }

    #[test]
    fn batch_is_stored_per_recipient() {
        let (db, _dir) = temp_db();
        let created = db
            .create_notifications(&[notice(1, "a"), notice(2, "b"), notice(1, "c")])
            .unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[1].0, UserId(2));
        assert!(!created[0].1.is_read);

        let (items, total) = db.list_notifications(UserId(1), 1, 10, false).unwrap();
        assert_eq!(total, 2);
        let contents: Vec<_> = items.iter().map(|n| n.content.as_deref()).collect();
        assert_eq!(contents, vec![Some("c"), Some("a")]);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let (db, _dir) = temp_db();
        assert!(db.create_notifications(&[]).unwrap().is_empty());
    }

    #[test]
    fn read_state_drives_unread_count_and_filter() {
        let (db, _dir) = temp_db();
        let created = db
            .create_notifications(&[notice(1, "a"), notice(1, "b")])
            .unwrap();
        assert_eq!(db.unread_notification_count(UserId(1)).unwrap(), 2);

        db.mark_notification_read(UserId(1), created[0].1.id).unwrap();
        assert_eq!(db.unread_notification_count(UserId(1)).unwrap(), 1);

        let (unread, total) = db.list_notifications(UserId(1), 1, 10, true).unwrap();
        assert_eq!(total, 1);
        assert_eq!(unread[0].content.as_deref(), Some("b"));

        assert_eq!(db.mark_all_notifications_read(UserId(1)).unwrap(), 1);
        assert_eq!(db.unread_notification_count(UserId(1)).unwrap(), 0);
    }

    #[test]
    fn cannot_mark_someone_elses_notification() {
        let (db, _dir) = temp_db();
        let created = db.create_notifications(&[notice(1, "a")]).unwrap();

        let err = db
            .mark_notification_read(UserId(2), created[0].1.id)
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn listing_pages_newest_first() {
        let (db, _dir) = temp_db();
        db.create_notifications(&[notice(1, "a"), notice(1, "b"), notice(1, "c")])
            .unwrap();

        let (items, total) = db.list_notifications(UserId(1), 2, 2, false).unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content.as_deref(), Some("a"));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Posts, likes and comments.
//!
//! Deleted posts keep their row with `deleted_at` set; every read path treats
//! them as absent.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use redb::{ReadTransaction, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::database::{
    from_json, next_id, prefix_range, to_json, DbError, DbResult, FeedDatabase, COMMENTS,
    COMMUNITIES, MEMBERSHIPS, POSTS, POST_COMMENTS, POST_LIKES, USERS,
};
use crate::models::{
    Comment, Community, CommunityId, CommunitySummary, FeedItem, PostId, PostView, UserId,
    UserProfile,
};

/// Post row as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredPost {
    pub id: PostId,
    pub community_id: CommunityId,
    pub author_id: UserId,
    pub content: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoredPost {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Outcome of toggling a like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeToggle {
    pub is_liked: bool,
    pub like_count: u64,
}

impl FeedDatabase {
    /// Store a new post.
    pub fn create_post(
        &self,
        author: UserId,
        community_id: CommunityId,
        content: &str,
        media_url: Option<&str>,
    ) -> DbResult<StoredPost> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let id = next_id(&write_txn, "posts")?;
        let post = StoredPost {
            id: PostId(id),
            community_id,
            author_id: author,
            content: content.to_string(),
            media_url: media_url.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        {
            let mut posts = write_txn.open_table(POSTS)?;
            posts.insert(id, to_json(&post)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(post)
    }

    /// Look up a live (not deleted) post.
    pub fn post(&self, post_id: PostId) -> DbResult<StoredPost> {
        let read_txn = self.db.begin_read()?;
        read_live_post(&read_txn, post_id)
    }

    /// Soft-delete a post. Only its author may do so.
    pub fn delete_post(&self, post_id: PostId, requester: UserId) -> DbResult<StoredPost> {
        let write_txn = self.db.begin_write()?;
        let post = {
            let mut posts = write_txn.open_table(POSTS)?;
            let mut post: StoredPost = match posts.get(post_id.0)? {
                Some(value) => from_json(value.value())?,
                None => return Err(DbError::NotFound(format!("Post {post_id} not found"))),
            };
            if post.is_deleted() {
                return Err(DbError::NotFound(format!("Post {post_id} not found")));
            }
            if post.author_id != requester {
                return Err(DbError::Forbidden(
                    "You can only delete your own post".to_string(),
                ));
            }
            let now = Utc::now();
            post.deleted_at = Some(now);
            post.updated_at = now;
            posts.insert(post_id.0, to_json(&post)?.as_slice())?;
            post
        };
        write_txn.commit()?;
        Ok(post)
    }

    /// Like the post if `user` has not liked it, unlike it otherwise.
    pub fn toggle_like(&self, post_id: PostId, user: UserId) -> DbResult<LikeToggle> {
        let write_txn = self.db.begin_write()?;
        let toggle = {
            let posts = write_txn.open_table(POSTS)?;
            match posts.get(post_id.0)? {
                Some(value) => {
                    let post: StoredPost = from_json(value.value())?;
                    if post.is_deleted() {
                        return Err(DbError::NotFound(format!("Post {post_id} not found")));
                    }
                }
                None => return Err(DbError::NotFound(format!("Post {post_id} not found"))),
            }

            let mut likes = write_txn.open_table(POST_LIKES)?;
            let is_liked = if likes.remove((post_id.0, user.0))?.is_some() {
                false
            } else {
                likes.insert((post_id.0, user.0), Utc::now().timestamp_millis())?;
                true
            };
            let like_count = likes.range(prefix_range(post_id.0))?.count() as u64;
            LikeToggle {
                is_liked,
                like_count,
            }
        };
        write_txn.commit()?;
        Ok(toggle)
    }

    /// Add a comment to a live post. Returns the comment and the new count.
    pub fn add_comment(
        &self,
        post_id: PostId,
        author: UserId,
        content: &str,
        parent_id: Option<u64>,
    ) -> DbResult<(Comment, u64)> {
        let write_txn = self.db.begin_write()?;
        let id = next_id(&write_txn, "comments")?;
        let result = {
            let posts = write_txn.open_table(POSTS)?;
            let live = match posts.get(post_id.0)? {
                Some(value) => !from_json::<StoredPost>(value.value())?.is_deleted(),
                None => false,
            };
            if !live {
                return Err(DbError::NotFound(format!("Post {post_id} not found")));
            }

            let mut comments = write_txn.open_table(COMMENTS)?;
            if let Some(parent_id) = parent_id {
                let parent: Option<Comment> = match comments.get(parent_id)? {
                    Some(value) => Some(from_json(value.value())?),
                    None => None,
                };
                if parent.is_none_or(|p| p.post_id != post_id) {
                    return Err(DbError::NotFound("Parent comment not found".to_string()));
                }
            }

            let comment = Comment {
                id,
                post_id,
                author_id: author,
                content: content.to_string(),
                parent_id,
                created_at: Utc::now(),
            };
            comments.insert(id, to_json(&comment)?.as_slice())?;

            let mut index = write_txn.open_table(POST_COMMENTS)?;
            index.insert((post_id.0, id), ())?;
            let comment_count = index.range(prefix_range(post_id.0))?.count() as u64;
            (comment, comment_count)
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// Comments of a post, oldest first.
    pub fn comments_of(&self, post_id: PostId) -> DbResult<Vec<Comment>> {
        let read_txn = self.db.begin_read()?;
        read_live_post(&read_txn, post_id)?;
        let index = read_txn.open_table(POST_COMMENTS)?;
        let comments = read_txn.open_table(COMMENTS)?;

        let mut result = Vec::new();
        for entry in index.range(prefix_range(post_id.0))? {
            let (key, _) = entry?;
            if let Some(value) = comments.get(key.value().1)? {
                result.push(from_json(value.value())?);
            }
        }
        Ok(result)
    }

    /// Shared (viewer-independent) representation of a live post.
    pub fn post_view(&self, post_id: PostId) -> DbResult<PostView> {
        let read_txn = self.db.begin_read()?;
        let post = read_live_post(&read_txn, post_id)?;
        build_view(&read_txn, &post)
    }

    /// Newest-first posts from every community `viewer` belongs to.
    ///
    /// Returns the requested page and the total number of matching posts.
    pub fn feed(&self, viewer: UserId, page: u32, limit: u32) -> DbResult<(Vec<FeedItem>, u64)> {
        let read_txn = self.db.begin_read()?;

        let communities: BTreeSet<u64> = {
            let memberships = read_txn.open_table(MEMBERSHIPS)?;
            let mut ids = BTreeSet::new();
            for entry in memberships.range(prefix_range(viewer.0))? {
                let (key, _) = entry?;
                ids.insert(key.value().1);
            }
            ids
        };
        if communities.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let posts = read_txn.open_table(POSTS)?;
        let likes = read_txn.open_table(POST_LIKES)?;
        let offset = (u64::from(page.max(1)) - 1) * u64::from(limit);

        let mut total = 0u64;
        let mut items = Vec::new();
        // Ids are allocated in insertion order, so reverse id order is newest first
        for entry in posts.iter()?.rev() {
            let (_, value) = entry?;
            let post: StoredPost = from_json(value.value())?;
            if post.is_deleted() || !communities.contains(&post.community_id.0) {
                continue;
            }
            total += 1;
            if total <= offset || items.len() as u64 >= u64::from(limit) {
                continue;
            }
            let is_liked = likes.get((post.id.0, viewer.0))?.is_some();
            items.push(FeedItem {
                post: build_view(&read_txn, &post)?,
                is_liked,
            });
        }
        Ok((items, total))
    }
}

fn read_live_post(read_txn: &ReadTransaction, post_id: PostId) -> DbResult<StoredPost> {
    let posts = read_txn.open_table(POSTS)?;
    let post: StoredPost = match posts.get(post_id.0)? {
        Some(value) => from_json(value.value())?,
        None => return Err(DbError::NotFound(format!("Post {post_id} not found"))),
    };
    if post.is_deleted() {
        return Err(DbError::NotFound(format!("Post {post_id} not found")));
    }
    Ok(post)
}

fn build_view(read_txn: &ReadTransaction, post: &StoredPost) -> DbResult<PostView> {
    let users = read_txn.open_table(USERS)?;
    let user = match users.get(post.author_id.0)? {
        Some(value) => from_json(value.value())?,
        None => UserProfile::anonymous(post.author_id),
    };

    let communities = read_txn.open_table(COMMUNITIES)?;
    let community = match communities.get(post.community_id.0)? {
        Some(value) => CommunitySummary::from(&from_json::<Community>(value.value())?),
        None => CommunitySummary {
            id: post.community_id,
            name: String::new(),
        },
    };

    let like_count = read_txn
        .open_table(POST_LIKES)?
        .range(prefix_range(post.id.0))?
        .count() as u64;
    let comment_count = read_txn
        .open_table(POST_COMMENTS)?
        .range(prefix_range(post.id.0))?
        .count() as u64;

    Ok(PostView {
        id: post.id,
        content: post.content.clone(),
        media_url: post.media_url.clone(),
        user,
        community,
        like_count,
        comment_count,
        created_at: post.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::super::database::test_support::temp_db;
    use super::*;
    use crate::models::{CreateCommunityRequest, UpdateProfileRequest};

    fn setup() -> (FeedDatabase, tempfile::TempDir, CommunityId) {
        let (db, dir) = temp_db();
        let community = db
            .create_community(
                UserId(1),
                &CreateCommunityRequest {
                    name: "rust".into(),
                    description: None,
                },
            )
            .unwrap();
        (db, dir, community.id)
    }

    #[test]
    fn post_view_includes_author_and_community() {
        let (db, _dir, community) = setup();
        db.upsert_profile(
            UserId(1),
            &UpdateProfileRequest {
                first_name: Some("Ada".into()),
                last_name: None,
            },
        )
        .unwrap();
        let post = db.create_post(UserId(1), community, "hi", None).unwrap();

        let view = db.post_view(post.id).unwrap();
        assert_eq!(view.content, "hi");
        assert_eq!(view.user.first_name.as_deref(), Some("Ada"));
        assert_eq!(view.community.name, "rust");
        assert_eq!((view.like_count, view.comment_count), (0, 0));
    }

    #[test]
    fn toggle_like_flips_and_counts() {
        let (db, _dir, community) = setup();
        let post = db.create_post(UserId(1), community, "hi", None).unwrap();

        let first = db.toggle_like(post.id, UserId(2)).unwrap();
        assert_eq!(first, LikeToggle { is_liked: true, like_count: 1 });

        let other = db.toggle_like(post.id, UserId(3)).unwrap();
        assert_eq!(other.like_count, 2);

        let undo = db.toggle_like(post.id, UserId(2)).unwrap();
        assert_eq!(undo, LikeToggle { is_liked: false, like_count: 1 });
    }

    #[test]
    fn comments_count_per_post() {
        let (db, _dir, community) = setup();
        let a = db.create_post(UserId(1), community, "a", None).unwrap();
        let b = db.create_post(UserId(1), community, "b", None).unwrap();

        let (first, count) = db.add_comment(a.id, UserId(2), "nice", None).unwrap();
        assert_eq!(count, 1);
        let (_, count) = db.add_comment(a.id, UserId(3), "reply", Some(first.id)).unwrap();
        assert_eq!(count, 2);
        let (_, count) = db.add_comment(b.id, UserId(2), "other", None).unwrap();
        assert_eq!(count, 1);

        let comments = db.comments_of(a.id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].parent_id, Some(first.id));
    }

    #[test]
    fn reply_to_comment_of_other_post_is_rejected() {
        let (db, _dir, community) = setup();
        let a = db.create_post(UserId(1), community, "a", None).unwrap();
        let b = db.create_post(UserId(1), community, "b", None).unwrap();
        let (on_a, _) = db.add_comment(a.id, UserId(2), "x", None).unwrap();

        let err = db.add_comment(b.id, UserId(2), "y", Some(on_a.id)).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn only_author_can_delete_and_deleted_posts_disappear() {
        let (db, _dir, community) = setup();
        let post = db.create_post(UserId(1), community, "hi", None).unwrap();

        let err = db.delete_post(post.id, UserId(2)).unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));

        let deleted = db.delete_post(post.id, UserId(1)).unwrap();
        assert!(deleted.is_deleted());
        assert!(matches!(db.post(post.id), Err(DbError::NotFound(_))));
        assert!(matches!(db.toggle_like(post.id, UserId(1)), Err(DbError::NotFound(_))));
    }

    #[test]
    fn feed_is_newest_first_and_scoped_to_memberships() {
        let (db, _dir, community) = setup();
        let other = db
            .create_community(
                UserId(9),
                &CreateCommunityRequest {
                    name: "other".into(),
                    description: None,
                },
            )
            .unwrap();

        let older = db.create_post(UserId(1), community, "older", None).unwrap();
        db.create_post(UserId(9), other.id, "hidden", None).unwrap();
        let newer = db.create_post(UserId(1), community, "newer", None).unwrap();
        db.toggle_like(older.id, UserId(1)).unwrap();

        let (items, total) = db.feed(UserId(1), 1, 10).unwrap();
        assert_eq!(total, 2);
        let ids: Vec<PostId> = items.iter().map(|i| i.post.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert!(!items[0].is_liked);
        assert!(items[1].is_liked);

        let (page_two, total) = db.feed(UserId(1), 2, 1).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page_two[0].post.id, older.id);
    }

    #[test]
    fn feed_without_memberships_is_empty() {
        let (db, _dir, community) = setup();
        db.create_post(UserId(1), community, "hi", None).unwrap();
        assert_eq!(db.feed(UserId(5), 1, 10).unwrap(), (Vec::new(), 0));
    }
}

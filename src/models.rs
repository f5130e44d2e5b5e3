// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response structures used by the REST API and by the real-time
//! channels. All types derive `Serialize` and `ToSchema`; JSON field names are
//! camelCase to match what feed clients already consume.
//!
//! ## Identifier Types
//!
//! [`UserId`], [`CommunityId`] and [`PostId`] are numeric newtypes. They keep
//! user and community ids from being swapped at publish call sites, where a
//! mix-up would route an event to the wrong audience.
//!
//! ## Model Categories
//!
//! - **Users**: profile names shown as post authors
//! - **Communities**: groups users join; membership drives feed routing
//! - **Posts**: feed items, their like/comment counts, and deltas
//! - **Notifications**: per-user notices

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// =============================================================================
// Identifier Types
// =============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                $name(value)
            }
        }
    };
}

numeric_id!(
    /// Numeric user identity, as carried in the access token's `userID` claim.
    UserId
);
numeric_id!(
    /// Community (group) identifier.
    CommunityId
);
numeric_id!(
    /// Post identifier.
    PostId
);

// =============================================================================
// User Models
// =============================================================================

/// Public profile of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    /// Profile for a user that never set any names.
    pub fn anonymous(user_id: UserId) -> Self {
        Self {
            user_id,
            first_name: None,
            last_name: None,
        }
    }

    /// Name used in notification text.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), _) if !first.trim().is_empty() => first.trim().to_string(),
            (_, Some(last)) if !last.trim().is_empty() => last.trim().to_string(),
            _ => format!("User {}", self.user_id),
        }
    }
}

/// Request body for `PUT /v1/users/me`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// =============================================================================
// Community Models
// =============================================================================

/// A community users can join.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Compact community reference embedded in post views.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CommunitySummary {
    pub id: CommunityId,
    pub name: String,
}

impl From<&Community> for CommunitySummary {
    fn from(community: &Community) -> Self {
        Self {
            id: community.id,
            name: community.name.clone(),
        }
    }
}

/// Request body for `POST /v1/communities`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateCommunityRequest {
    pub name: String,
    pub description: Option<String>,
}

/// A user's membership in a community.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub joined_at: DateTime<Utc>,
}

// =============================================================================
// Post Models
// =============================================================================

/// Request body for `POST /v1/posts`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub community_id: CommunityId,
    pub content: String,
    pub media_url: Option<String>,
}

/// Request body for `POST /v1/posts/{post_id}/comments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<u64>,
}

/// A comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u64,
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub parent_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Post representation shared with every member of a community.
///
/// Carries no viewer-specific fields, so the same value can be broadcast to
/// all subscribers of the community.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: PostId,
    pub content: String,
    pub media_url: Option<String>,
    pub user: UserProfile,
    pub community: CommunitySummary,
    pub like_count: u64,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A post as seen by one viewer in their feed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(flatten)]
    pub post: PostView,
    pub is_liked: bool,
}

/// Counters of a post that changed.
///
/// Only the counters set here are serialized. The viewer-specific liked flag
/// is not representable, so it can never be fanned out to other viewers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostDelta {
    pub post_id: PostId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
}

impl PostDelta {
    /// Delta after a like was toggled.
    pub fn likes(post_id: PostId, like_count: u64) -> Self {
        Self {
            post_id,
            like_count: Some(like_count),
            comment_count: None,
        }
    }

    /// Delta after a comment was added.
    pub fn comments(post_id: PostId, comment_count: u64) -> Self {
        Self {
            post_id,
            like_count: None,
            comment_count: Some(comment_count),
        }
    }
}

/// Payload of a `post_deleted` event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRemoved {
    pub post_id: PostId,
}

/// Response of `POST /v1/posts/{post_id}/like`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggleResponse {
    pub message: String,
    pub like_count: u64,
    pub is_liked: bool,
}

/// Paging parameters shared by list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Items per page (max 100).
    pub limit: Option<u32>,
}

impl PageQuery {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Resolve to `(page, limit)` with defaults and bounds applied.
    pub fn resolve(&self, default_limit: u32) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(default_limit)
            .clamp(1, Self::MAX_LIMIT);
        (page, limit)
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: u32, limit: u32, total: u64) -> Self {
        Self {
            data,
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

// =============================================================================
// Notification Models
// =============================================================================

/// Kind of notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PostCreated,
    PostLiked,
    PostCommented,
    NewMember,
    DirectMessage,
}

/// Notification as delivered to its recipient.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: Option<String>,
    pub reference_id: Option<u64>,
    pub reference_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Query for `GET /v1/notifications`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Only return unread notifications.
    pub unread: Option<bool>,
}

/// Response of `GET /v1/notifications/unread-count`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UnreadCount {
    #[serde(rename = "unread-count")]
    pub unread_count: u64,
}

/// Generic `{ "message": ... }` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Post, feed, like and comment endpoints.
//!
//! Every write commits to the store before anything is published to the
//! `/ws/feed` channel or notifications are created. Publishing is
//! best-effort and never fails the request.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::notifications::deliver;
use crate::{
    auth::Auth,
    error::ApiError,
    models::{
        Comment, CreateCommentRequest, CreatePostRequest, FeedItem, LikeToggleResponse,
        MessageResponse, NotificationKind, Page, PageQuery, PostDelta, PostId, PostView, UserId,
    },
    state::AppState,
    storage::{DbError, NewNotification},
};

/// Reference type recorded on post notifications.
const POST_REFERENCE: &str = "CommunityPost";

const MAX_CONTENT_LEN: usize = 5000;

fn validate_content(content: &str) -> Result<String, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("Content must not be empty"));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::bad_request(format!(
            "Content must be at most {MAX_CONTENT_LEN} characters"
        )));
    }
    Ok(content.to_string())
}

fn post_notification(
    recipient: UserId,
    kind: NotificationKind,
    content: String,
    post_id: PostId,
) -> NewNotification {
    NewNotification {
        recipient,
        kind,
        content,
        reference_id: Some(post_id.0),
        reference_type: Some(POST_REFERENCE.to_string()),
    }
}

/// Create a post in a community the caller belongs to.
///
/// Members of the community connected to `/ws/feed` receive a `new_post`
/// event; every other member gets a `POST_CREATED` notification.
#[utoipa::path(
    post,
    path = "/v1/posts",
    tag = "Posts",
    security(("bearer_auth" = [])),
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostView),
        (status = 400, description = "Invalid content"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a member of the community"),
        (status = 404, description = "Community not found")
    )
)]
pub async fn create_post(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let content = validate_content(&request.content)?;
    let media_url = request
        .media_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string);
    let community_id = request.community_id;
    let author = user.user_id;

    let (view, members, author_name) = state
        .with_db(move |db| {
            let community = db
                .community(community_id)?
                .ok_or_else(|| DbError::NotFound("Community not found".to_string()))?;
            if !db.is_member(author, community_id)? {
                return Err(DbError::Forbidden(
                    "You are not a member of this community".to_string(),
                ));
            }
            let post = db.create_post(author, community.id, &content, media_url.as_deref())?;
            let view = db.post_view(post.id)?;
            let members = db.members_of(community.id)?;
            let author_name = db.profile(author)?.display_name();
            Ok((view, members, author_name))
        })
        .await?;

    tracing::info!(
        post_id = %view.id,
        community_id = %community_id,
        user_id = %author,
        "Post created"
    );

    state
        .feed
        .publish_new_item_to_group(community_id, view.clone());

    let text = format!("{author_name} posted in {}", view.community.name);
    let batch = members
        .into_iter()
        .filter(|member| *member != author)
        .map(|member| {
            post_notification(member, NotificationKind::PostCreated, text.clone(), view.id)
        })
        .collect();
    deliver(&state, batch).await;

    Ok((StatusCode::CREATED, Json(view)))
}

/// Newest-first posts from the caller's communities.
#[utoipa::path(
    get,
    path = "/v1/feed",
    tag = "Posts",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Feed page", body = Page<FeedItem>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_feed(
    Auth(user): Auth,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<FeedItem>>, ApiError> {
    let (page, limit) = query.resolve(PageQuery::DEFAULT_LIMIT);
    let (items, total) = state
        .with_db(move |db| db.feed(user.user_id, page, limit))
        .await?;
    Ok(Json(Page::new(items, page, limit, total)))
}

/// Like or unlike a post.
///
/// Subscribers of the post's community receive `post_updated` with the new
/// `likeCount` only; whether the caller likes the post is in the response.
#[utoipa::path(
    post,
    path = "/v1/posts/{post_id}/like",
    tag = "Posts",
    security(("bearer_auth" = [])),
    params(("post_id" = u64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Like toggled", body = LikeToggleResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn toggle_like(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
) -> Result<Json<LikeToggleResponse>, ApiError> {
    let post_id = PostId(post_id);
    let liker = user.user_id;

    let (post, toggle, liker_name) = state
        .with_db(move |db| {
            let post = db.post(post_id)?;
            let toggle = db.toggle_like(post_id, liker)?;
            let liker_name = db.profile(liker)?.display_name();
            Ok((post, toggle, liker_name))
        })
        .await?;

    state
        .feed
        .publish_item_update(post.community_id, PostDelta::likes(post_id, toggle.like_count));

    if toggle.is_liked && post.author_id != liker {
        let notification = post_notification(
            post.author_id,
            NotificationKind::PostLiked,
            format!("{liker_name} liked your post"),
            post_id,
        );
        deliver(&state, vec![notification]).await;
    }

    let message = if toggle.is_liked {
        "Post liked"
    } else {
        "Post unliked"
    };
    Ok(Json(LikeToggleResponse {
        message: message.to_string(),
        like_count: toggle.like_count,
        is_liked: toggle.is_liked,
    }))
}

/// Comment on a post, optionally replying to another comment.
#[utoipa::path(
    post,
    path = "/v1/posts/{post_id}/comments",
    tag = "Posts",
    security(("bearer_auth" = [])),
    params(("post_id" = u64, Path, description = "Post ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Invalid content"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post or parent comment not found")
    )
)]
pub async fn add_comment(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
    Json(request): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let content = validate_content(&request.content)?;
    let post_id = PostId(post_id);
    let commenter = user.user_id;
    let parent_id = request.parent_id;

    let (post, comment, comment_count, commenter_name) = state
        .with_db(move |db| {
            let post = db.post(post_id)?;
            let (comment, count) = db.add_comment(post_id, commenter, &content, parent_id)?;
            let commenter_name = db.profile(commenter)?.display_name();
            Ok((post, comment, count, commenter_name))
        })
        .await?;

    state
        .feed
        .publish_item_update(post.community_id, PostDelta::comments(post_id, comment_count));

    if post.author_id != commenter {
        let notification = post_notification(
            post.author_id,
            NotificationKind::PostCommented,
            format!("{commenter_name} commented on your post"),
            post_id,
        );
        deliver(&state, vec![notification]).await;
    }

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Comments of a post, oldest first.
#[utoipa::path(
    get,
    path = "/v1/posts/{post_id}/comments",
    tag = "Posts",
    security(("bearer_auth" = [])),
    params(("post_id" = u64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Comments of the post", body = [Comment]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let comments = state
        .with_db(move |db| db.comments_of(PostId(post_id)))
        .await?;
    Ok(Json(comments))
}

/// Delete one of the caller's own posts.
#[utoipa::path(
    delete,
    path = "/v1/posts/{post_id}",
    tag = "Posts",
    security(("bearer_auth" = [])),
    params(("post_id" = u64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(post_id): Path<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let post_id = PostId(post_id);
    let requester = user.user_id;

    let post = state
        .with_db(move |db| db.delete_post(post_id, requester))
        .await?;

    tracing::info!(post_id = %post_id, user_id = %requester, "Post deleted");
    state.feed.publish_item_deletion(post.community_id, post_id);

    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::models::{CommunityId, CreateCommunityRequest};
    use crate::realtime::Session;
    use crate::state::test_support::test_state;

    fn auth(user: u64) -> Auth {
        Auth(AuthenticatedUser {
            user_id: UserId(user),
            expires_at: 0,
        })
    }

    fn community(state: &AppState, creator: u64, members: &[u64]) -> CommunityId {
        let community = state
            .db
            .create_community(
                UserId(creator),
                &CreateCommunityRequest {
                    name: "rustaceans".into(),
                    description: None,
                },
            )
            .unwrap();
        for member in members {
            state.db.join_community(UserId(*member), community.id).unwrap();
        }
        community.id
    }

    async fn feed_connection(
        state: &AppState,
        user: u64,
    ) -> (Session, mpsc::UnboundedReceiver<Message>) {
        let token = state.verifier.issue(UserId(user)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = state.feed.gateway().connect(Some(&token), tx).await.unwrap();
        (session, rx)
    }

    fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        match rx.try_recv() {
            Ok(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    async fn create(state: &AppState, user: u64, community_id: CommunityId) -> PostView {
        let (status, Json(view)) = create_post(
            auth(user),
            State(state.clone()),
            Json(CreatePostRequest {
                community_id,
                content: " hello feed ".into(),
                media_url: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        view
    }

    #[tokio::test]
    async fn create_post_publishes_and_notifies_other_members() {
        let (state, _dir) = test_state();
        let community_id = community(&state, 1, &[2]);
        let (_session, mut rx) = feed_connection(&state, 2).await;

        let view = create(&state, 1, community_id).await;
        assert_eq!(view.content, "hello feed");

        let event = next_json(&mut rx);
        assert_eq!(event["event"], "new_post");
        assert_eq!(event["data"]["id"], view.id.0);
        assert!(event["data"].get("isLiked").is_none());

        assert_eq!(state.db.unread_notification_count(UserId(2)).unwrap(), 1);
        assert_eq!(state.db.unread_notification_count(UserId(1)).unwrap(), 0);
    }

    #[tokio::test]
    async fn non_member_cannot_post_and_nothing_is_published() {
        let (state, _dir) = test_state();
        let community_id = community(&state, 1, &[]);
        let (_session, mut rx) = feed_connection(&state, 1).await;

        let err = create_post(
            auth(9),
            State(state.clone()),
            Json(CreatePostRequest {
                community_id,
                content: "intruder".into(),
                media_url: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let (state, _dir) = test_state();
        let community_id = community(&state, 1, &[]);
        let err = create_post(
            auth(1),
            State(state),
            Json(CreatePostRequest {
                community_id,
                content: "   ".into(),
                media_url: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn like_broadcasts_count_without_viewer_flag() {
        let (state, _dir) = test_state();
        let community_id = community(&state, 1, &[2]);
        let view = create(&state, 1, community_id).await;
        let (_session, mut rx) = feed_connection(&state, 1).await;

        let Json(response) = toggle_like(auth(2), State(state.clone()), Path(view.id.0))
            .await
            .unwrap();
        assert!(response.is_liked);
        assert_eq!(response.like_count, 1);

        let event = next_json(&mut rx);
        assert_eq!(event["event"], "post_updated");
        assert_eq!(
            event["data"],
            serde_json::json!({ "postId": view.id.0, "likeCount": 1 })
        );

        // Author gets POST_LIKED; liking your own post does not notify
        assert_eq!(state.db.unread_notification_count(UserId(1)).unwrap(), 1);
        let (stored, _) = state.db.list_notifications(UserId(1), 1, 10, false).unwrap();
        assert_eq!(stored[0].kind, NotificationKind::PostLiked);
        assert_eq!(stored[0].reference_id, Some(view.id.0));
        assert_eq!(stored[0].reference_type.as_deref(), Some(POST_REFERENCE));
        assert_eq!(POST_REFERENCE, "CommunityPost");
        toggle_like(auth(1), State(state.clone()), Path(view.id.0))
            .await
            .unwrap();
        assert_eq!(state.db.unread_notification_count(UserId(1)).unwrap(), 1);
    }

    #[tokio::test]
    async fn comment_broadcasts_comment_count() {
        let (state, _dir) = test_state();
        let community_id = community(&state, 1, &[2]);
        let view = create(&state, 1, community_id).await;
        let (_session, mut rx) = feed_connection(&state, 2).await;

        let (status, Json(comment)) = add_comment(
            auth(2),
            State(state.clone()),
            Path(view.id.0),
            Json(CreateCommentRequest {
                content: "first".into(),
                parent_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment.author_id, UserId(2));

        let event = next_json(&mut rx);
        assert_eq!(
            event["data"],
            serde_json::json!({ "postId": view.id.0, "commentCount": 1 })
        );

        let Json(comments) = list_comments(auth(1), State(state.clone()), Path(view.id.0))
            .await
            .unwrap();
        assert_eq!(comments.len(), 1);
    }

    #[tokio::test]
    async fn delete_by_author_publishes_post_deleted() {
        let (state, _dir) = test_state();
        let community_id = community(&state, 1, &[2]);
        let view = create(&state, 1, community_id).await;
        let (_session, mut rx) = feed_connection(&state, 2).await;

        let err = delete_post(auth(2), State(state.clone()), Path(view.id.0))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());

        delete_post(auth(1), State(state.clone()), Path(view.id.0))
            .await
            .unwrap();
        let event = next_json(&mut rx);
        assert_eq!(event["event"], "post_deleted");
        assert_eq!(event["data"]["postId"], view.id.0);

        let Json(page) = get_feed(
            auth(2),
            State(state),
            Query(PageQuery {
                page: None,
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn failed_write_publishes_nothing() {
        let (state, _dir) = test_state();
        community(&state, 1, &[]);
        let (_session, mut rx) = feed_connection(&state, 1).await;

        let err = toggle_like(auth(1), State(state.clone()), Path(404))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
    }
}

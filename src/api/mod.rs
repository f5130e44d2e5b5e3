// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        Comment, Community, CommunityId, CommunitySummary, CreateCommentRequest,
        CreateCommunityRequest, CreatePostRequest, FeedItem, LikeToggleResponse, Membership,
        MessageResponse, NotificationKind, NotificationView, PostDelta, PostId, PostRemoved,
        PostView, UnreadCount, UpdateProfileRequest, UserId, UserProfile,
    },
    realtime::socket,
    state::AppState,
};

pub mod communities;
pub mod health;
pub mod notifications;
pub mod posts;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/users/me",
            get(users::get_current_user).put(users::update_current_user),
        )
        .route("/communities", post(communities::create_community))
        .route("/communities/mine", get(communities::my_communities))
        .route(
            "/communities/{community_id}/join",
            post(communities::join_community),
        )
        .route(
            "/communities/{community_id}/membership",
            delete(communities::leave_community),
        )
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", delete(posts::delete_post))
        .route("/posts/{post_id}/like", post(posts::toggle_like))
        .route(
            "/posts/{post_id}/comments",
            get(posts::list_comments).post(posts::add_comment),
        )
        .route("/feed", get(posts::get_feed))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route(
            "/notifications/{notification_id}/read",
            put(notifications::mark_read),
        );

    let ws_routes = Router::new()
        .route("/feed", get(socket::feed_socket))
        .route("/notifications", get(socket::notifications_socket));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .nest("/ws", ws_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::get_current_user,
        users::update_current_user,
        communities::create_community,
        communities::my_communities,
        communities::join_community,
        communities::leave_community,
        posts::create_post,
        posts::get_feed,
        posts::toggle_like,
        posts::add_comment,
        posts::list_comments,
        posts::delete_post,
        notifications::list_notifications,
        notifications::unread_count,
        notifications::mark_read,
        notifications::mark_all_read
    ),
    components(
        schemas(
            UserId,
            CommunityId,
            PostId,
            UserProfile,
            UpdateProfileRequest,
            Community,
            CommunitySummary,
            CreateCommunityRequest,
            Membership,
            communities::MyCommunity,
            CreatePostRequest,
            CreateCommentRequest,
            Comment,
            PostView,
            FeedItem,
            PostDelta,
            PostRemoved,
            LikeToggleResponse,
            NotificationKind,
            NotificationView,
            UnreadCount,
            MessageResponse,
            health::ReadyResponse,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "Profile of the authenticated user"),
        (name = "Communities", description = "Communities and memberships"),
        (name = "Posts", description = "Posts, feed, likes and comments"),
        (name = "Notifications", description = "Per-user notifications")
    )
)]
struct ApiDoc;

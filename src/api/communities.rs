// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Community and membership endpoints.
//!
//! Membership changes are not pushed to open `/ws/feed` connections; a member
//! starts receiving a community's events on their next connect.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::notifications::deliver;
use crate::{
    auth::Auth,
    error::ApiError,
    models::{
        Community, CommunityId, CreateCommunityRequest, Membership, MessageResponse,
        NotificationKind,
    },
    state::AppState,
    storage::NewNotification,
};

const MAX_NAME_LEN: usize = 100;

/// A community the caller belongs to, with their join date.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MyCommunity {
    #[serde(flatten)]
    pub community: Community,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

/// Create a community. The caller becomes its first member.
#[utoipa::path(
    post,
    path = "/v1/communities",
    tag = "Communities",
    security(("bearer_auth" = [])),
    request_body = CreateCommunityRequest,
    responses(
        (status = 201, description = "Community created", body = Community),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_community(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<Community>), ApiError> {
    let name_len = request.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }

    let community = state
        .with_db(move |db| db.create_community(user.user_id, &request))
        .await?;
    tracing::info!(community_id = %community.id, user_id = %user.user_id, "Community created");
    Ok((StatusCode::CREATED, Json(community)))
}

/// Communities the caller belongs to.
#[utoipa::path(
    get,
    path = "/v1/communities/mine",
    tag = "Communities",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's communities", body = [MyCommunity]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn my_communities(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<Vec<MyCommunity>>, ApiError> {
    let memberships = state
        .with_db(move |db| db.memberships_of(user.user_id))
        .await?;
    Ok(Json(
        memberships
            .into_iter()
            .map(|(community, membership)| MyCommunity {
                community,
                joined_at: membership.joined_at,
            })
            .collect(),
    ))
}

/// Join a community.
///
/// Existing members get a `NEW_MEMBER` notification.
#[utoipa::path(
    post,
    path = "/v1/communities/{community_id}/join",
    tag = "Communities",
    security(("bearer_auth" = [])),
    params(("community_id" = u64, Path, description = "Community ID")),
    responses(
        (status = 201, description = "Joined", body = Membership),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Community not found"),
        (status = 409, description = "Already a member")
    )
)]
pub async fn join_community(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(community_id): Path<u64>,
) -> Result<(StatusCode, Json<Membership>), ApiError> {
    let community_id = CommunityId(community_id);
    let joiner = user.user_id;

    let (membership, community, members, joiner_name) = state
        .with_db(move |db| {
            let membership = db.join_community(joiner, community_id)?;
            let community = db.community(community_id)?;
            let members = db.members_of(community_id)?;
            let joiner_name = db.profile(joiner)?.display_name();
            Ok((membership, community, members, joiner_name))
        })
        .await?;

    tracing::info!(community_id = %community_id, user_id = %joiner, "Joined community");

    let community_name = community.map(|c| c.name).unwrap_or_default();
    let text = format!("{joiner_name} joined {community_name}");
    let batch = members
        .into_iter()
        .filter(|member| *member != joiner)
        .map(|member| NewNotification {
            recipient: member,
            kind: NotificationKind::NewMember,
            content: text.clone(),
            reference_id: Some(community_id.0),
            reference_type: Some("Community".to_string()),
        })
        .collect();
    deliver(&state, batch).await;

    Ok((StatusCode::CREATED, Json(membership)))
}

/// Leave a community.
#[utoipa::path(
    delete,
    path = "/v1/communities/{community_id}/membership",
    tag = "Communities",
    security(("bearer_auth" = [])),
    params(("community_id" = u64, Path, description = "Community ID")),
    responses(
        (status = 200, description = "Left the community", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not a member")
    )
)]
pub async fn leave_community(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(community_id): Path<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let community_id = CommunityId(community_id);
    state
        .with_db(move |db| db.leave_community(user.user_id, community_id))
        .await?;
    tracing::info!(community_id = %community_id, user_id = %user.user_id, "Left community");
    Ok(Json(MessageResponse::new("Left community")))
}

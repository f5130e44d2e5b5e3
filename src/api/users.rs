// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{UpdateProfileRequest, UserProfile},
    state::AppState,
};

const MAX_NAME_LEN: usize = 100;

/// Get the current user's profile.
///
/// Users that never set a profile get one with empty names.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "User profile", body = UserProfile),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state.with_db(move |db| db.profile(user.user_id)).await?;
    Ok(Json(profile))
}

/// Set the current user's display names.
#[utoipa::path(
    put,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Name too long"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn update_current_user(
    Auth(user): Auth,
    State(state): State<AppState>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let too_long = [&request.first_name, &request.last_name]
        .into_iter()
        .flatten()
        .any(|name| name.trim().chars().count() > MAX_NAME_LEN);
    if too_long {
        return Err(ApiError::bad_request(format!(
            "Names must be at most {MAX_NAME_LEN} characters"
        )));
    }

    let profile = state
        .with_db(move |db| db.upsert_profile(user.user_id, &request))
        .await?;
    Ok(Json(profile))
}

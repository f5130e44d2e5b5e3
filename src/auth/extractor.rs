// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedUser};
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Validates the access token from the `Authorization` header with the
/// application's [`TokenVerifier`](super::TokenVerifier).
///
/// # Example
///
/// ```rust,ignore
/// async fn list_notifications(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<Page<NotificationView>>, ApiError> {
///     // user.user_id is the caller's identity
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Already authenticated by an outer layer
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().copied() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = state.verifier.authenticate(token)?;
        parts.extensions.insert(user);

        Ok(Auth(user))
    }
}

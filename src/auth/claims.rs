// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access-token claims and the authenticated user.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::UserId;

/// Claims carried by an access token.
///
/// The user identity travels in `userID`, which is what existing clients and
/// previously issued tokens use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Numeric user identity
    #[serde(rename = "userID")]
    pub user_id: Option<u64>,

    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,
}

/// Authenticated user information extracted from a verified token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Verified user identity
    pub user_id: UserId,

    /// Token expiration (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 access-token verification and issuance.
//!
//! The same verifier backs the REST `Auth` extractor and the WebSocket
//! handshake, so both surfaces accept exactly the same credentials.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::{AccessClaims, AuthError, AuthenticatedUser};
use crate::models::UserId;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Default lifetime of issued access tokens (15 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

const BEARER_PREFIX: &str = "Bearer ";

/// Verifies access tokens signed with a shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Create a verifier for the given HS256 secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Set the lifetime of tokens produced by [`TokenVerifier::issue`].
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Verify a credential and return the identity it carries.
    ///
    /// The credential may carry a `Bearer ` prefix.
    pub fn verify(&self, credential: &str) -> Result<UserId, AuthError> {
        self.authenticate(credential).map(|user| user.user_id)
    }

    /// Verify a credential and return the full authenticated user.
    pub fn authenticate(&self, credential: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = strip_bearer(credential).ok_or(AuthError::MissingToken)?;

        let token_data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })?;

        let claims = token_data.claims;
        match claims.user_id {
            Some(id) if id > 0 => Ok(AuthenticatedUser {
                user_id: UserId(id),
                expires_at: claims.exp,
            }),
            _ => Err(AuthError::InvalidPayload),
        }
    }

    /// Issue an access token for a user.
    pub fn issue(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.token_ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign(&AccessClaims {
            user_id: Some(user_id.0),
            iat: now,
            exp: now.saturating_add(ttl),
        })
    }

    fn sign(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("Failed to sign token: {e}")))
    }
}

/// Trim whitespace and an optional `Bearer ` prefix. `None` if nothing is left.
pub fn strip_bearer(credential: &str) -> Option<&str> {
    let trimmed = credential.trim();
    let token = trimmed.strip_prefix(BEARER_PREFIX).unwrap_or(trimmed).trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

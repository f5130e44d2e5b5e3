// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Access-token authentication for the REST API and the real-time channels.
//!
//! ## Auth Flow
//!
//! 1. Client holds an HS256 access token whose `userID` claim is its identity
//! 2. REST requests send `Authorization: Bearer <token>`
//! 3. WebSocket handshakes send the token as `?token=`, a `token` header, or
//!    an `Authorization` header (first non-empty source wins)
//! 4. [`TokenVerifier`] checks signature and expiry and yields a [`UserId`]
//!
//! ## Security
//!
//! - All `/v1` endpoints and both channels require a valid token
//! - Clock skew tolerance is 60 seconds
//!
//! [`UserId`]: crate::models::UserId

pub mod claims;
pub mod error;
pub mod extractor;
pub mod verifier;

pub use claims::{AccessClaims, AuthenticatedUser};
pub use error::AuthError;
pub use extractor::Auth;
pub use verifier::{strip_bearer, TokenVerifier};

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connection handshake and activation shared by both channels.
//!
//! A connection is verified once, its full address set is computed, and only
//! then is it registered and subscribed. A failure at any step leaves nothing
//! in the registry.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};

use super::connection::{ConnectionState, Lifecycle};
use super::protocol::{ConnectedInfo, ControlFrame};
use super::registry::{ConnectionId, ConnectionRegistry};
use super::resolver::{MembershipResolver, ResolverError};
use super::{Address, ConnectionSender};
use crate::auth::{AuthError, TokenVerifier};
use crate::models::{CommunityId, UserId};

/// Close code: credential expired.
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
/// Close code: credential missing or invalid.
pub const CLOSE_TOKEN_INVALID: u16 = 4002;
/// Close code: memberships could not be resolved.
pub const CLOSE_RESOLVER_UNAVAILABLE: u16 = 4003;

/// Header carrying the raw token, checked after the `token` query parameter.
pub const TOKEN_HEADER: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Notifications,
    Feed,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Notifications => "notifications",
            Channel::Feed => "feed",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("membership lookup failed after {attempts} attempts: {source}")]
    ResolverUnavailable {
        attempts: u32,
        #[source]
        source: ResolverError,
    },
}

impl HandshakeError {
    /// WebSocket close code sent to the rejected client.
    pub fn close_code(&self) -> u16 {
        match self {
            HandshakeError::Auth(AuthError::TokenExpired) => CLOSE_TOKEN_EXPIRED,
            HandshakeError::Auth(_) => CLOSE_TOKEN_INVALID,
            HandshakeError::ResolverUnavailable { .. } => CLOSE_RESOLVER_UNAVAILABLE,
        }
    }

    pub fn close_reason(&self) -> &'static str {
        match self {
            HandshakeError::Auth(AuthError::TokenExpired) => "Token expired",
            HandshakeError::Auth(AuthError::MissingToken) => "Token missing",
            HandshakeError::Auth(_) => "Token invalid",
            HandshakeError::ResolverUnavailable { .. } => "Membership lookup unavailable",
        }
    }
}

/// Bounded retry for membership lookups during a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total lookups per handshake, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Pick the handshake credential: `token` query parameter, then `token`
/// header, then `Authorization` header. Empty values are skipped.
pub fn extract_credential(query_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    let from_header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    [
        query_token,
        from_header(TOKEN_HEADER),
        from_header(AUTHORIZATION.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|value| !value.is_empty())
    .map(str::to_string)
}

/// Real-time gateway for one channel.
#[derive(Clone)]
pub struct Gateway {
    channel: Channel,
    registry: ConnectionRegistry,
    verifier: Arc<TokenVerifier>,
    resolver: Option<Arc<dyn MembershipResolver>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("channel", &self.channel)
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Gateway that subscribes connections to their user address only.
    pub fn notifications(verifier: Arc<TokenVerifier>) -> Self {
        Self {
            channel: Channel::Notifications,
            registry: ConnectionRegistry::new(),
            verifier,
            resolver: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Gateway that also subscribes connections to their communities.
    pub fn feed(
        verifier: Arc<TokenVerifier>,
        resolver: Arc<dyn MembershipResolver>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            channel: Channel::Feed,
            registry: ConnectionRegistry::new(),
            verifier,
            resolver: Some(resolver),
            retry,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Authenticate and subscribe a new connection.
    ///
    /// On success the returned [`Session`] owns the registry entry and removes
    /// it when closed or dropped. On failure nothing was registered.
    pub async fn connect(
        &self,
        credential: Option<&str>,
        sender: ConnectionSender,
    ) -> Result<Session, HandshakeError> {
        let mut lifecycle = Lifecycle::new(ConnectionId::new());

        let user_id = match self.authenticate(credential) {
            Ok(user_id) => user_id,
            Err(e) => {
                self.reject(&mut lifecycle, &e);
                return Err(e);
            }
        };
        step(&mut lifecycle, ConnectionState::Authenticating);

        let communities = match self.communities_of(user_id).await {
            Ok(communities) => communities,
            Err(e) => {
                self.reject(&mut lifecycle, &e);
                return Err(e);
            }
        };

        // Full address set is known before anything is registered
        let addresses: Vec<Address> = std::iter::once(Address::User(user_id))
            .chain(communities.iter().copied().map(Address::Group))
            .collect();

        let id = lifecycle.id();
        self.registry.register(id, user_id, sender);
        for address in &addresses {
            self.registry.subscribe(id, *address);
        }
        step(&mut lifecycle, ConnectionState::Active);

        tracing::info!(
            channel = %self.channel,
            connection_id = %id,
            user_id = %user_id,
            communities = communities.len(),
            "Real-time connection active"
        );

        Ok(Session {
            lifecycle,
            channel: self.channel,
            user_id,
            communities: communities.into_iter().collect(),
            registry: self.registry.clone(),
        })
    }

    fn authenticate(&self, credential: Option<&str>) -> Result<UserId, HandshakeError> {
        let credential = credential.ok_or(AuthError::MissingToken)?;
        Ok(self.verifier.verify(credential)?)
    }

    async fn communities_of(&self, user_id: UserId) -> Result<BTreeSet<CommunityId>, HandshakeError> {
        let Some(resolver) = &self.resolver else {
            return Ok(BTreeSet::new());
        };

        let attempts = self.retry.attempts.max(1);
        let mut last_error = ResolverError::Unavailable("no lookup attempted".to_string());
        for attempt in 1..=attempts {
            let resolver = Arc::clone(resolver);
            let result = tokio::task::spawn_blocking(move || resolver.resolve_groups(user_id))
                .await
                .unwrap_or_else(|e| {
                    Err(ResolverError::Unavailable(format!("lookup task failed: {e}")))
                });

            match result {
                Ok(communities) => return Ok(communities),
                Err(e) => {
                    tracing::warn!(
                        channel = %self.channel,
                        user_id = %user_id,
                        attempt,
                        attempts,
                        error = %e,
                        "Membership lookup failed"
                    );
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff * attempt).await;
                    }
                }
            }
        }

        Err(HandshakeError::ResolverUnavailable {
            attempts,
            source: last_error,
        })
    }

    fn reject(&self, lifecycle: &mut Lifecycle, error: &HandshakeError) {
        step(lifecycle, ConnectionState::Rejected);
        tracing::warn!(
            channel = %self.channel,
            connection_id = %lifecycle.id(),
            close_code = error.close_code(),
            error = %error,
            "Real-time handshake rejected"
        );
    }
}

fn step(lifecycle: &mut Lifecycle, next: ConnectionState) {
    if let Err(e) = lifecycle.advance(next) {
        tracing::error!(connection_id = %lifecycle.id(), error = %e, "Connection state out of order");
    }
}

/// An active, subscribed connection.
///
/// Removes itself from the registry on [`Session::close`] or on drop.
pub struct Session {
    lifecycle: Lifecycle,
    channel: Channel,
    user_id: UserId,
    communities: Vec<CommunityId>,
    registry: ConnectionRegistry,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("lifecycle", &self.lifecycle)
            .field("channel", &self.channel)
            .field("user_id", &self.user_id)
            .field("communities", &self.communities)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.lifecycle.id()
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Communities resolved at handshake time.
    pub fn communities(&self) -> &[CommunityId] {
        &self.communities
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Frame announcing the activated connection to its client.
    pub fn connected_frame(&self) -> ControlFrame {
        ControlFrame::Connected(ConnectedInfo {
            connection_id: self.id(),
            channel: self.channel,
            user_id: self.user_id,
            communities: self.communities.clone(),
        })
    }

    /// Release every subscription. Returns how many were released; `0` if the
    /// session was already closed.
    pub fn close(&mut self) -> usize {
        if self.lifecycle.state() == ConnectionState::Active {
            step(&mut self.lifecycle, ConnectionState::Closed);
        }
        let released = self.registry.remove_connection(self.id());
        if released > 0 {
            tracing::info!(
                channel = %self.channel,
                connection_id = %self.id(),
                user_id = %self.user_id,
                released,
                "Real-time connection closed"
            );
        }
        released
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

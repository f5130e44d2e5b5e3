// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::TokenVerifier;
use crate::error::ApiError;
use crate::realtime::{FeedGateway, Heartbeat, MembershipResolver, NotificationGateway, RetryPolicy};
use crate::storage::{DbResult, FeedDatabase};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Durable store; the source of truth for every REST read.
    pub db: Arc<FeedDatabase>,
    /// Verifies access tokens for REST and WebSocket handshakes.
    pub verifier: Arc<TokenVerifier>,
    /// `/ws/feed` gateway.
    pub feed: FeedGateway,
    /// `/ws/notifications` gateway.
    pub notifications: NotificationGateway,
    /// Ping timing for WebSocket connections.
    pub heartbeat: Heartbeat,
    /// Cancelled once on shutdown; every WebSocket actor closes its socket.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: Arc<FeedDatabase>, verifier: Arc<TokenVerifier>, retry: RetryPolicy) -> Self {
        let resolver: Arc<dyn MembershipResolver> = db.clone();
        Self {
            feed: FeedGateway::new(verifier.clone(), resolver, retry),
            notifications: NotificationGateway::new(verifier.clone()),
            db,
            verifier,
            heartbeat: Heartbeat::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Run a storage operation on the blocking pool.
    pub async fn with_db<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&FeedDatabase) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || op(&db)).await??)
    }
}

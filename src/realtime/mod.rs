// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Real-Time Fan-Out
//!
//! Pushes feed and notification events to connected WebSocket clients.
//!
//! ## Channels
//!
//! | Endpoint | Subscriptions | Events |
//! |----------|---------------|--------|
//! | `GET /ws/notifications` | `user:<id>` | `notification` |
//! | `GET /ws/feed` | `user:<id>`, `group:<communityId>` per membership | `new_post`, `post_updated`, `post_deleted` |
//!
//! Each channel has its own [`ConnectionRegistry`]. Memberships are resolved
//! once per connection; joining a community takes effect on the next connect.
//!
//! Delivery is best-effort. Nothing is queued for offline users and REST
//! stays the source of truth.

pub mod address;
pub mod connection;
pub mod event;
pub mod feed;
pub mod gateway;
pub mod notifications;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod socket;

use tokio::sync::mpsc;

pub use address::Address;
pub use connection::ConnectionState;
pub use event::Event;
pub use feed::FeedGateway;
pub use gateway::{Channel, Gateway, HandshakeError, RetryPolicy, Session};
pub use notifications::NotificationGateway;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use resolver::{MembershipResolver, ResolverError};
pub use socket::Heartbeat;

/// Queue feeding one connection's writer task. Clone it to push frames to
/// that client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Community Feed Server - posts, communities and notifications with
//! real-time fan-out.
//!
//! REST writes are committed to an embedded redb store and then pushed to
//! connected WebSocket clients: feed events to every member of a community,
//! notifications to a single user.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Access-token verification (HS256 JWT)
//! - `realtime` - Connection registry, gateways and WebSocket actors
//! - `storage` - Embedded database (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod state;
pub mod storage;

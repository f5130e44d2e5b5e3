// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Control frames exchanged outside the event stream.
//!
//! Server → client: `connected` once the connection is subscribed, and `ack`
//! in reply to a client acknowledgement. Client → server: `ack` (notifications
//! channel). Unknown client frames are ignored.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use super::gateway::Channel;
use super::registry::ConnectionId;
use crate::models::{CommunityId, UserId};

/// Sent once after a connection becomes active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedInfo {
    pub connection_id: ConnectionId,
    pub channel: Channel,
    pub user_id: UserId,
    /// Communities whose broadcasts this connection receives. Empty on the
    /// notifications channel.
    pub communities: Vec<CommunityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckReceipt {
    pub received: bool,
}

/// Server-originated control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ControlFrame {
    Connected(ConnectedInfo),
    Ack(AckReceipt),
}

impl ControlFrame {
    pub fn ack() -> Self {
        ControlFrame::Ack(AckReceipt { received: true })
    }

    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Frame received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Ack,
    Unknown(String),
}

#[derive(Deserialize)]
struct RawClientFrame {
    event: String,
}

impl ClientFrame {
    /// Parse a client text frame. Only the `event` field is inspected.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawClientFrame = serde_json::from_str(text)?;
        Ok(match raw.event.as_str() {
            "ack" => ClientFrame::Ack,
            _ => ClientFrame::Unknown(raw.event),
        })
    }
}

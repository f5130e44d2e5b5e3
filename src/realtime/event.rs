// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Events pushed to subscribers.
//!
//! Each event goes out as one text frame `{"event": "<kind>", "data": {...}}`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::models::{NotificationView, PostDelta, PostRemoved, PostView};

/// An event fanned out to every connection subscribed to an address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    NewPost(PostView),
    PostUpdated(PostDelta),
    PostDeleted(PostRemoved),
    Notification(NotificationView),
}

impl Event {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewPost(_) => "new_post",
            Event::PostUpdated(_) => "post_updated",
            Event::PostDeleted(_) => "post_deleted",
            Event::Notification(_) => "notification",
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

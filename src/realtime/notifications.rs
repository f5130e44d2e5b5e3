// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The `/notifications` channel: per-user notices.

use std::sync::Arc;

use super::gateway::Gateway;
use super::{Address, Event};
use crate::auth::TokenVerifier;
use crate::models::{NotificationView, UserId};

#[derive(Debug, Clone)]
pub struct NotificationGateway {
    gateway: Gateway,
}

impl NotificationGateway {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self {
            gateway: Gateway::notifications(verifier),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Push a stored notification to every live connection of its recipient.
    pub fn publish_to_user(&self, user_id: UserId, notification: NotificationView) -> usize {
        self.gateway
            .registry()
            .publish(Address::User(user_id), &Event::Notification(notification))
    }
}

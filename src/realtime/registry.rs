// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process connection registry.
//!
//! Two sharded maps:
//!
//! - `connections`: connection id → identity, subscribed addresses, sender
//! - `addresses`: address → senders of the connections subscribed to it
//!
//! Lock order is always `connections` then `addresses`. Publishing copies the
//! senders out of the address shard before sending, so no shard is held while
//! frames are queued.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Address, ConnectionSender, Event};
use crate::models::UserId;

/// Opaque identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct ConnectionEntry {
    identity: UserId,
    addresses: HashSet<Address>,
    sender: ConnectionSender,
}

#[derive(Default)]
struct RegistryInner {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    addresses: DashMap<Address, HashMap<ConnectionId, ConnectionSender>>,
}

/// Shared registry of live connections. Cloning is cheap.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.inner.connections.len())
            .field("addresses", &self.inner.addresses.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection with no subscriptions.
    pub fn register(&self, id: ConnectionId, identity: UserId, sender: ConnectionSender) {
        self.inner.connections.insert(
            id,
            ConnectionEntry {
                identity,
                addresses: HashSet::new(),
                sender,
            },
        );
    }

    /// Subscribe a connection to an address.
    ///
    /// Returns `true` if the subscription is new. Subscribing twice, or
    /// subscribing an unknown connection, returns `false`.
    pub fn subscribe(&self, id: ConnectionId, address: Address) -> bool {
        let Some(mut entry) = self.inner.connections.get_mut(&id) else {
            tracing::debug!(connection_id = %id, %address, "Subscribe for unknown connection");
            return false;
        };
        if !entry.addresses.insert(address) {
            return false;
        }
        let sender = entry.sender.clone();
        self.inner
            .addresses
            .entry(address)
            .or_default()
            .insert(id, sender);
        true
    }

    /// Unsubscribe a connection from an address. No-op if not subscribed.
    pub fn unsubscribe(&self, id: ConnectionId, address: Address) -> bool {
        let Some(mut entry) = self.inner.connections.get_mut(&id) else {
            return false;
        };
        if !entry.addresses.remove(&address) {
            return false;
        }
        self.detach(id, address);
        true
    }

    /// Remove a connection and every subscription it holds.
    ///
    /// Returns the number of subscriptions released; `0` when the connection
    /// was already removed.
    pub fn remove_connection(&self, id: ConnectionId) -> usize {
        let Some((_, entry)) = self.inner.connections.remove(&id) else {
            return 0;
        };
        for address in &entry.addresses {
            self.detach(id, *address);
        }
        tracing::debug!(
            connection_id = %id,
            user_id = %entry.identity,
            released = entry.addresses.len(),
            "Connection removed from registry"
        );
        entry.addresses.len()
    }

    fn detach(&self, id: ConnectionId, address: Address) {
        if let Some(mut subscribers) = self.inner.addresses.get_mut(&address) {
            subscribers.remove(&id);
        }
        self.inner
            .addresses
            .remove_if(&address, |_, subscribers| subscribers.is_empty());
    }

    /// Send an event to every connection subscribed to `address`.
    ///
    /// Returns how many connections the event was queued for. A failed send
    /// is logged and skipped; no subscribers is not an error.
    pub fn publish(&self, address: Address, event: &Event) -> usize {
        let targets: Vec<(ConnectionId, ConnectionSender)> = match self.inner.addresses.get(&address)
        {
            Some(subscribers) => subscribers
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect(),
            None => return 0,
        };

        let message = match event.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(%address, event = event.kind(), error = %e, "Failed to encode event");
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, sender) in targets {
            match sender.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!(
                    connection_id = %id,
                    %address,
                    event = event.kind(),
                    "Dropping event for closed connection"
                ),
            }
        }

        tracing::debug!(%address, event = event.kind(), delivered, "Event published");
        delivered
    }

    /// Number of connections subscribed to `address`.
    pub fn subscriber_count(&self, address: Address) -> usize {
        self.inner
            .addresses
            .get(&address)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Number of addresses with at least one subscriber.
    pub fn address_count(&self) -> usize {
        self.inner.addresses.len()
    }

    /// Addresses a connection is subscribed to, if it is registered.
    pub fn addresses_of(&self, id: ConnectionId) -> Option<Vec<Address>> {
        self.inner.connections.get(&id).map(|entry| {
            let mut addresses: Vec<Address> = entry.addresses.iter().copied().collect();
            addresses.sort();
            addresses
        })
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-connection lifecycle.
//!
//! ```text
//! Connecting ──verify ok──▶ Authenticating ──subscribed──▶ Active ──disconnect──▶ Closed
//!     │                          │
//!     └──verify failed──▶ Rejected ◀──resolver failed──┘
//! ```

use std::fmt;

use super::registry::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade accepted, credential not yet verified.
    Connecting,
    /// Identity known, subscriptions being computed.
    Authenticating,
    /// Subscribed and receiving events.
    Active,
    /// Handshake failed. Terminal; never subscribed.
    Rejected,
    /// Disconnected after being active. Terminal.
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Connecting, Rejected)
                | (Authenticating, Active)
                | (Authenticating, Rejected)
                | (Active, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Rejected | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Active => "active",
            ConnectionState::Rejected => "rejected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Tracks the state of one connection.
#[derive(Debug)]
pub struct Lifecycle {
    id: ConnectionId,
    state: ConnectionState,
}

impl Lifecycle {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn advance(&mut self, next: ConnectionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(connection_id = %self.id, from = %self.state, to = %next, "Connection state");
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_closed() {
        let mut lifecycle = Lifecycle::new(ConnectionId::new());
        lifecycle.advance(ConnectionState::Authenticating).unwrap();
        lifecycle.advance(ConnectionState::Active).unwrap();
        lifecycle.advance(ConnectionState::Closed).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn rejected_is_terminal() {
        let mut lifecycle = Lifecycle::new(ConnectionId::new());
        lifecycle.advance(ConnectionState::Rejected).unwrap();

        let err = lifecycle.advance(ConnectionState::Active).unwrap_err();
        assert_eq!(err.from, ConnectionState::Rejected);
        assert_eq!(lifecycle.state(), ConnectionState::Rejected);
    }

    #[test]
    fn cannot_skip_authentication() {
        assert!(!ConnectionState::Connecting.can_transition_to(ConnectionState::Active));
        assert!(!ConnectionState::Active.can_transition_to(ConnectionState::Rejected));
    }
}

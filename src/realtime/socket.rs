// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebSocket endpoints and the per-connection actor.
//!
//! Every upgrade is accepted. The handshake then runs on the open socket so a
//! rejected client receives a close frame with an application close code
//! instead of a bare HTTP error.
//!
//! Each connection runs:
//! - a writer task that owns the sink and drains the connection's queue
//! - a ping task that closes the socket when pongs stop arriving
//! - the reader loop, which ends the connection on close, error, EOF, a
//!   heartbeat timeout, writer exit or server shutdown
//!
//! Whatever ends the loop, the session is released from the registry before
//! the actor returns.

use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

use super::gateway::{extract_credential, Channel, Gateway};
use super::protocol::{ClientFrame, ControlFrame};
use super::ConnectionSender;
use crate::state::AppState;

/// Close code sent when the client stops answering pings or the server stops.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Time the writer gets to flush a final close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Keep-alive timing for live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Delay between server pings.
    pub interval: Duration,
    /// How long to wait for the pong after each ping.
    pub pong_timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// GET /ws/feed
pub async fn feed_socket(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let gateway = state.feed.gateway().clone();
    upgrade(ws, gateway, &state, &query, &headers)
}

/// GET /ws/notifications
pub async fn notifications_socket(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let gateway = state.notifications.gateway().clone();
    upgrade(ws, gateway, &state, &query, &headers)
}

fn upgrade(
    ws: WebSocketUpgrade,
    gateway: Gateway,
    state: &AppState,
    query: &SocketQuery,
    headers: &HeaderMap,
) -> Response {
    let credential = extract_credential(query.token.as_deref(), headers);
    let heartbeat = state.heartbeat;
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| run_connection(socket, gateway, credential, heartbeat, shutdown))
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Run one connection from handshake to teardown.
async fn run_connection(
    socket: WebSocket,
    gateway: Gateway,
    credential: Option<String>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let channel = gateway.channel();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let mut session = match gateway.connect(credential.as_deref(), tx.clone()).await {
        Ok(session) => session,
        Err(e) => {
            let _ = tx.send(close_message(e.close_code(), e.close_reason()));
            drop(tx);
            // Let the writer flush the close frame
            if timeout(CLOSE_FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
                writer_handle.abort();
            }
            return;
        }
    };

    let connection_id = session.id();
    let user_id = session.user_id();

    match session.connected_frame().to_message() {
        Ok(message) => {
            let _ = tx.send(message);
        }
        Err(e) => tracing::warn!(%connection_id, error = %e, "Failed to encode connected frame"),
    }

    // Cancelled by the ping task once the peer stops answering
    let heartbeat_lost = CancellationToken::new();
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let ping_tx = tx.clone();
    let ping_lost = heartbeat_lost.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(heartbeat.interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                break;
            }

            match timeout(heartbeat.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(%connection_id, "Pong timeout, closing connection");
                    let _ = ping_tx.send(close_message(CLOSE_GOING_AWAY, "Pong timeout"));
                    ping_lost.cancel();
                    break;
                }
            }
        }
    });

    let mut writer_finished = false;
    loop {
        tokio::select! {
            _ = heartbeat_lost.cancelled() => break,
            _ = shutdown.cancelled() => {
                tracing::debug!(%connection_id, "Server shutting down, closing connection");
                let _ = tx.send(close_message(CLOSE_GOING_AWAY, "Server shutting down"));
                break;
            }
            _ = &mut writer_handle => {
                tracing::debug!(%connection_id, "Writer stopped");
                writer_finished = true;
                break;
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(msg)) => match msg {
                        Message::Text(text) => handle_text(channel, text.as_str(), &tx, &session),
                        Message::Binary(_) => {
                            tracing::debug!(%connection_id, "Ignoring binary frame");
                        }
                        Message::Pong(_) => {
                            let _ = pong_tx.send(());
                        }
                        // Answered by the transport
                        Message::Ping(_) => {}
                        Message::Close(frame) => {
                            tracing::debug!(%connection_id, reason = ?frame, "Client initiated close");
                            break;
                        }
                    },
                    Some(Err(e)) => {
                        tracing::warn!(%connection_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::debug!(%connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    ping_handle.abort();
    session.close();
    drop(tx);

    // A queued close frame gets a bounded chance to reach the peer
    if !writer_finished && timeout(CLOSE_FLUSH_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::debug!(%channel, %connection_id, %user_id, "WebSocket actor stopped");
}

fn handle_text(channel: Channel, text: &str, tx: &ConnectionSender, session: &super::Session) {
    match ClientFrame::parse(text) {
        Ok(ClientFrame::Ack) if channel == Channel::Notifications => {
            tracing::debug!(connection_id = %session.id(), user_id = %session.user_id(), "Client ack");
            if let Ok(reply) = ControlFrame::ack().to_message() {
                let _ = tx.send(reply);
            }
        }
        Ok(frame) => {
            tracing::debug!(connection_id = %session.id(), ?frame, "Ignoring client frame");
        }
        Err(e) => {
            tracing::debug!(connection_id = %session.id(), error = %e, "Ignoring malformed client frame");
        }
    }
}

/// Forward queued messages to the socket until the queue closes or a close
/// frame has been written.
async fn writer_task(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err() {
            break;
        }
        if is_close {
            break;
        }
    }
}

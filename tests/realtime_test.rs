// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end tests: a real server on a loopback port, REST writes through
//! reqwest and WebSocket clients through tokio-tungstenite.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};

use community_feed_server::{
    api::router,
    auth::TokenVerifier,
    models::UserId,
    realtime::{Address, Heartbeat, RetryPolicy},
    state::AppState,
    storage::{FeedDatabase, DATABASE_FILE},
};

const SECRET: &str = "integration-test-secret";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE_WINDOW: Duration = Duration::from_millis(300);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    verifier: TokenVerifier,
    http: reqwest::Client,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(Heartbeat::default()).await
    }

    async fn start_with(heartbeat: Heartbeat) -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let dir = TempDir::new().unwrap();
        let db = FeedDatabase::open(&dir.path().join(DATABASE_FILE)).unwrap();
        let verifier = TokenVerifier::new(SECRET);
        let retry = RetryPolicy {
            attempts: 1,
            ..RetryPolicy::default()
        };
        let state = AppState::new(Arc::new(db), Arc::new(verifier.clone()), retry)
            .with_heartbeat(heartbeat);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            verifier,
            http: reqwest::Client::new(),
            _dir: dir,
        }
    }

    fn token(&self, user: u64) -> String {
        self.verifier.issue(UserId(user)).unwrap()
    }

    fn ws_url(&self, channel: &str, user: u64) -> String {
        format!("ws://{}/ws/{channel}?token={}", self.addr, self.token(user))
    }

    async fn post(&self, user: u64, path: &str, body: Value) -> Value {
        let response = self
            .http
            .post(format!("http://{}{path}", self.addr))
            .bearer_auth(self.token(user))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(
            response.status().is_success(),
            "POST {path} failed: {}",
            response.status()
        );
        response.json().await.unwrap()
    }

    async fn create_community(&self, user: u64, name: &str) -> u64 {
        let community = self
            .post(user, "/v1/communities", json!({ "name": name }))
            .await;
        community["id"].as_u64().unwrap()
    }

    async fn join(&self, user: u64, community: u64) {
        self.post(user, &format!("/v1/communities/{community}/join"), json!({}))
            .await;
    }

    async fn create_post(&self, user: u64, community: u64, content: &str) -> u64 {
        let post = self
            .post(
                user,
                "/v1/posts",
                json!({ "communityId": community, "content": content }),
            )
            .await;
        post["id"].as_u64().unwrap()
    }

    /// Open a channel and wait until the server reports the subscription.
    async fn connect(&self, channel: &str, user: u64) -> (Client, Value) {
        let (mut client, _) = connect_async(self.ws_url(channel, user)).await.unwrap();
        let connected = next_event(&mut client).await;
        assert_eq!(connected["event"], "connected");
        (client, connected["data"].clone())
    }
}

/// Wait until `count` reports zero.
async fn wait_for_zero(count: impl Fn() -> usize) {
    timeout(RECV_TIMEOUT, async {
        while count() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection was never released");
}

/// Next text frame as JSON, skipping keep-alive frames.
async fn next_event(client: &mut Client) -> Value {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("receive error");
        match message {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn assert_silent(client: &mut Client) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(SILENCE_WINDOW, client.next()).await {
        panic!("expected no event, got {text}");
    }
}

async fn close_code(client: &mut Client) -> u16 {
    loop {
        let message = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended before close")
            .expect("receive error");
        if let Message::Close(frame) = message {
            return frame.map(|f| u16::from(f.code)).unwrap_or_default();
        }
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn missing_token_is_closed_with_4002() {
    let server = TestServer::start().await;
    let url = format!("ws://{}/ws/feed", server.addr);
    let (mut client, _) = connect_async(url).await.unwrap();
    assert_eq!(close_code(&mut client).await, 4002);
}

#[tokio::test]
async fn garbage_token_is_closed_with_4002() {
    let server = TestServer::start().await;
    let url = format!("ws://{}/ws/notifications?token=not-a-jwt", server.addr);
    let (mut client, _) = connect_async(url).await.unwrap();
    assert_eq!(close_code(&mut client).await, 4002);
}

#[tokio::test]
async fn expired_token_is_closed_with_4001() {
    let server = TestServer::start().await;
    let now = chrono::Utc::now().timestamp();
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &json!({ "userID": 1, "iat": now - 7200, "exp": now - 3600 }),
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let url = format!("ws://{}/ws/feed?token={token}", server.addr);
    let (mut client, _) = connect_async(url).await.unwrap();
    assert_eq!(close_code(&mut client).await, 4001);
}

#[tokio::test]
async fn token_header_is_accepted() {
    let server = TestServer::start().await;
    let mut request = format!("ws://{}/ws/notifications", server.addr)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "token",
        HeaderValue::from_str(&server.token(7)).unwrap(),
    );

    let (mut client, _) = connect_async(request).await.unwrap();
    let connected = next_event(&mut client).await;
    assert_eq!(connected["event"], "connected");
    assert_eq!(connected["data"]["userId"], 7);
    assert_eq!(connected["data"]["channel"], "notifications");
}

#[tokio::test]
async fn feed_connected_frame_lists_memberships() {
    let server = TestServer::start().await;
    let first = server.create_community(1, "rust").await;
    let second = server.create_community(1, "tokio").await;

    let (_client, connected) = server.connect("feed", 1).await;
    assert_eq!(connected["channel"], "feed");
    let mut communities: Vec<u64> = connected["communities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_u64().unwrap())
        .collect();
    communities.sort_unstable();
    assert_eq!(communities, vec![first, second]);
}

// =========================================================================
// Feed fan-out
// =========================================================================

#[tokio::test]
async fn new_post_reaches_members_only() {
    let server = TestServer::start().await;
    let shared = server.create_community(42, "shared").await;
    let other = server.create_community(99, "other").await;
    server.join(43, shared).await;

    let (mut author, _) = server.connect("feed", 42).await;
    let (mut member, _) = server.connect("feed", 43).await;
    let (mut outsider, _) = server.connect("feed", 99).await;

    let post_id = server.create_post(42, shared, "hello members").await;

    for client in [&mut author, &mut member] {
        let event = next_event(client).await;
        assert_eq!(event["event"], "new_post");
        assert_eq!(event["data"]["id"], post_id);
        assert_eq!(event["data"]["content"], "hello members");
        assert!(event["data"].get("isLiked").is_none());
    }
    assert_silent(&mut outsider).await;

    // A post in the other community only reaches its member
    server.create_post(99, other, "elsewhere").await;
    let event = next_event(&mut outsider).await;
    assert_eq!(event["event"], "new_post");
    assert_silent(&mut author).await;
}

#[tokio::test]
async fn like_broadcasts_counter_without_liked_flag() {
    let server = TestServer::start().await;
    let community = server.create_community(1, "rust").await;
    server.join(2, community).await;
    let post_id = server.create_post(1, community, "like me").await;

    let (mut viewer, _) = server.connect("feed", 1).await;
    let toggle = server
        .post(2, &format!("/v1/posts/{post_id}/like"), json!({}))
        .await;
    assert_eq!(toggle["isLiked"], true);

    let event = next_event(&mut viewer).await;
    assert_eq!(event["event"], "post_updated");
    assert_eq!(event["data"]["postId"], post_id);
    assert_eq!(event["data"]["likeCount"], 1);
    assert!(event["data"].get("isLiked").is_none());
}

#[tokio::test]
async fn membership_is_snapshotted_at_connect() {
    let server = TestServer::start().await;
    let community = server.create_community(1, "rust").await;

    let (mut early, connected) = server.connect("feed", 2).await;
    assert_eq!(connected["communities"], json!([]));

    server.join(2, community).await;
    server.create_post(1, community, "first").await;
    assert_silent(&mut early).await;

    let (mut fresh, _) = server.connect("feed", 2).await;
    server.create_post(1, community, "second").await;
    let event = next_event(&mut fresh).await;
    assert_eq!(event["data"]["content"], "second");
}

#[tokio::test]
async fn every_connection_of_a_user_receives_events() {
    let server = TestServer::start().await;
    let community = server.create_community(1, "rust").await;

    let (mut phone, _) = server.connect("feed", 1).await;
    let (mut laptop, _) = server.connect("feed", 1).await;

    server.create_post(1, community, "twice").await;
    assert_eq!(next_event(&mut phone).await["event"], "new_post");
    assert_eq!(next_event(&mut laptop).await["event"], "new_post");
}

// =========================================================================
// Notifications
// =========================================================================

#[tokio::test]
async fn notification_is_pushed_to_recipient_only() {
    let server = TestServer::start().await;
    let community = server.create_community(1, "rust").await;

    let (mut owner, _) = server.connect("notifications", 1).await;
    let (mut joiner, _) = server.connect("notifications", 2).await;

    server.join(2, community).await;

    let event = next_event(&mut owner).await;
    assert_eq!(event["event"], "notification");
    assert_eq!(event["data"]["type"], "NEW_MEMBER");
    assert_eq!(event["data"]["referenceId"], community);
    assert_eq!(event["data"]["isRead"], false);
    assert_silent(&mut joiner).await;
}

#[tokio::test]
async fn ack_is_answered_on_notifications_channel() {
    let server = TestServer::start().await;
    let (mut client, _) = server.connect("notifications", 1).await;

    client
        .send(Message::Text(r#"{"event":"ack","data":{"id":1}}"#.into()))
        .await
        .unwrap();
    let reply = next_event(&mut client).await;
    assert_eq!(reply, json!({ "event": "ack", "data": { "received": true } }));
}

#[tokio::test]
async fn ack_is_ignored_on_feed_channel() {
    let server = TestServer::start().await;
    let (mut client, _) = server.connect("feed", 1).await;

    client
        .send(Message::Text(r#"{"event":"ack"}"#.into()))
        .await
        .unwrap();
    assert_silent(&mut client).await;
}

#[tokio::test]
async fn closed_connection_is_released() {
    let server = TestServer::start().await;
    let (client, _) = server.connect("feed", 1).await;
    drop(client);

    let health: Value = timeout(RECV_TIMEOUT, async {
        loop {
            let health: Value = server
                .http
                .get(format!("http://{}/health", server.addr))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if health["connections"]["feed"] == 0 {
                return health;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection was never released");
    assert_eq!(health["status"], "ok");
}

// =========================================================================
// Heartbeat and shutdown
// =========================================================================

fn fast_heartbeat() -> Heartbeat {
    Heartbeat {
        interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn silent_client_is_released_after_pong_timeout() {
    let server = TestServer::start_with(fast_heartbeat()).await;
    let gateway = server.state.notifications.gateway().clone();

    // Reads only the connected frame, so pings go unanswered
    let (_client, _) = server.connect("notifications", 7).await;
    assert_eq!(gateway.connection_count(), 1);

    wait_for_zero(|| gateway.connection_count()).await;
    assert_eq!(
        gateway.registry().subscriber_count(Address::User(UserId(7))),
        0
    );
    assert_eq!(gateway.registry().address_count(), 0);
}

#[tokio::test]
async fn responsive_client_survives_heartbeats() {
    let server = TestServer::start_with(fast_heartbeat()).await;
    let gateway = server.state.feed.gateway().clone();
    let (mut client, _) = server.connect("feed", 7).await;

    // Polling the stream answers pings
    let deadline = tokio::time::Instant::now() + Duration::from_millis(600);
    while let Ok(frame) = tokio::time::timeout_at(deadline, client.next()).await {
        match frame {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
    assert_eq!(gateway.connection_count(), 1);
}

#[tokio::test]
async fn shutdown_closes_sockets_with_going_away() {
    let server = TestServer::start().await;
    let (mut feed, _) = server.connect("feed", 1).await;
    let (mut notifications, _) = server.connect("notifications", 1).await;

    server.state.shutdown.cancel();

    assert_eq!(close_code(&mut feed).await, 1001);
    assert_eq!(close_code(&mut notifications).await, 1001);
    let state = server.state.clone();
    wait_for_zero(|| state.feed.gateway().connection_count()).await;
    wait_for_zero(|| state.notifications.gateway().connection_count()).await;
}

#[tokio::test]
async fn client_ping_gets_a_single_pong() {
    let server = TestServer::start().await;
    let (mut client, _) = server.connect("feed", 1).await;

    client
        .send(Message::Ping(vec![9, 9].into()))
        .await
        .unwrap();

    let mut pongs = 0;
    let deadline = tokio::time::Instant::now() + SILENCE_WINDOW;
    while let Ok(frame) = tokio::time::timeout_at(deadline, client.next()).await {
        match frame {
            Some(Ok(Message::Pong(payload))) => {
                assert_eq!(payload.as_ref(), &[9, 9]);
                pongs += 1;
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
    assert_eq!(pongs, 1);
}

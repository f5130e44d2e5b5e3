// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The `/feed` channel: per-community post events.

use std::sync::Arc;

use super::gateway::{Gateway, RetryPolicy};
use super::resolver::MembershipResolver;
use super::{Address, Event};
use crate::auth::TokenVerifier;
use crate::models::{CommunityId, PostDelta, PostId, PostRemoved, PostView};

/// Feed gateway and its publish surface.
///
/// Callers publish only after the corresponding write has committed.
#[derive(Debug, Clone)]
pub struct FeedGateway {
    gateway: Gateway,
}

impl FeedGateway {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        resolver: Arc<dyn MembershipResolver>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway: Gateway::feed(verifier, resolver, retry),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Broadcast a newly created post to its community.
    pub fn publish_new_item_to_group(&self, community_id: CommunityId, post: PostView) -> usize {
        self.publish(community_id, Event::NewPost(post))
    }

    /// Broadcast changed counters of a post.
    pub fn publish_item_update(&self, community_id: CommunityId, delta: PostDelta) -> usize {
        self.publish(community_id, Event::PostUpdated(delta))
    }

    /// Broadcast that a post was removed.
    pub fn publish_item_deletion(&self, community_id: CommunityId, post_id: PostId) -> usize {
        self.publish(community_id, Event::PostDeleted(PostRemoved { post_id }))
    }

    fn publish(&self, community_id: CommunityId, event: Event) -> usize {
        self.gateway
            .registry()
            .publish(Address::Group(community_id), &event)
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use chrono::Utc;
    use tokio::sync::mpsc;

    use super::*;
    use crate::models::{CommunitySummary, UserId, UserProfile};
    use crate::realtime::resolver::test_support::StaticResolver;

    fn view(id: u64, community: u64) -> PostView {
        PostView {
            id: PostId(id),
            content: "hello".into(),
            media_url: None,
            user: UserProfile::anonymous(UserId(1)),
            community: CommunitySummary {
                id: CommunityId(community),
                name: format!("community {community}"),
            },
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
        }
    }

    fn decode(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    fn setup() -> (FeedGateway, Arc<TokenVerifier>) {
        let verifier = Arc::new(TokenVerifier::new("feed-test-secret"));
        let resolver = Arc::new(StaticResolver::with(&[(42, &[3, 5]), (99, &[7])]));
        let feed = FeedGateway::new(verifier.clone(), resolver, RetryPolicy::default());
        (feed, verifier)
    }

    #[tokio::test]
    async fn new_post_reaches_only_its_community() {
        let (feed, verifier) = setup();
        let (c1_tx, mut c1_rx) = mpsc::unbounded_channel();
        let (c2_tx, mut c2_rx) = mpsc::unbounded_channel();
        let c1_token = verifier.issue(UserId(42)).unwrap();
        let c2_token = verifier.issue(UserId(99)).unwrap();
        let _c1 = feed.gateway().connect(Some(&c1_token), c1_tx).await.unwrap();
        let _c2 = feed.gateway().connect(Some(&c2_token), c2_tx).await.unwrap();

        let delivered = feed.publish_new_item_to_group(CommunityId(3), view(11, 3));
        assert_eq!(delivered, 1);

        let frame = decode(c1_rx.try_recv().unwrap());
        assert_eq!(frame["event"], "new_post");
        assert_eq!(frame["data"]["id"], 11);
        assert_eq!(frame["data"]["community"]["id"], 3);
        assert!(c1_rx.try_recv().is_err());
        assert!(c2_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn updates_and_deletions_use_their_event_kinds() {
        let (feed, verifier) = setup();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = verifier.issue(UserId(99)).unwrap();
        let _session = feed.gateway().connect(Some(&token), tx).await.unwrap();

        feed.publish_item_update(CommunityId(7), PostDelta::comments(PostId(2), 4));
        feed.publish_item_deletion(CommunityId(7), PostId(2));

        let update = decode(rx.try_recv().unwrap());
        assert_eq!(update["event"], "post_updated");
        assert_eq!(update["data"], serde_json::json!({ "postId": 2, "commentCount": 4 }));

        let deletion = decode(rx.try_recv().unwrap());
        assert_eq!(deletion["event"], "post_deleted");
        assert_eq!(deletion["data"]["postId"], 2);
    }

    #[test]
    fn publish_to_empty_community_is_noop() {
        let (feed, _) = setup();
        assert_eq!(feed.publish_item_deletion(CommunityId(100), PostId(1)), 0);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Membership lookup used by the feed handshake.

use std::collections::BTreeSet;

use crate::models::{CommunityId, UserId};
use crate::storage::FeedDatabase;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("membership store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves the communities a user belongs to.
///
/// The result is a point-in-time snapshot. An empty set means the user has no
/// memberships and is not an error. Implementations may block; the gateway
/// calls them on the blocking pool.
pub trait MembershipResolver: Send + Sync + 'static {
    fn resolve_groups(&self, user: UserId) -> Result<BTreeSet<CommunityId>, ResolverError>;
}

impl MembershipResolver for FeedDatabase {
    fn resolve_groups(&self, user: UserId) -> Result<BTreeSet<CommunityId>, ResolverError> {
        self.community_ids_of(user)
            .map_err(|e| ResolverError::Unavailable(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateCommunityRequest;
    use crate::storage::database::test_support::temp_db;

    #[test]
    fn database_resolves_memberships() {
        let (db, _dir) = temp_db();
        let community = db
            .create_community(
                UserId(42),
                &CreateCommunityRequest {
                    name: "rust".into(),
                    description: None,
                },
            )
            .unwrap();

        assert_eq!(
            db.resolve_groups(UserId(42)).unwrap(),
            BTreeSet::from([community.id])
        );
        assert!(db.resolve_groups(UserId(99)).unwrap().is_empty());
    }
}

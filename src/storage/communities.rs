// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Communities and memberships.
//!
//! Memberships are indexed both ways: `memberships` answers "which
//! communities is this user in" (the real-time membership snapshot) and
//! `community_members` answers "who should be notified about this community".

use std::collections::BTreeSet;

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};

use super::database::{
    from_json, millis_to_datetime, next_id, prefix_range, to_json, DbError, DbResult,
    FeedDatabase, COMMUNITIES, COMMUNITY_MEMBERS, MEMBERSHIPS,
};
use crate::models::{Community, CommunityId, CreateCommunityRequest, Membership, UserId};

impl FeedDatabase {
    /// Create a community. The creator becomes its first member.
    pub fn create_community(
        &self,
        creator: UserId,
        request: &CreateCommunityRequest,
    ) -> DbResult<Community> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        let id = next_id(&write_txn, "communities")?;
        let community = Community {
            id: CommunityId(id),
            name: request.name.trim().to_string(),
            description: request
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            created_by: creator,
            created_at: now,
        };
        {
            let mut communities = write_txn.open_table(COMMUNITIES)?;
            communities.insert(id, to_json(&community)?.as_slice())?;

            let mut memberships = write_txn.open_table(MEMBERSHIPS)?;
            memberships.insert((creator.0, id), now.timestamp_millis())?;

            let mut members = write_txn.open_table(COMMUNITY_MEMBERS)?;
            members.insert((id, creator.0), now.timestamp_millis())?;
        }
        write_txn.commit()?;
        Ok(community)
    }

    /// Look up a community by id.
    pub fn community(&self, community_id: CommunityId) -> DbResult<Option<Community>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMMUNITIES)?;
        match table.get(community_id.0)? {
            Some(value) => Ok(Some(from_json(value.value())?)),
            None => Ok(None),
        }
    }

    /// Add a user to a community.
    ///
    /// Fails with `NotFound` for an unknown community and `Conflict` when the
    /// user is already a member.
    pub fn join_community(&self, user: UserId, community_id: CommunityId) -> DbResult<Membership> {
        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        {
            let communities = write_txn.open_table(COMMUNITIES)?;
            if communities.get(community_id.0)?.is_none() {
                return Err(DbError::NotFound(format!("Community {community_id} not found")));
            }

            let mut memberships = write_txn.open_table(MEMBERSHIPS)?;
            if memberships.get((user.0, community_id.0))?.is_some() {
                return Err(DbError::Conflict(
                    "Already a member of this community".to_string(),
                ));
            }
            memberships.insert((user.0, community_id.0), now.timestamp_millis())?;

            let mut members = write_txn.open_table(COMMUNITY_MEMBERS)?;
            members.insert((community_id.0, user.0), now.timestamp_millis())?;
        }
        write_txn.commit()?;

        Ok(Membership {
            user_id: user,
            community_id,
            joined_at: now,
        })
    }

    /// Remove a user from a community.
    pub fn leave_community(&self, user: UserId, community_id: CommunityId) -> DbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut memberships = write_txn.open_table(MEMBERSHIPS)?;
            if memberships.remove((user.0, community_id.0))?.is_none() {
                return Err(DbError::NotFound(
                    "You are not a member of this community".to_string(),
                ));
            }

            let mut members = write_txn.open_table(COMMUNITY_MEMBERS)?;
            members.remove((community_id.0, user.0))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Whether `user` is currently a member of `community_id`.
    pub fn is_member(&self, user: UserId, community_id: CommunityId) -> DbResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMBERSHIPS)?;
        Ok(table.get((user.0, community_id.0))?.is_some())
    }

    /// Ids of every community `user` belongs to.
    pub fn community_ids_of(&self, user: UserId) -> DbResult<BTreeSet<CommunityId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMBERSHIPS)?;

        let mut ids = BTreeSet::new();
        for entry in table.range(prefix_range(user.0))? {
            let (key, _) = entry?;
            ids.insert(CommunityId(key.value().1));
        }
        Ok(ids)
    }

    /// Memberships of `user`, with the community details.
    pub fn memberships_of(&self, user: UserId) -> DbResult<Vec<(Community, Membership)>> {
        let read_txn = self.db.begin_read()?;
        let memberships = read_txn.open_table(MEMBERSHIPS)?;
        let communities = read_txn.open_table(COMMUNITIES)?;

        let mut result = Vec::new();
        for entry in memberships.range(prefix_range(user.0))? {
            let (key, joined_at) = entry?;
            let community_id = key.value().1;
            // Dangling membership rows are skipped rather than failing the listing
            let Some(value) = communities.get(community_id)? else {
                continue;
            };
            let community: Community = from_json(value.value())?;
            result.push((
                community,
                Membership {
                    user_id: user,
                    community_id: CommunityId(community_id),
                    joined_at: millis_to_datetime(joined_at.value()),
                },
            ));
        }
        Ok(result)
    }

    /// Every member of a community.
    pub fn members_of(&self, community_id: CommunityId) -> DbResult<Vec<UserId>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMMUNITY_MEMBERS)?;

        let mut members = Vec::new();
        for entry in table.range(prefix_range(community_id.0))? {
            let (key, _) = entry?;
            members.push(UserId(key.value().1));
        }
        Ok(members)
    }
}

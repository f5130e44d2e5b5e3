// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Delivery addresses.

use std::fmt;
use std::str::FromStr;

use crate::models::{CommunityId, UserId};

/// Target of a publish: one user or every member of a community.
///
/// Encodes as `user:<id>` or `group:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    User(UserId),
    Group(CommunityId),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::User(id) => write!(f, "user:{id}"),
            Address::Group(id) => write!(f, "group:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {0}")]
pub struct ParseAddressError(String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseAddressError(s.to_string());
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let id: u64 = id.parse().map_err(|_| invalid())?;
        match kind {
            "user" => Ok(Address::User(UserId(id))),
            "group" => Ok(Address::Group(CommunityId(id))),
            _ => Err(invalid()),
        }
    }
}

impl From<UserId> for Address {
    fn from(id: UserId) -> Self {
        Address::User(id)
    }
}

impl From<CommunityId> for Address {
    fn from(id: CommunityId) -> Self {
        Address::Group(id)
    }
}

//! Clan membership lookup used by trust resolution

use crate::model::{TrustLevel, UserId};
use crate::util::{read_lock, write_lock};
use std::collections::HashMap;
use std::sync::RwLock;

/// A user's clan and the trust their clan rank carries inside claims owned
/// by fellow clan members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClanMembership {
    pub clan: String,
    /// `None` means the rank is explicitly denied
    pub rank_trust: Option<TrustLevel>,
}

pub trait ClanProvider: Send + Sync {
    fn membership(&self, user: UserId) -> Option<ClanMembership>;
}

/// No clans at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClans;

impl ClanProvider for NoClans {
    fn membership(&self, _user: UserId) -> Option<ClanMembership> {
        None
    }
}

/// Table-backed clan directory
#[derive(Debug, Default)]
pub struct StaticClans {
    members: RwLock<HashMap<UserId, ClanMembership>>,
}

impl StaticClans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, user: UserId, clan: impl Into<String>, rank_trust: Option<TrustLevel>) {
        write_lock(&self.members, "clan members").insert(
            user,
            ClanMembership {
                clan: clan.into(),
                rank_trust,
            },
        );
    }

    pub fn leave(&self, user: UserId) {
        write_lock(&self.members, "clan members").remove(&user);
    }
}

impl ClanProvider for StaticClans {
    fn membership(&self, user: UserId) -> Option<ClanMembership> {
        read_lock(&self.members, "clan members").get(&user).cloned()
    }
}

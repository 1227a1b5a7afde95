//! Trust levels, subjects and per-claim trust tables
//!
//! Trust levels form a capability lattice rather than a plain integer rank:
//!
//! ```text
//!            MANAGER
//!               |
//!            BUILDER
//!            /     \
//!      ACCESSOR   CONTAINER
//!            \     /
//!             NONE
//! ```
//!
//! BUILDER carries both the ACCESSOR and CONTAINER capabilities, MANAGER
//! carries everything BUILDER does plus delegated management. ACCESSOR and
//! CONTAINER are peers; neither satisfies the other.

use crate::error::ValidationError;
use crate::model::ids::UserId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const CAP_ACCESS: u8 = 0b0001;
const CAP_CONTAINER: u8 = 0b0010;
const CAP_BUILD: u8 = 0b0100;
const CAP_MANAGE: u8 = 0b1000;

/// Delegated trust level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    #[default]
    None,
    Accessor,
    Container,
    Builder,
    Manager,
}

impl TrustLevel {
    const fn capabilities(&self) -> u8 {
        match self {
            TrustLevel::None => 0,
            TrustLevel::Accessor => CAP_ACCESS,
            TrustLevel::Container => CAP_CONTAINER,
            TrustLevel::Builder => CAP_ACCESS | CAP_CONTAINER | CAP_BUILD,
            TrustLevel::Manager => CAP_ACCESS | CAP_CONTAINER | CAP_BUILD | CAP_MANAGE,
        }
    }

    /// Check whether holding `self` satisfies a `required` check
    pub const fn satisfies(&self, required: TrustLevel) -> bool {
        let needed = required.capabilities();
        self.capabilities() & needed == needed
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::None => "none",
            TrustLevel::Accessor => "accessor",
            TrustLevel::Container => "container",
            TrustLevel::Builder => "builder",
            TrustLevel::Manager => "manager",
        }
    }

    pub fn all() -> &'static [TrustLevel] {
        &[
            TrustLevel::None,
            TrustLevel::Accessor,
            TrustLevel::Container,
            TrustLevel::Builder,
            TrustLevel::Manager,
        ]
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrustLevel::all()
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownTrustLevel(s.to_string()))
    }
}

/// Kind of subject a trust entry is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    User,
    Group,
    Clan,
}

/// A single (kind, id, level) trust tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEntry {
    pub kind: SubjectKind,
    pub subject: String,
    pub level: TrustLevel,
}

/// Per-claim trust assignments. At most one level per (kind, subject).
///
/// Public trust is stored as a user entry for [`UserId::PUBLIC`]. For clans a
/// stored [`TrustLevel::None`] is an explicit deny; for users and groups
/// `None` entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustTable {
    #[serde(default)]
    users: BTreeMap<UserId, TrustLevel>,
    #[serde(default)]
    groups: BTreeMap<String, TrustLevel>,
    #[serde(default)]
    clans: BTreeMap<String, TrustLevel>,
}

impl TrustTable {
    pub fn user(&self, user: &UserId) -> Option<TrustLevel> {
        self.users.get(user).copied()
    }

    pub fn public(&self) -> Option<TrustLevel> {
        self.user(&UserId::PUBLIC)
    }

    pub fn group(&self, group: &str) -> Option<TrustLevel> {
        self.groups.get(group).copied()
    }

    pub fn clan(&self, clan: &str) -> Option<TrustLevel> {
        self.clans.get(clan).copied()
    }

    pub fn users(&self) -> impl Iterator<Item = (&UserId, &TrustLevel)> {
        self.users.iter()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &TrustLevel)> {
        self.groups.iter()
    }

    pub fn clans(&self) -> impl Iterator<Item = (&String, &TrustLevel)> {
        self.clans.iter()
    }

    /// Level currently stored for a subject, if any
    pub fn get(&self, kind: SubjectKind, subject: &str) -> Option<TrustLevel> {
        match kind {
            SubjectKind::User => subject.parse().ok().and_then(|id: UserId| self.user(&id)),
            SubjectKind::Group => self.group(subject),
            SubjectKind::Clan => self.clan(subject),
        }
    }

    /// Insert or replace. Returns true if the table changed.
    pub fn set_user(&mut self, user: UserId, level: TrustLevel) -> bool {
        if level == TrustLevel::None {
            return self.users.remove(&user).is_some();
        }
        self.users.insert(user, level) != Some(level)
    }

    pub fn set_group(&mut self, group: &str, level: TrustLevel) -> bool {
        if level == TrustLevel::None {
            return self.groups.remove(group).is_some();
        }
        self.groups.insert(group.to_string(), level) != Some(level)
    }

    pub fn set_clan(&mut self, clan: &str, level: TrustLevel) -> bool {
        self.clans.insert(clan.to_string(), level) != Some(level)
    }

    pub fn remove_user(&mut self, user: &UserId) -> bool {
        self.users.remove(user).is_some()
    }

    pub fn remove_group(&mut self, group: &str) -> bool {
        self.groups.remove(group).is_some()
    }

    pub fn remove_clan(&mut self, clan: &str) -> bool {
        self.clans.remove(clan).is_some()
    }

    /// Drop every entry of every kind
    pub fn clear(&mut self) -> bool {
        let changed = !self.is_empty();
        self.users.clear();
        self.groups.clear();
        self.clans.clear();
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty() && self.clans.is_empty()
    }

    /// All entries as flat tuples
    pub fn entries(&self) -> Vec<TrustEntry> {
        let users = self.users.iter().map(|(id, level)| TrustEntry {
            kind: SubjectKind::User,
            subject: id.to_string(),
            level: *level,
        });
        let groups = self.groups.iter().map(|(id, level)| TrustEntry {
            kind: SubjectKind::Group,
            subject: id.clone(),
            level: *level,
        });
        let clans = self.clans.iter().map(|(id, level)| TrustEntry {
            kind: SubjectKind::Clan,
            subject: id.clone(),
            level: *level,
        });
        users.chain(groups).chain(clans).collect()
    }
}

/// The acting subject of a query: a user plus its permission-group memberships
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub user: UserId,
    pub groups: Vec<String>,
}

impl Subject {
    pub fn user(user: UserId) -> Self {
        Self {
            user,
            groups: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}

//! Trust resolution
//!
//! Decides whether a subject holds at least a required trust level in a
//! claim. First match wins:
//! 1. Owner of the claim or of an ancestor (OWNER), MANAGER on an ancestor
//! 2. Persistent `trust.<level>` permission for the subject in the claim
//! 3. Expiration: an expired claim denies everything below this point
//! 4. Public entry
//! 5. Direct user entry
//! 6. Group entries
//! 7. Clan entry, then clan rank when the owner shares the clan
//! 8. Parent claim when the claim inherits
//! 9. NOT_TRUSTED
//!
//! Levels compare as capability sets: BUILDER satisfies ACCESSOR and
//! CONTAINER, nothing but MANAGER satisfies MANAGER.

use crate::claims::WorldSnapshot;
use crate::config::ExpirationConfig;
use crate::model::{
    Claim, ClaimId, FlagResolvable, Subject, TrustLevel, TrustResult, TrustResultType, Trustable,
};
use crate::permission::store::{PermissionKey, PermissionStore, PermissionSubject};
use crate::providers::ClanProvider;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{error, trace};

/// Resolves trust against one world snapshot
pub struct TrustResolver<'a> {
    snapshot: &'a WorldSnapshot,
    clans: &'a dyn ClanProvider,
    expiration: &'a ExpirationConfig,
    permissions: Option<&'a PermissionStore>,
    now: DateTime<Utc>,
}

impl<'a> TrustResolver<'a> {
    pub fn new(
        snapshot: &'a WorldSnapshot,
        clans: &'a dyn ClanProvider,
        expiration: &'a ExpirationConfig,
    ) -> Self {
        Self {
            snapshot,
            clans,
            expiration,
            permissions: None,
            now: Utc::now(),
        }
    }

    /// Consult persistent per-subject trust permissions
    pub fn with_permissions(mut self, permissions: &'a PermissionStore) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Evaluate expiration as of `now`
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Whether the claim governing `claim`'s expiration has lapsed
    pub fn is_expired(&self, claim: &Claim) -> bool {
        let Some(root) = self.snapshot.expiration_root(claim.id()) else {
            return false;
        };
        if root.is_admin() || root.is_wilderness() || !root.expiration_enabled() {
            return false;
        }
        self.expiration
            .days_for(root.claim_type())
            .is_some_and(|days| root.expires_at(days) < self.now)
    }

    pub fn check(&self, claim_id: ClaimId, subject: &Subject, required: TrustLevel) -> TrustResult {
        let Some(claim) = self.snapshot.get(claim_id) else {
            return TrustResult::not_trusted(subject.user, required)
                .with_message(format!("claim {} not found", claim_id));
        };
        let mut visited = HashSet::new();
        let result = self.check_claim(claim, subject, required, &mut visited);
        trace!(
            claim = %claim_id,
            user = %subject.user,
            required = %required,
            result = %result.result_type(),
            "Trust resolved"
        );
        result
    }

    fn check_claim(
        &self,
        claim: &Claim,
        subject: &Subject,
        required: TrustLevel,
        visited: &mut HashSet<ClaimId>,
    ) -> TrustResult {
        let user = subject.user;
        let grant = |result_type| TrustResult::new(result_type, user, required).from_claim(claim.id());

        if !visited.insert(claim.id()) {
            error!(claim = %claim.id(), "Trust inheritance revisited a claim; parent chain is corrupt");
            return TrustResult::not_trusted(user, required).with_message("corrupt parent chain");
        }
        if claim.is_wilderness() {
            return TrustResult::not_trusted(user, required).from_claim(claim.id());
        }

        if claim.trust_owner() == Some(user) {
            return grant(TrustResultType::Owner);
        }
        let ancestors = match self.snapshot.get_parents(claim.id(), true) {
            Ok(ancestors) => ancestors,
            Err(e) => {
                error!(claim = %claim.id(), error = %e, "Cannot walk parent chain");
                return TrustResult::not_trusted(user, required).with_message(e.to_string());
            }
        };
        for ancestor in &ancestors {
            if ancestor.trust_owner() == Some(user) {
                return grant(TrustResultType::Owner).from_claim(ancestor.id());
            }
            if ancestor.trust_table().user(&user) == Some(TrustLevel::Manager) {
                return grant(TrustResultType::Manager).from_claim(ancestor.id());
            }
        }

        if let Some(store) = self.permissions {
            let tier = claim.claim_context();
            let subjects = std::iter::once(PermissionSubject::User(user))
                .chain(subject.groups.iter().cloned().map(PermissionSubject::Group));
            for permission_subject in subjects {
                let value = store
                    .lookup(&permission_subject, PermissionKey::Trust(required), &Default::default(), &tier)
                    .and_then(|v| v.as_tristate().as_bool());
                match value {
                    Some(true) => return grant(TrustResultType::PermissionGrant),
                    Some(false) => return grant(TrustResultType::PermissionDeny),
                    None => {}
                }
            }
        }

        if self.is_expired(claim) {
            return grant(TrustResultType::ClaimExpired).with_message("claim has expired");
        }

        let table = claim.trust_table();
        if table.public().is_some_and(|level| level.satisfies(required)) {
            return grant(TrustResultType::Public);
        }
        if let Some(level) = table.user(&user)
            && level.satisfies(required)
        {
            return grant(TrustResultType::for_level(level));
        }
        let group_trusted = subject
            .groups
            .iter()
            .filter_map(|group| table.group(group))
            .any(|level| level.satisfies(required));
        if group_trusted {
            return grant(TrustResultType::Trusted);
        }

        if let Some(membership) = self.clans.membership(user) {
            match table.clan(&membership.clan) {
                Some(TrustLevel::None) => return grant(TrustResultType::ClanDeny),
                Some(level) if level.satisfies(required) => {
                    return grant(TrustResultType::ClanGrant);
                }
                _ => {}
            }
            let owner_clan = claim
                .trust_owner()
                .and_then(|owner| self.clans.membership(owner))
                .map(|m| m.clan);
            if owner_clan.as_deref() == Some(membership.clan.as_str()) {
                match membership.rank_trust {
                    None => return grant(TrustResultType::ClanMemberDeny),
                    Some(level) if level.satisfies(required) => {
                        return grant(TrustResultType::ClanMemberGrant);
                    }
                    Some(_) => {}
                }
            }
        }

        if claim.inherits_trust()
            && let Some(parent) = ancestors.first()
        {
            return self.check_claim(parent, subject, required, visited);
        }

        TrustResult::not_trusted(user, required).from_claim(claim.id())
    }
}

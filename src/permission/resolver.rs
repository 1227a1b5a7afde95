//! Context resolution engine
//!
//! Computes the authoritative value of a flag or option with the following
//! precedence (highest to lowest, first defined value wins):
//! 1. Override contexts of the claim: claim id, claim type, global
//! 2. Subject entries at the claim context, then the inherited parent claim
//! 3. Subject entries at the claim-type default context
//! 4. Subject entries at the global default context
//! 5. Default-subject entries at claim, parent claim, type and global contexts
//! 6. The flag definition's per-type default (flags) or the option default
//!
//! Within a tier the user's own entries beat group entries and the most
//! specific matching entry wins. Trust is not consulted here.

use crate::model::{
    Claim, Context, ContextSet, FlagResolvable, ResolutionSource, Subject, Tristate, GLOBAL,
};
use crate::permission::flags::{Flag, FlagRegistry};
use crate::permission::options::{ClaimOption, OptionRegistry, OptionValue};
use crate::permission::store::{PermissionKey, PermissionStore, PermissionSubject, StoredValue};
use std::sync::Arc;
use tracing::trace;

/// Everything the engine needs to answer one query
#[derive(Debug, Clone)]
pub struct FlagQuery<'a> {
    pub claim: &'a Claim,
    /// Parent consulted when the claim inherits; `None` otherwise
    pub parent: Option<&'a Claim>,
    pub subject: Option<&'a Subject>,
    /// Non-tier query contexts, including source/target discriminators
    pub contexts: ContextSet,
}

impl<'a> FlagQuery<'a> {
    pub fn new(claim: &'a Claim) -> Self {
        Self {
            claim,
            parent: None,
            subject: None,
            contexts: ContextSet::new(),
        }
    }

    pub fn parent(mut self, parent: Option<&'a Claim>) -> Self {
        self.parent = parent.filter(|_| self.claim.inherits_parent());
        self
    }

    pub fn subject(mut self, subject: &'a Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Add caller contexts. Tier contexts are stripped; the engine adds its own.
    pub fn contexts(mut self, contexts: &ContextSet) -> Self {
        self.contexts.extend(contexts.without_tiers().iter().cloned());
        self
    }

    pub fn source(mut self, source: Option<&str>) -> Self {
        if let Some(source) = source {
            self.contexts.insert(Context::new(Context::SOURCE, source));
        }
        self
    }

    pub fn target(mut self, target: Option<&str>) -> Self {
        if let Some(target) = target {
            self.contexts.insert(Context::new(Context::TARGET, target));
        }
        self
    }

    fn subjects(&self) -> Vec<PermissionSubject> {
        let Some(subject) = self.subject else {
            return Vec::new();
        };
        std::iter::once(PermissionSubject::User(subject.user))
            .chain(subject.groups.iter().cloned().map(PermissionSubject::Group))
            .collect()
    }
}

/// Resolves flags and options against the permission store
pub struct ContextResolver {
    store: Arc<PermissionStore>,
    flags: Arc<FlagRegistry>,
    options: Arc<OptionRegistry>,
}

impl ContextResolver {
    pub fn new(
        store: Arc<PermissionStore>,
        flags: Arc<FlagRegistry>,
        options: Arc<OptionRegistry>,
    ) -> Self {
        Self {
            store,
            flags,
            options,
        }
    }

    pub fn store(&self) -> &Arc<PermissionStore> {
        &self.store
    }

    pub fn flags(&self) -> &Arc<FlagRegistry> {
        &self.flags
    }

    pub fn options(&self) -> &Arc<OptionRegistry> {
        &self.options
    }

    /// Tier 1 only
    pub fn override_value(&self, query: &FlagQuery<'_>, key: PermissionKey) -> Option<StoredValue> {
        query.claim.override_contexts().iter().find_map(|tier| {
            self.store
                .lookup(&PermissionSubject::Default, key, &query.contexts, tier)
        })
    }

    /// Tiers 2 through 5
    pub fn stored_value(
        &self,
        query: &FlagQuery<'_>,
        key: PermissionKey,
    ) -> Option<(StoredValue, ResolutionSource)> {
        let claim_tier = query.claim.claim_context();
        let parent_tier = query.parent.map(FlagResolvable::claim_context);
        let type_tier = query.claim.default_context();
        let global_tier = Context::new(Context::CLAIM_DEFAULT, GLOBAL);

        let subjects = query.subjects();
        let first = |tier: &Context| {
            subjects
                .iter()
                .find_map(|subject| self.store.lookup(subject, key, &query.contexts, tier))
        };

        if let Some(value) = first(&claim_tier) {
            return Some((value, ResolutionSource::SubjectClaim));
        }
        if let Some(parent_tier) = &parent_tier
            && let Some(value) = first(parent_tier)
        {
            return Some((value, ResolutionSource::InheritedClaim));
        }

        let subject_tiers = [
            (&type_tier, ResolutionSource::SubjectDefault),
            (&global_tier, ResolutionSource::SubjectGlobal),
        ];
        for (tier, source) in subject_tiers {
            if let Some(value) = first(tier) {
                return Some((value, source));
            }
        }

        let default = PermissionSubject::Default;
        let lookup = |tier: &Context| self.store.lookup(&default, key, &query.contexts, tier);
        if let Some(value) = lookup(&claim_tier) {
            return Some((value, ResolutionSource::DefaultClaim));
        }
        if let Some(value) = parent_tier.as_ref().and_then(|tier| lookup(tier)) {
            return Some((value, ResolutionSource::DefaultClaim));
        }
        if let Some(value) = lookup(&type_tier) {
            return Some((value, ResolutionSource::DefaultType));
        }
        lookup(&global_tier).map(|value| (value, ResolutionSource::DefaultGlobal))
    }

    /// Tiers 2 through 6 for a flag. UNDEFINED when nothing applies.
    pub fn subject_flag_value(&self, query: &FlagQuery<'_>, flag: Flag) -> (Tristate, ResolutionSource) {
        let key = PermissionKey::Flag(flag);
        if let Some((value, source)) = self.stored_value(query, key) {
            let value = value.as_tristate();
            if value.is_defined() {
                return (value, source);
            }
        }
        let definition = self.flags.definition(flag);
        (
            definition.default_claim_type_value(query.claim.claim_type()),
            ResolutionSource::FlagDefault,
        )
    }

    /// Full ladder for a flag, overrides included
    pub fn flag_value(&self, query: &FlagQuery<'_>, flag: Flag) -> (Tristate, ResolutionSource) {
        if let Some(value) = self
            .override_value(query, PermissionKey::Flag(flag))
            .map(|v| v.as_tristate())
            .filter(Tristate::is_defined)
        {
            trace!(flag = %flag, claim = %query.claim.id(), value = %value, "Override tier matched");
            return (value, ResolutionSource::Override);
        }
        let (value, source) = self.subject_flag_value(query, flag);
        trace!(flag = %flag, claim = %query.claim.id(), value = %value, source = ?source, "Flag resolved");
        (value, source)
    }

    /// Full ladder for an option. Overrides take precedence but never invert.
    pub fn option_value(&self, query: &FlagQuery<'_>, option: ClaimOption) -> (OptionValue, ResolutionSource) {
        let key = PermissionKey::Option(option);
        let stored = self
            .override_value(query, key)
            .map(|value| (value, ResolutionSource::Override))
            .or_else(|| self.stored_value(query, key));
        if let Some((value, source)) = stored
            && let Some(value) = value.as_option()
        {
            trace!(option = %option, claim = %query.claim.id(), value = %value, source = ?source, "Option resolved");
            return (value.clone(), source);
        }
        (
            self.options.definition(option).default.clone(),
            ResolutionSource::FlagDefault,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClaimType, UserId, WorldId};
    use crate::permission::store::{MemoryPermissionBackend, PermissionChange};

    fn resolver() -> ContextResolver {
        let store = Arc::new(PermissionStore::new(Arc::new(MemoryPermissionBackend::new())));
        ContextResolver::new(
            store,
            Arc::new(FlagRegistry::new()),
            Arc::new(OptionRegistry::new()),
        )
    }

    fn basic_claim() -> Claim {
        let mut claim = Claim::wilderness(WorldId::new());
        claim.claim_type = ClaimType::Basic;
        claim
    }

    async fn put(
        resolver: &ContextResolver,
        subject: PermissionSubject,
        tier: Context,
        value: Tristate,
    ) {
        let change = PermissionChange {
            subject,
            key: PermissionKey::Flag(Flag::BlockBreak),
            contexts: ContextSet::new().with(tier.key, tier.value),
            value: Some(StoredValue::State(value)),
        };
        assert!(resolver.store().submit(change).await.successful());
    }

    #[tokio::test]
    async fn test_falls_back_to_type_default() {
        let resolver = resolver();
        let claim = basic_claim();
        let (value, source) = resolver.flag_value(&FlagQuery::new(&claim), Flag::BlockBreak);
        assert_eq!(value, Tristate::False);
        assert_eq!(source, ResolutionSource::FlagDefault);
    }

    #[tokio::test]
    async fn test_user_entry_beats_default_subject() {
        let resolver = resolver();
        let claim = basic_claim();
        let subject = Subject::user(UserId::new());
        put(&resolver, PermissionSubject::Default, claim.claim_context(), Tristate::False).await;
        put(
            &resolver,
            PermissionSubject::User(subject.user),
            Context::new(Context::CLAIM_DEFAULT, GLOBAL),
            Tristate::True,
        )
        .await;

        let query = FlagQuery::new(&claim).subject(&subject);
        let (value, source) = resolver.flag_value(&query, Flag::BlockBreak);
        assert_eq!(value, Tristate::True);
        assert_eq!(source, ResolutionSource::SubjectGlobal);
    }

    #[tokio::test]
    async fn test_override_beats_everything() {
        let resolver = resolver();
        let claim = basic_claim();
        let subject = Subject::user(UserId::new());
        put(
            &resolver,
            PermissionSubject::User(subject.user),
            claim.claim_context(),
            Tristate::True,
        )
        .await;
        put(
            &resolver,
            PermissionSubject::Default,
            Context::new(Context::CLAIM_OVERRIDE, GLOBAL),
            Tristate::False,
        )
        .await;

        let query = FlagQuery::new(&claim).subject(&subject);
        assert_eq!(
            resolver.flag_value(&query, Flag::BlockBreak),
            (Tristate::False, ResolutionSource::Override)
        );
    }

    #[tokio::test]
    async fn test_override_toggle_skips_global_override() {
        let resolver = resolver();
        let mut claim = basic_claim();
        claim.flag_overrides = false;
        put(
            &resolver,
            PermissionSubject::Default,
            Context::new(Context::CLAIM_OVERRIDE, GLOBAL),
            Tristate::True,
        )
        .await;
        let (value, _) = resolver.flag_value(&FlagQuery::new(&claim), Flag::BlockBreak);
        assert_eq!(value, Tristate::False);
    }

    #[tokio::test]
    async fn test_group_entry_applies() {
        let resolver = resolver();
        let claim = basic_claim();
        let subject = Subject::user(UserId::new()).with_groups(["builders"]);
        put(
            &resolver,
            PermissionSubject::Group("builders".into()),
            claim.claim_context(),
            Tristate::True,
        )
        .await;
        let query = FlagQuery::new(&claim).subject(&subject);
        assert_eq!(
            resolver.flag_value(&query, Flag::BlockBreak),
            (Tristate::True, ResolutionSource::SubjectClaim)
        );
    }

    #[tokio::test]
    async fn test_inherited_parent_claim_entry() {
        let resolver = resolver();
        let parent = basic_claim();
        let mut child = basic_claim();
        child.claim_type = ClaimType::Subdivision;
        child.parent = Some(parent.id());
        child.inherit_parent = true;
        let subject = Subject::user(UserId::new());
        put(
            &resolver,
            PermissionSubject::User(subject.user),
            parent.claim_context(),
            Tristate::True,
        )
        .await;

        let query = FlagQuery::new(&child).parent(Some(&parent)).subject(&subject);
        assert_eq!(
            resolver.flag_value(&query, Flag::BlockBreak),
            (Tristate::True, ResolutionSource::InheritedClaim)
        );

        child.inherit_parent = false;
        let query = FlagQuery::new(&child).parent(Some(&parent)).subject(&subject);
        assert_eq!(resolver.flag_value(&query, Flag::BlockBreak).0, Tristate::False);
    }
}

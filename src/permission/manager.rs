//! Permission manager: flag decisions, stored permissions and options
//!
//! A flag decision walks:
//! 1. Override contexts (apply to every subject, owner included)
//! 2. Trust, when the flag names a trust level and the subject holds it
//! 3. Stored entries and the flag's per-type default
//! 4. The flag's fallback polarity
//!
//! Writes are validated synchronously and then handed to the permission
//! store, which persists them on a background task.

use crate::claims::{ClaimRegistry, WorldSnapshot};
use crate::model::{
    BlockPos, Claim, ClaimId, ClaimType, Context, ContextSet, PermissionResult,
    PermissionResultType, ResolutionSource, Subject, Tristate, TrustLevel, TrustResult, WorldId,
    GLOBAL,
};
use crate::permission::flags::{Flag, FlagDefinition, FlagRegistry};
use crate::permission::options::{ClaimOption, OptionRegistry, OptionValue};
use crate::permission::pending::PendingMutation;
use crate::permission::resolver::{ContextResolver, FlagQuery};
use crate::permission::store::{
    PermissionChange, PermissionKey, PermissionStore, PermissionSubject, StoredValue,
};
use crate::providers::{ClaimEvent, ClaimEventKind, HookOutcome};
use crate::trust::TrustResolver;
use crate::util::identifier;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

pub struct PermissionManager {
    registry: Arc<ClaimRegistry>,
    resolver: ContextResolver,
}

impl PermissionManager {
    pub fn new(
        registry: Arc<ClaimRegistry>,
        store: Arc<PermissionStore>,
        flags: Arc<FlagRegistry>,
        options: Arc<OptionRegistry>,
    ) -> Self {
        Self {
            registry,
            resolver: ContextResolver::new(store, flags, options),
        }
    }

    pub fn registry(&self) -> &Arc<ClaimRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<PermissionStore> {
        self.resolver.store()
    }

    pub fn flags(&self) -> &Arc<FlagRegistry> {
        self.resolver.flags()
    }

    pub fn options(&self) -> &Arc<OptionRegistry> {
        self.resolver.options()
    }

    pub fn claim_at(&self, world: WorldId, pos: BlockPos) -> Option<Arc<Claim>> {
        self.registry.claim_at(world, pos)
    }

    fn world_snapshot(&self, world: WorldId) -> Option<Arc<WorldSnapshot>> {
        self.registry
            .claim_manager(world)
            .map(|manager| manager.snapshot())
    }

    fn trust_resolver<'a>(&'a self, snapshot: &'a WorldSnapshot) -> TrustResolver<'a> {
        TrustResolver::new(
            snapshot,
            self.registry.providers().clans.as_ref(),
            &self.registry.settings().expiration,
        )
        .with_permissions(self.store())
    }

    /// Decide `flag` for `subject` at a position
    pub fn check(
        &self,
        world: WorldId,
        pos: BlockPos,
        subject: &Subject,
        flag: Flag,
        source: Option<&str>,
        target: Option<&str>,
    ) -> PermissionResult {
        let Some(claim) = self.claim_at(world, pos) else {
            return PermissionResult::failure(
                PermissionResultType::Failure,
                format!("world {world} is not loaded"),
            );
        };
        self.get_active_flag_permission_value(&claim, subject, flag, source, target, &ContextSet::new())
    }

    /// Decide `flag` for `subject` in `claim`. Never fails for lack of data:
    /// an unresolved flag ends at its fallback polarity.
    pub fn get_active_flag_permission_value(
        &self,
        claim: &Claim,
        subject: &Subject,
        flag: Flag,
        source: Option<&str>,
        target: Option<&str>,
        contexts: &ContextSet,
    ) -> PermissionResult {
        for discriminator in [source, target].into_iter().flatten() {
            if let Err(e) = identifier::validate_discriminator(discriminator) {
                return PermissionResult::failure(PermissionResultType::InvalidContext, e.to_string());
            }
        }
        let Some(snapshot) = self.world_snapshot(claim.world()) else {
            return PermissionResult::failure(
                PermissionResultType::Failure,
                format!("world {} is not loaded", claim.world()),
            );
        };

        let parent = snapshot
            .parent(claim.id())
            .filter(|parent| !parent.is_wilderness());
        let query = FlagQuery::new(claim)
            .parent(parent.map(Arc::as_ref))
            .subject(subject)
            .contexts(contexts)
            .source(source)
            .target(target);

        if let Some(value) = self
            .resolver
            .override_value(&query, PermissionKey::Flag(flag))
            .map(|v| v.as_tristate())
            .filter(Tristate::is_defined)
        {
            trace!(flag = %flag, claim = %claim.id(), value = %value, "Override decided flag");
            return PermissionResult::decision(value, ResolutionSource::Override, subject.user);
        }

        let definition = self.resolver.flags().definition(flag);
        let mut trust_type = None;
        if let Some(required) = definition.required_trust {
            let trust = self.trust_resolver(&snapshot).check(claim.id(), subject, required);
            if trust.is_trusted() {
                trace!(flag = %flag, claim = %claim.id(), trust = %trust.result_type(), "Trust granted flag");
                return PermissionResult::decision(Tristate::True, ResolutionSource::Trust, subject.user)
                    .with_trust(trust.result_type());
            }
            trust_type = Some(trust.result_type());
        }

        let (value, source) = self.resolver.subject_flag_value(&query, flag);
        let result = if value.is_defined() {
            PermissionResult::decision(value, source, subject.user)
        } else {
            PermissionResult::decision(
                Tristate::from_bool(definition.fallback),
                ResolutionSource::Fallback,
                subject.user,
            )
        };
        trace!(
            flag = %flag,
            claim = %claim.id(),
            user = %subject.user,
            value = %result.value(),
            source = ?result.source(),
            "Flag decided"
        );
        match trust_type {
            Some(trust) => result.with_trust(trust),
            None => result,
        }
    }

    /// Value stored for exactly these contexts (after the same
    /// normalization `set_flag_permission` applies)
    pub fn get_flag_permission_value(
        &self,
        subject: &PermissionSubject,
        flag: Flag,
        contexts: &ContextSet,
    ) -> Tristate {
        let Ok(contexts) = normalize_contexts(subject, contexts.clone()) else {
            return Tristate::Undefined;
        };
        self.store()
            .exact(subject, PermissionKey::Flag(flag), &contexts)
            .map(|value| value.as_tristate())
            .unwrap_or_default()
    }

    /// Store a flag value. UNDEFINED removes the entry. Contexts without a
    /// claim tier default to the global default tier.
    #[instrument(skip(self, contexts), fields(subject = %subject, flag = %flag, value = %value))]
    pub fn set_flag_permission(
        &self,
        subject: PermissionSubject,
        flag: Flag,
        value: Tristate,
        contexts: ContextSet,
    ) -> PendingMutation {
        let contexts = match normalize_contexts(&subject, contexts) {
            Ok(contexts) => contexts,
            Err(message) => return invalid_context(message),
        };
        let value = value.is_defined().then_some(StoredValue::State(value));
        self.store().submit(PermissionChange {
            subject,
            key: PermissionKey::Flag(flag),
            contexts,
            value,
        })
    }

    /// Store an option value. `None` removes the entry.
    #[instrument(skip(self, value, contexts), fields(subject = %subject, option = %option))]
    pub fn set_option(
        &self,
        subject: PermissionSubject,
        option: ClaimOption,
        value: Option<OptionValue>,
        contexts: ContextSet,
    ) -> PendingMutation {
        let definition = self.options().definition(option);
        if let Some(value) = &value
            && let Err(message) = definition.kind.check(value)
        {
            return PendingMutation::ready(PermissionResult::failure(
                PermissionResultType::Failure,
                format!("{option}: {message}"),
            ));
        }
        if let Some(missing) = definition
            .required_contexts
            .iter()
            .copied()
            .find(|key| !contexts.contains_key(key))
        {
            return invalid_context(format!("{option} requires a '{missing}' context"));
        }
        if definition.is_global
            && (contexts.contains_key(Context::CLAIM) || contexts.contains_key(Context::CLAIM_OVERRIDE))
        {
            return invalid_context(format!("{option} is global and cannot be scoped to a claim"));
        }
        let contexts = match normalize_contexts(&subject, contexts) {
            Ok(contexts) => contexts,
            Err(message) => return invalid_context(message),
        };
        self.store().submit(PermissionChange {
            subject,
            key: PermissionKey::Option(option),
            contexts,
            value: value.map(StoredValue::Option),
        })
    }

    /// Option value stored for exactly these contexts
    pub fn get_option_value(
        &self,
        subject: &PermissionSubject,
        option: ClaimOption,
        contexts: &ContextSet,
    ) -> Option<OptionValue> {
        let contexts = normalize_contexts(subject, contexts.clone()).ok()?;
        self.store()
            .exact(subject, PermissionKey::Option(option), &contexts)
            .and_then(|value| value.as_option().cloned())
    }

    /// Effective option value for `subject` in `claim`
    pub fn get_active_option_value(
        &self,
        claim: &Claim,
        subject: &Subject,
        option: ClaimOption,
        contexts: &ContextSet,
    ) -> OptionValue {
        let snapshot = self.world_snapshot(claim.world());
        let parent = snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.parent(claim.id()))
            .filter(|parent| !parent.is_wilderness());
        let query = FlagQuery::new(claim)
            .parent(parent.map(Arc::as_ref))
            .subject(subject)
            .contexts(contexts);
        self.resolver.option_value(&query, option).0
    }

    /// Grant (TRUE) or deny (FALSE) `level` to a user or group in one claim
    /// through a persistent permission entry. UNDEFINED removes it.
    pub fn set_trust_permission(
        &self,
        subject: PermissionSubject,
        claim: &Claim,
        level: TrustLevel,
        value: Tristate,
    ) -> PendingMutation {
        if subject == PermissionSubject::Default {
            return invalid_context("trust permissions need a user or group subject");
        }
        if level == TrustLevel::None {
            return invalid_context("trust permissions need a level above none");
        }
        let contexts = ContextSet::new().with(Context::CLAIM, claim.id().to_string());
        self.store().submit(PermissionChange {
            subject,
            key: PermissionKey::Trust(level),
            contexts,
            value: value.is_defined().then_some(StoredValue::State(value)),
        })
    }

    /// Trust check including persistent trust permissions
    pub fn user_trust(&self, claim: &Claim, subject: &Subject, level: TrustLevel) -> TrustResult {
        match self.world_snapshot(claim.world()) {
            Some(snapshot) => self.trust_resolver(&snapshot).check(claim.id(), subject, level),
            None => TrustResult::not_trusted(subject.user, level)
                .with_message(format!("world {} is not loaded", claim.world())),
        }
    }

    pub fn flag_definition(&self, flag: Flag) -> Arc<FlagDefinition> {
        self.flags().definition(flag)
    }

    /// Replace a flag's definition once the store has persisted it
    #[instrument(skip(self, definition), fields(flag = %definition.flag))]
    pub fn set_flag_definition(&self, definition: FlagDefinition) -> PendingMutation {
        let flags = Arc::clone(self.flags());
        self.store()
            .submit_definition(definition, move |definition| flags.replace(definition))
    }

    /// Decide whether `subject` may move from `from` to `to`: `exit-claim`
    /// on the origin, `enter-claim` on the destination, then the border
    /// crossing hook.
    pub fn check_border_cross(
        &self,
        world: WorldId,
        from: BlockPos,
        to: BlockPos,
        subject: &Subject,
    ) -> PermissionResult {
        let Some(snapshot) = self.world_snapshot(world) else {
            return PermissionResult::failure(
                PermissionResultType::Failure,
                format!("world {world} is not loaded"),
            );
        };
        let origin = Arc::clone(snapshot.claim_at(from));
        let destination = Arc::clone(snapshot.claim_at(to));
        if origin.id() == destination.id() {
            return PermissionResult::decision(Tristate::True, ResolutionSource::Fallback, subject.user);
        }

        let none = ContextSet::new();
        let exit = self.get_active_flag_permission_value(&origin, subject, Flag::ExitClaim, None, None, &none);
        if !exit.is_allowed() {
            debug!(claim = %origin.id(), user = %subject.user, "Exit denied");
            return exit;
        }
        let enter =
            self.get_active_flag_permission_value(&destination, subject, Flag::EnterClaim, None, None, &none);
        if !enter.is_allowed() {
            debug!(claim = %destination.id(), user = %subject.user, "Entry denied");
            return enter;
        }

        let event = ClaimEvent::new(ClaimEventKind::BorderCross, world)
            .previous(origin)
            .current(destination)
            .user(Some(subject.user));
        let events = self.registry.events();
        if let HookOutcome::Cancel { reason } = events.before(&event) {
            return PermissionResult::vetoed(subject.user, reason);
        }
        events.after(&event);
        enter
    }
}

fn invalid_context(message: impl Into<String>) -> PendingMutation {
    PendingMutation::ready(PermissionResult::failure(
        PermissionResultType::InvalidContext,
        message,
    ))
}

/// Check tier and discriminator contexts and add the global default tier
/// when no tier is given
fn normalize_contexts(subject: &PermissionSubject, mut contexts: ContextSet) -> Result<ContextSet, String> {
    let tiers: Vec<Context> = contexts.iter().filter(|c| c.is_tier_key()).cloned().collect();
    if tiers.len() > 1 {
        return Err("at most one claim, claim_default or claim_override context is allowed".to_string());
    }
    if let Some(tier) = tiers.first() {
        let valid = match tier.key.as_str() {
            Context::CLAIM => tier.value.parse::<ClaimId>().is_ok(),
            Context::CLAIM_DEFAULT => tier.value == GLOBAL || tier.value.parse::<ClaimType>().is_ok(),
            _ => {
                if *subject != PermissionSubject::Default {
                    return Err("override contexts apply to the default subject only".to_string());
                }
                tier.value == GLOBAL
                    || tier.value.parse::<ClaimType>().is_ok()
                    || tier.value.parse::<ClaimId>().is_ok()
            }
        };
        if !valid {
            return Err(format!("invalid tier context {tier}"));
        }
    }
    for key in [Context::SOURCE, Context::TARGET] {
        if let Some(value) = contexts.get(key) {
            identifier::validate_discriminator(value).map_err(|e| e.to_string())?;
        }
    }
    if tiers.is_empty() {
        contexts.insert(Context::new(Context::CLAIM_DEFAULT, GLOBAL));
    }
    Ok(contexts)
}

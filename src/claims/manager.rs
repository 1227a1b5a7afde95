//! Per-world claim mutations
//!
//! Every mutation runs the same pipeline while holding the world's writer
//! gate:
//!
//! 1. Validate against the current snapshot
//! 2. Dispatch before-hooks (a cancel aborts with `CLAIM_EVENT_CANCELLED`)
//! 3. Withdraw from the economy when economy mode is on
//! 4. Persist to storage (failure refunds and aborts)
//! 5. Publish the next snapshot, then notify after-hooks
//!
//! Readers never wait on the gate; they keep the snapshot they cloned until
//! the next publish.

use crate::claims::WorldSnapshot;
use crate::config::{ClaimLimits, ExpirationConfig};
use crate::error::{EconomyError, IntegrityError, StorageError};
use crate::model::{
    BlockPos, Bounds, Claim, ClaimDraft, ClaimEconomyData, ClaimId, ClaimResult, ClaimResultType,
    ClaimType, Subject, TrustLevel, TrustResult, TrustResultType, TrustTable, UserId, WorldId,
};
use crate::providers::{ClaimEvent, ClaimEventKind, EconomyProvider, HookOutcome, Providers};
use crate::trust::TrustResolver;
use crate::util::{identifier, read_lock, write_lock};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::thread::{self, ThreadId};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Engine settings that shape mutations
#[derive(Debug, Clone, Default)]
pub struct ManagerSettings {
    /// Charge currency instead of claim blocks
    pub economy_mode: bool,
    pub expiration: ExpirationConfig,
}

/// Attribute changes for [`ClaimManager::update`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimUpdate {
    display_name: Option<Option<String>>,
    friendly_id: Option<Option<String>>,
    claim_group: Option<Option<String>>,
    resizable: Option<bool>,
    inherit_parent: Option<bool>,
    deny_messages: Option<bool>,
    expiration: Option<bool>,
    flag_overrides: Option<bool>,
    economy: Option<Option<ClaimEconomyData>>,
}

impl ClaimUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(mut self, name: Option<impl Into<String>>) -> Self {
        self.display_name = Some(name.map(Into::into));
        self
    }

    pub fn friendly_id(mut self, id: Option<impl Into<String>>) -> Self {
        self.friendly_id = Some(id.map(Into::into));
        self
    }

    pub fn claim_group(mut self, group: Option<impl Into<String>>) -> Self {
        self.claim_group = Some(group.map(Into::into));
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = Some(resizable);
        self
    }

    pub fn inherit_parent(mut self, inherit: bool) -> Self {
        self.inherit_parent = Some(inherit);
        self
    }

    pub fn deny_messages(mut self, deny_messages: bool) -> Self {
        self.deny_messages = Some(deny_messages);
        self
    }

    pub fn expiration(mut self, expiration: bool) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn flag_overrides(mut self, flag_overrides: bool) -> Self {
        self.flag_overrides = Some(flag_overrides);
        self
    }

    pub fn economy(mut self, economy: Option<ClaimEconomyData>) -> Self {
        self.economy = Some(economy);
        self
    }

    /// Whether the update touches settings the wilderness does not have
    fn touches_structure(&self) -> bool {
        self.resizable.is_some()
            || self.inherit_parent.is_some()
            || self.expiration.is_some()
            || self.economy.is_some()
    }

    fn apply(&self, claim: &mut Claim) {
        if let Some(name) = &self.display_name {
            claim.display_name = name.clone();
        }
        if let Some(id) = &self.friendly_id {
            claim.friendly_id = id.clone();
        }
        if let Some(group) = &self.claim_group {
            claim.claim_group = group.clone();
        }
        if let Some(resizable) = self.resizable {
            claim.resizable = resizable;
        }
        if let Some(inherit) = self.inherit_parent {
            claim.inherit_parent = inherit;
        }
        if let Some(deny) = self.deny_messages {
            claim.deny_messages = deny;
        }
        if let Some(expiration) = self.expiration {
            claim.expiration = expiration;
        }
        if let Some(overrides) = self.flag_overrides {
            claim.flag_overrides = overrides;
        }
        if let Some(economy) = &self.economy {
            claim.economy = economy.clone();
        }
    }
}

/// Who a trust change is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustTarget {
    User(UserId),
    Group(String),
    Clan(String),
}

impl TrustTarget {
    /// Everyone, stored as the public user entry
    pub const fn public() -> Self {
        TrustTarget::User(UserId::PUBLIC)
    }
}

/// One edit to a claim's trust table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustChange {
    /// Grant `level`. For users and groups `NONE` removes the entry; for
    /// clans it records an explicit deny.
    Set(TrustTarget, TrustLevel),
    Remove(TrustTarget),
    /// Drop every entry of every kind
    Clear,
}

impl TrustChange {
    fn validate(&self) -> Result<(), String> {
        match self {
            TrustChange::Set(TrustTarget::Group(name), _)
            | TrustChange::Remove(TrustTarget::Group(name))
                if name.trim().is_empty() =>
            {
                Err("group name must not be empty".to_string())
            }
            TrustChange::Set(TrustTarget::Clan(name), _)
            | TrustChange::Remove(TrustTarget::Clan(name))
                if name.trim().is_empty() =>
            {
                Err("clan name must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }

    fn apply(&self, table: &mut TrustTable) -> bool {
        match self {
            TrustChange::Set(TrustTarget::User(user), level) => table.set_user(*user, *level),
            TrustChange::Set(TrustTarget::Group(group), level) => table.set_group(group, *level),
            TrustChange::Set(TrustTarget::Clan(clan), level) => table.set_clan(clan, *level),
            TrustChange::Remove(TrustTarget::User(user)) => table.remove_user(user),
            TrustChange::Remove(TrustTarget::Group(group)) => table.remove_group(group),
            TrustChange::Remove(TrustTarget::Clan(clan)) => table.remove_clan(clan),
            TrustChange::Clear => table.clear(),
        }
    }
}

/// A validated change ready for the commit half of the pipeline
struct Mutation {
    kind: ClaimEventKind,
    previous: Option<Arc<Claim>>,
    next: Claim,
    user: Option<UserId>,
    /// Owner and number of claim blocks to charge in economy mode
    charge: Option<(UserId, i64)>,
}

/// Claims and thread of the before-hooks currently running
#[derive(Default)]
struct Dispatch {
    claims: HashSet<ClaimId>,
    thread: Option<ThreadId>,
}

/// Clears the dispatch record when hook dispatch ends
struct DispatchGuard<'a> {
    dispatch: &'a RwLock<Dispatch>,
    id: Option<ClaimId>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut dispatch = write_lock(self.dispatch, "hook dispatch");
        if let Some(id) = self.id {
            dispatch.claims.remove(&id);
        }
        dispatch.thread = None;
    }
}

/// Tally of a recursive removal
#[derive(Default)]
struct Removal {
    removed: Vec<Arc<Claim>>,
    vetoed: Vec<ClaimId>,
    /// Claims kept because a descendant was vetoed
    blocked: HashSet<ClaimId>,
    cancel_reason: Option<String>,
    failure: Option<(ClaimResultType, String)>,
}

/// Owner of one world's claims
pub struct ClaimManager {
    world: WorldId,
    snapshot: RwLock<Arc<WorldSnapshot>>,
    writer: Mutex<()>,
    dispatching: RwLock<Dispatch>,
    providers: Providers,
    settings: ManagerSettings,
}

impl std::fmt::Debug for ClaimManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimManager")
            .field("world", &self.world)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ClaimManager {
    pub fn new(snapshot: WorldSnapshot, providers: Providers, settings: ManagerSettings) -> Self {
        Self {
            world: snapshot.world(),
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            dispatching: RwLock::new(Dispatch::default()),
            providers,
            settings,
        }
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Current published snapshot
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&read_lock(&self.snapshot, "world snapshot"))
    }

    pub fn get(&self, id: ClaimId) -> Option<Arc<Claim>> {
        self.snapshot().get(id).cloned()
    }

    pub fn claim_at(&self, pos: BlockPos) -> Arc<Claim> {
        Arc::clone(self.snapshot().claim_at(pos))
    }

    pub fn wilderness(&self) -> Arc<Claim> {
        Arc::clone(self.snapshot().wilderness())
    }

    /// Trust check against claim data only (no persistent permission entries)
    pub fn check_trust(&self, claim: ClaimId, subject: &Subject, required: TrustLevel) -> TrustResult {
        let snapshot = self.snapshot();
        TrustResolver::new(&snapshot, self.providers.clans.as_ref(), &self.settings.expiration)
            .check(claim, subject, required)
    }

    fn publish(&self, next: WorldSnapshot) {
        *write_lock(&self.snapshot, "world snapshot") = Arc::new(next);
    }

    /// Refuse a mutation that would re-enter the writer gate from a hook.
    ///
    /// Hooks run on the thread holding the gate, so any mutation issued from
    /// that thread while they run would wait on itself.
    fn reentry(&self, ids: impl IntoIterator<Item = ClaimId>) -> Option<ClaimResult> {
        let dispatch = read_lock(&self.dispatching, "hook dispatch");
        if let Some(id) = ids.into_iter().find(|id| dispatch.claims.contains(id)) {
            return Some(Self::busy(id));
        }
        (dispatch.thread == Some(thread::current().id())).then(|| {
            ClaimResult::failure(
                ClaimResultType::Failure,
                format!("claims in world {} cannot be changed from inside an event hook", self.world),
            )
        })
    }

    /// Run before-hooks for `event`, marking its claim as dispatching
    fn dispatch_before(&self, event: &ClaimEvent) -> Result<(), String> {
        let id = event.claim_id();
        {
            let mut dispatch = write_lock(&self.dispatching, "hook dispatch");
            if let Some(id) = id {
                dispatch.claims.insert(id);
            }
            dispatch.thread = Some(thread::current().id());
        }
        let _guard = DispatchGuard {
            dispatch: &self.dispatching,
            id,
        };
        match self.providers.events.before(event) {
            HookOutcome::Continue => Ok(()),
            HookOutcome::Cancel { reason } => Err(reason),
        }
    }

    fn economy(&self) -> Result<&Arc<dyn EconomyProvider>, ClaimResult> {
        self.providers.economy.as_ref().ok_or_else(|| {
            ClaimResult::failure(
                ClaimResultType::Failure,
                "economy mode is enabled but no economy provider is configured",
            )
        })
    }

    fn block_price(&self, owner: UserId, blocks: i64) -> f64 {
        blocks as f64 * self.providers.player_data.economy_block_cost(owner)
    }

    /// Check that `owner` can afford `delta` more claim blocks. `new_cost` is
    /// the full cost of the claim afterwards; `replacing` is excluded from
    /// the owner's current spend.
    async fn verify_funds(
        &self,
        snapshot: &WorldSnapshot,
        owner: UserId,
        new_cost: i64,
        delta: i64,
        replacing: Option<ClaimId>,
    ) -> Option<ClaimResult> {
        if delta <= 0 {
            return None;
        }
        if self.settings.economy_mode {
            let price = self.block_price(owner, delta);
            let economy = match self.economy() {
                Ok(economy) => economy,
                Err(result) => return Some(result),
            };
            return match economy.balance(owner).await {
                Ok(balance) if balance < price => Some(ClaimResult::failure(
                    ClaimResultType::EconomyNotEnoughFunds,
                    format!("claim costs {price:.2}, balance is {balance:.2}"),
                )),
                Ok(_) => None,
                Err(e) => Some(economy_failure(e, ClaimResultType::EconomyWithdrawFailure)),
            };
        }
        let spent: i64 = snapshot
            .owned_by(owner)
            .filter(|claim| Some(claim.id()) != replacing)
            .map(|claim| claim.claim_block_cost())
            .sum();
        let remaining = self.providers.player_data.claim_blocks(owner) - spent;
        (new_cost > remaining).then(|| {
            ClaimResult::failure(
                ClaimResultType::InsufficientClaimBlocks,
                format!("claim needs {new_cost} claim blocks, {remaining} remaining"),
            )
        })
    }

    async fn withdraw(&self, owner: UserId, blocks: i64) -> Result<f64, ClaimResult> {
        if !self.settings.economy_mode || blocks <= 0 {
            return Ok(0.0);
        }
        let amount = self.block_price(owner, blocks);
        self.economy()?
            .withdraw(owner, amount)
            .await
            .map_err(|e| economy_failure(e, ClaimResultType::EconomyWithdrawFailure))?;
        debug!(owner = %owner, amount, "Withdrew claim cost");
        Ok(amount)
    }

    async fn refund(&self, owner: UserId, amount: f64) {
        if amount <= 0.0 {
            return;
        }
        if let Some(economy) = &self.providers.economy
            && let Err(e) = economy.deposit(owner, amount).await
        {
            error!(owner = %owner, amount, error = %e, "Refund after failed commit did not go through");
        }
    }

    /// Hook, charge, persist and publish a validated change
    async fn commit(&self, snapshot: &WorldSnapshot, mutation: Mutation) -> ClaimResult {
        let claim = Arc::new(mutation.next);
        let next = match snapshot.with_claim(Arc::clone(&claim)) {
            Ok(next) => next,
            Err(e) => return integrity_failure(e),
        };

        let mut event = ClaimEvent::new(mutation.kind, self.world)
            .current(Arc::clone(&claim))
            .user(mutation.user);
        if let Some(previous) = mutation.previous {
            event = event.previous(previous);
        }
        if let Err(reason) = self.dispatch_before(&event) {
            return ClaimResult::cancelled(reason, Vec::new(), vec![claim.id()]);
        }

        let mut paid = None;
        if let Some((owner, blocks)) = mutation.charge {
            match self.withdraw(owner, blocks).await {
                Ok(amount) => paid = Some((owner, amount)),
                Err(result) => return result,
            }
        }

        if let Err(e) = self.providers.storage.save_claim(&claim).await {
            error!(claim = %claim.id(), error = %e, "Failed to persist claim, change discarded");
            if let Some((owner, amount)) = paid {
                self.refund(owner, amount).await;
            }
            return ClaimResult::failure(
                ClaimResultType::Failure,
                format!("storage write failed: {e}"),
            );
        }

        self.publish(next);
        self.providers.events.after(&event);
        ClaimResult::success(claim)
    }

    /// Load a claim for mutation, rejecting it while its hooks are running
    fn target(&self, snapshot: &WorldSnapshot, id: ClaimId) -> Result<Arc<Claim>, ClaimResult> {
        snapshot.get(id).cloned().ok_or_else(|| {
            ClaimResult::failure(ClaimResultType::ClaimNotFound, format!("claim {id} not found"))
        })
    }

    fn busy(id: ClaimId) -> ClaimResult {
        ClaimResult::failure(
            ClaimResultType::Failure,
            format!("claim {id} is being changed by an event hook"),
        )
    }

    /// Create a claim from a validated draft
    #[instrument(skip(self, draft), fields(world = %self.world, claim_type = %draft.claim_type()))]
    pub async fn create(&self, draft: ClaimDraft) -> ClaimResult {
        if draft.world != self.world {
            return ClaimResult::failure(
                ClaimResultType::WorldNotFound,
                format!("world {} is not managed here", draft.world),
            );
        }
        if let Some(rejected) = self.reentry(draft.parent) {
            return rejected;
        }

        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let parent_id = draft.parent.filter(|id| *id != snapshot.wilderness().id());
        let parent = match parent_id {
            Some(id) => match self.target(&snapshot, id) {
                Ok(parent) => parent,
                Err(_) => {
                    return ClaimResult::failure(
                        ClaimResultType::ClaimNotFound,
                        format!("parent claim {id} not found"),
                    );
                }
            },
            None => Arc::clone(snapshot.wilderness()),
        };

        if !draft.claim_type.allowed_under(parent.claim_type()) {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                format!(
                    "{} claims cannot be placed in a {} claim",
                    draft.claim_type,
                    parent.claim_type()
                ),
            );
        }
        if !parent.is_wilderness()
            && !parent.bounds().contains_bounds(&draft.bounds, parent.is_cuboid())
        {
            return ClaimResult::failure(
                ClaimResultType::Failure,
                format!("claim must lie within parent claim {}", parent.id()),
            );
        }

        let owner = match draft.claim_type {
            ClaimType::Admin => None,
            ClaimType::Subdivision => draft.owner.or(parent.owner()),
            _ => draft.owner,
        };
        if draft.claim_type.requires_owner() && owner.is_none() {
            return ClaimResult::failure(
                ClaimResultType::RequiresOwner,
                format!("{} claims require an owner", draft.claim_type),
            );
        }

        let now = Utc::now();
        let claim = Claim {
            id: ClaimId::new(),
            world: self.world,
            claim_type: draft.claim_type,
            cuboid: draft.cuboid,
            bounds: draft.bounds,
            owner,
            parent: parent_id,
            resizable: draft.resizable,
            inherit_parent: draft.inherit_parent,
            deny_messages: draft.deny_messages,
            expiration: draft.expiration,
            flag_overrides: draft.flag_overrides,
            created: now,
            last_active: now,
            display_name: draft.display_name,
            friendly_id: draft.friendly_id,
            claim_group: draft.claim_group,
            economy: draft.economy,
            trusts: TrustTable::default(),
        };

        if let Some(friendly_id) = claim.friendly_id()
            && let Some(taken) = friendly_id_taken(&snapshot, friendly_id, claim.id())
        {
            return taken;
        }

        if draft.validate
            && let Some(owner) = owner
        {
            let limits = self.providers.player_data.limits(owner, claim.claim_type);
            if let Some(rejected) = check_size(&limits, claim.bounds(), claim.is_cuboid()) {
                return rejected;
            }
            if let Some(rejected) = check_count(&snapshot, owner, claim.claim_type, &limits) {
                return rejected;
            }
        }

        let related = match ancestry(&snapshot, parent.id()) {
            Ok(related) => related,
            Err(result) => return result,
        };
        if let Some(other) = first_overlap(&snapshot, &claim, &related) {
            return overlapping(&other);
        }

        let cost = claim.claim_block_cost();
        let charge = match owner {
            Some(owner) if draft.validate => {
                if let Some(rejected) = self.verify_funds(&snapshot, owner, cost, cost, None).await {
                    return rejected;
                }
                Some((owner, cost))
            }
            _ => None,
        };

        let id = claim.id();
        let result = self
            .commit(
                &snapshot,
                Mutation {
                    kind: ClaimEventKind::Create,
                    previous: None,
                    next: claim,
                    user: owner,
                    charge,
                },
            )
            .await;
        if result.successful() {
            info!(claim = %id, owner = ?owner, cost, "Claim created");
        }
        result
    }

    /// Move a claim's corners. Children must stay inside the new bounds.
    #[instrument(skip(self), fields(world = %self.world))]
    pub async fn resize(&self, claim_id: ClaimId, bounds: Bounds) -> ClaimResult {
        if let Some(rejected) = self.reentry([claim_id]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let claim = match self.target(&snapshot, claim_id) {
            Ok(claim) => claim,
            Err(result) => return result,
        };

        if claim.is_wilderness() {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                "the wilderness cannot be resized",
            );
        }
        if !claim.is_resizable() {
            return ClaimResult::failure(ClaimResultType::Failure, "claim is not resizable");
        }

        let children = match snapshot.get_children(claim_id, false) {
            Ok(children) => children,
            Err(e) => return integrity_failure(e),
        };
        if let Some(outside) = children
            .iter()
            .find(|child| !bounds.contains_bounds(child.bounds(), claim.is_cuboid()))
        {
            return ClaimResult::failure(
                ClaimResultType::Failure,
                format!("resize would leave child claim {} outside", outside.id()),
            );
        }
        if let Some(parent) = snapshot.parent(claim_id)
            && !parent.is_wilderness()
            && !parent.bounds().contains_bounds(&bounds, parent.is_cuboid())
        {
            return ClaimResult::failure(
                ClaimResultType::Failure,
                format!("claim must lie within parent claim {}", parent.id()),
            );
        }

        let mut next = (*claim).clone();
        next.bounds = bounds;

        if let Some(owner) = claim.owner() {
            let limits = self.providers.player_data.limits(owner, claim.claim_type());
            if let Some(rejected) = check_size(&limits, next.bounds(), next.is_cuboid()) {
                return rejected;
            }
        }

        let mut related = match ancestry(&snapshot, claim_id) {
            Ok(related) => related,
            Err(result) => return result,
        };
        match snapshot.get_children(claim_id, true) {
            Ok(descendants) => related.extend(descendants.iter().map(|c| c.id())),
            Err(e) => return integrity_failure(e),
        }
        if let Some(other) = first_overlap(&snapshot, &next, &related) {
            return overlapping(&other);
        }

        let new_cost = next.claim_block_cost();
        let delta = new_cost - claim.claim_block_cost();
        let charge = match claim.owner() {
            Some(owner) => {
                if let Some(rejected) = self
                    .verify_funds(&snapshot, owner, new_cost, delta, Some(claim_id))
                    .await
                {
                    return rejected;
                }
                Some((owner, delta))
            }
            None => None,
        };

        let user = claim.owner();
        let result = self
            .commit(
                &snapshot,
                Mutation {
                    kind: ClaimEventKind::Resize,
                    previous: Some(claim),
                    next,
                    user,
                    charge,
                },
            )
            .await;
        if result.successful() {
            info!(claim = %claim_id, delta, "Claim resized");
        }
        result
    }

    /// Change a claim's type.
    ///
    /// Admin claims are held by the server, so changing to ADMIN clears the
    /// owner and any sale/rent record. Changing to a type that requires an
    /// owner uses `owner`, then the current owner, then (for subdivisions)
    /// the parent's owner.
    #[instrument(skip(self), fields(world = %self.world))]
    pub async fn change_type(
        &self,
        claim_id: ClaimId,
        claim_type: ClaimType,
        owner: Option<UserId>,
    ) -> ClaimResult {
        if let Some(rejected) = self.reentry([claim_id]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let claim = match self.target(&snapshot, claim_id) {
            Ok(claim) => claim,
            Err(result) => return result,
        };

        if claim.is_wilderness() || claim_type == ClaimType::Wilderness {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                "the wilderness type cannot be changed or assigned",
            );
        }
        if claim.claim_type() == claim_type {
            return ClaimResult::success(claim);
        }

        let parent = snapshot
            .parent(claim_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(snapshot.wilderness()));
        if !claim_type.allowed_under(parent.claim_type()) {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                format!("{} claims cannot be placed in a {} claim", claim_type, parent.claim_type()),
            );
        }
        let children = match snapshot.get_children(claim_id, false) {
            Ok(children) => children,
            Err(e) => return integrity_failure(e),
        };
        if let Some(child) = children
            .iter()
            .find(|child| !child.claim_type().allowed_under(claim_type))
        {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                format!("child claim {} ({}) cannot sit in a {} claim", child.id(), child.claim_type(), claim_type),
            );
        }

        let mut next = (*claim).clone();
        next.claim_type = claim_type;
        if claim_type == ClaimType::Admin {
            next.owner = None;
            next.economy = None;
        } else if claim_type.requires_owner() {
            let inherited = (claim_type == ClaimType::Subdivision)
                .then(|| parent.owner())
                .flatten();
            next.owner = owner.or(claim.owner()).or(inherited);
            if next.owner.is_none() {
                return ClaimResult::failure(
                    ClaimResultType::RequiresOwner,
                    format!("{claim_type} claims require an owner"),
                );
            }
        }

        let mut charge = None;
        if let Some(new_owner) = next.owner {
            let limits = self.providers.player_data.limits(new_owner, claim_type);
            if let Some(rejected) = check_size(&limits, next.bounds(), next.is_cuboid()) {
                return rejected;
            }
            if let Some(rejected) = check_count(&snapshot, new_owner, claim_type, &limits) {
                return rejected;
            }
            let new_cost = next.claim_block_cost();
            let already_paid = if claim.owner() == Some(new_owner) {
                claim.claim_block_cost()
            } else {
                0
            };
            let delta = new_cost - already_paid;
            if let Some(rejected) = self
                .verify_funds(&snapshot, new_owner, new_cost, delta, Some(claim_id))
                .await
            {
                return rejected;
            }
            charge = Some((new_owner, delta));
        }

        let user = next.owner;
        let from = claim.claim_type();
        let result = self
            .commit(
                &snapshot,
                Mutation {
                    kind: ClaimEventKind::ChangeType,
                    previous: Some(claim),
                    next,
                    user,
                    charge,
                },
            )
            .await;
        if result.successful() {
            info!(claim = %claim_id, from = %from, to = %claim_type, "Claim type changed");
        }
        result
    }

    /// Hand a claim to a new owner. The new owner must have room for it in
    /// their claim blocks and claim count.
    #[instrument(skip(self), fields(world = %self.world))]
    pub async fn transfer_owner(&self, claim_id: ClaimId, new_owner: UserId) -> ClaimResult {
        if let Some(rejected) = self.reentry([claim_id]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let claim = match self.target(&snapshot, claim_id) {
            Ok(claim) => claim,
            Err(result) => return result,
        };

        if claim.is_wilderness() || claim.is_admin() {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                format!("{} claims cannot be transferred", claim.claim_type()),
            );
        }
        if claim.owner() == Some(new_owner) {
            return ClaimResult::success(claim);
        }

        let limits = self.providers.player_data.limits(new_owner, claim.claim_type());
        if let Some(rejected) = check_count(&snapshot, new_owner, claim.claim_type(), &limits) {
            return rejected;
        }
        if !self.settings.economy_mode {
            let cost = claim.claim_block_cost();
            if let Some(rejected) = self.verify_funds(&snapshot, new_owner, cost, cost, None).await {
                return rejected;
            }
        }

        let mut next = (*claim).clone();
        next.owner = Some(new_owner);
        let previous_owner = claim.owner();
        let result = self
            .commit(
                &snapshot,
                Mutation {
                    kind: ClaimEventKind::Transfer,
                    previous: Some(claim),
                    next,
                    user: Some(new_owner),
                    charge: None,
                },
            )
            .await;
        if result.successful() {
            info!(claim = %claim_id, from = ?previous_owner, to = %new_owner, "Claim transferred");
        }
        result
    }

    /// Change claim attributes
    #[instrument(skip(self, update), fields(world = %self.world))]
    pub async fn update(&self, claim_id: ClaimId, update: ClaimUpdate) -> ClaimResult {
        if let Some(rejected) = self.reentry([claim_id]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let claim = match self.target(&snapshot, claim_id) {
            Ok(claim) => claim,
            Err(result) => return result,
        };

        if claim.is_wilderness() && update.touches_structure() {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                "only names, deny messages and overrides can be changed on the wilderness",
            );
        }
        if let Some(Some(friendly_id)) = &update.friendly_id {
            if let Err(e) = identifier::validate_friendly_id(friendly_id) {
                return ClaimResult::failure(ClaimResultType::Failure, e.to_string());
            }
            if let Some(taken) = friendly_id_taken(&snapshot, friendly_id, claim_id) {
                return taken;
            }
        }

        let mut next = (*claim).clone();
        update.apply(&mut next);
        if next == *claim {
            return ClaimResult::success(claim);
        }

        let user = claim.owner();
        self.commit(
            &snapshot,
            Mutation {
                kind: ClaimEventKind::Update,
                previous: Some(claim),
                next,
                user,
                charge: None,
            },
        )
        .await
    }

    /// Refresh a claim's last-active time. Activity is not a hookable event.
    pub async fn touch(&self, claim_id: ClaimId) -> ClaimResult {
        if let Some(rejected) = self.reentry([claim_id]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let claim = match self.target(&snapshot, claim_id) {
            Ok(claim) => claim,
            Err(result) => return result,
        };
        let mut next = (*claim).clone();
        next.last_active = Utc::now();
        let next = Arc::new(next);
        let published = match snapshot.with_claim(Arc::clone(&next)) {
            Ok(published) => published,
            Err(e) => return integrity_failure(e),
        };
        if let Err(e) = self.providers.storage.save_claim(&next).await {
            warn!(claim = %claim_id, error = %e, "Failed to persist activity");
            return ClaimResult::failure(ClaimResultType::Failure, format!("storage write failed: {e}"));
        }
        self.publish(published);
        ClaimResult::success(next)
    }

    /// Remove a claim. With `cascade` its subtree goes too, otherwise a claim
    /// with children is refused.
    #[instrument(skip(self), fields(world = %self.world))]
    pub async fn delete(&self, claim_id: ClaimId, cascade: bool) -> ClaimResult {
        if let Some(rejected) = self.reentry([claim_id]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let claim = match self.target(&snapshot, claim_id) {
            Ok(claim) => claim,
            Err(result) => return result,
        };
        if claim.is_wilderness() {
            return ClaimResult::failure(
                ClaimResultType::WrongClaimType,
                "the wilderness cannot be removed",
            );
        }
        if !cascade && snapshot.has_children(claim_id) {
            return ClaimResult::failure(
                ClaimResultType::Failure,
                "claim has child claims; remove them first or cascade",
            );
        }
        self.remove_trees(&snapshot, vec![claim]).await
    }

    /// Remove a direct child of `parent` together with its subtree
    #[instrument(skip(self), fields(world = %self.world))]
    pub async fn delete_child(&self, parent: ClaimId, child: ClaimId) -> ClaimResult {
        if let Some(rejected) = self.reentry([child]) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let is_direct = snapshot
            .parent(child)
            .is_some_and(|p| p.id() == parent);
        let claim = match snapshot.get(child) {
            Some(claim) if is_direct => Arc::clone(claim),
            _ => {
                return ClaimResult::failure(
                    ClaimResultType::ClaimNotFound,
                    format!("claim {child} is not a child of {parent}"),
                );
            }
        };
        self.remove_trees(&snapshot, vec![claim]).await
    }

    /// Remove every direct child of `parent` (optionally only of one type),
    /// each with its subtree. Vetoed claims and their ancestors stay.
    #[instrument(skip(self), fields(world = %self.world))]
    pub async fn delete_children(&self, parent: ClaimId, claim_type: Option<ClaimType>) -> ClaimResult {
        let subtree = self
            .snapshot()
            .get_children(parent, true)
            .map(|children| children.iter().map(|c| c.id()).collect::<Vec<_>>())
            .unwrap_or_default();
        if let Some(rejected) = self.reentry(std::iter::once(parent).chain(subtree)) {
            return rejected;
        }
        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        if snapshot.get(parent).is_none() {
            return ClaimResult::failure(
                ClaimResultType::ClaimNotFound,
                format!("claim {parent} not found"),
            );
        }
        let children = match snapshot.get_children(parent, false) {
            Ok(children) => children,
            Err(e) => return integrity_failure(e),
        };
        let roots: Vec<_> = children
            .into_iter()
            .filter(|child| claim_type.is_none_or(|t| child.claim_type() == t))
            .collect();
        if let Some(rejected) = self.reentry(roots.iter().map(|c| c.id())) {
            return rejected;
        }
        self.remove_trees(&snapshot, roots).await
    }

    /// Post-order removal of each root's subtree with one publish at the end
    async fn remove_trees(&self, snapshot: &WorldSnapshot, roots: Vec<Arc<Claim>>) -> ClaimResult {
        let mut next = snapshot.clone();
        let mut removal = Removal::default();
        let mut events = Vec::new();

        'roots: for root in roots {
            let mut order = match snapshot.get_children(root.id(), true) {
                Ok(descendants) => descendants,
                Err(e) => {
                    error!(claim = %root.id(), error = %e, "Cannot walk subtree for removal");
                    removal.failure = Some((ClaimResultType::Failure, e.to_string()));
                    break;
                }
            };
            order.insert(0, root);
            // Reversed pre-order visits every descendant before its ancestors
            for claim in order.into_iter().rev() {
                if removal.blocked.contains(&claim.id()) {
                    continue;
                }
                let event = ClaimEvent::new(ClaimEventKind::Remove, self.world)
                    .previous(Arc::clone(&claim))
                    .user(claim.owner());
                if let Err(reason) = self.dispatch_before(&event) {
                    removal.vetoed.push(claim.id());
                    removal.cancel_reason.get_or_insert(reason);
                    if let Ok(ancestors) = snapshot.get_parents(claim.id(), true) {
                        removal.blocked.extend(ancestors.iter().map(|c| c.id()));
                    }
                    continue;
                }
                if let Err(failure) = self.release(&claim).await {
                    removal.failure = Some(failure);
                    break 'roots;
                }
                next = next.without_claim(claim.id());
                removal.removed.push(Arc::clone(&claim));
                events.push(event);
            }
        }

        if !removal.removed.is_empty() {
            self.publish(next);
            for event in &events {
                self.providers.events.after(event);
            }
            info!(removed = removal.removed.len(), vetoed = removal.vetoed.len(), "Claims removed");
        }

        match (removal.failure, removal.cancel_reason) {
            (Some((result_type, message)), _) => {
                ClaimResult::partial(result_type, message, removal.removed, removal.vetoed)
            }
            (None, Some(reason)) => ClaimResult::cancelled(reason, removal.removed, removal.vetoed),
            (None, None) => ClaimResult::success_many(removal.removed),
        }
    }

    /// Delete one claim from storage, then refund it in economy mode.
    ///
    /// The refund is paid only once the delete has gone through. A refund
    /// that fails puts the claim back in storage, leaving nothing changed.
    async fn release(&self, claim: &Claim) -> Result<(), (ClaimResultType, String)> {
        let cost = claim.claim_block_cost();
        let refund = match claim.owner() {
            Some(owner) if self.settings.economy_mode && cost > 0 => {
                let economy = self
                    .economy()
                    .map_err(|r| (r.result_type(), r.message().unwrap_or_default().to_string()))?;
                let amount = self.block_price(owner, cost)
                    * self.providers.player_data.economy_return_rate(owner);
                (amount > 0.0).then(|| (Arc::clone(economy), owner, amount))
            }
            _ => None,
        };

        match self.providers.storage.delete_claim(self.world, claim.id()).await {
            Ok(()) => {}
            Err(StorageError::NotFound { .. }) => {
                warn!(claim = %claim.id(), "Claim was already absent from storage");
            }
            Err(e) => {
                error!(claim = %claim.id(), error = %e, "Failed to delete claim from storage");
                return Err((ClaimResultType::Failure, format!("storage delete failed: {e}")));
            }
        }

        let Some((economy, owner, amount)) = refund else {
            return Ok(());
        };
        if let Err(e) = economy.deposit(owner, amount).await {
            error!(claim = %claim.id(), owner = %owner, error = %e, "Refund deposit failed");
            if let Err(restore) = self.providers.storage.save_claim(claim).await {
                error!(claim = %claim.id(), error = %restore, "Could not restore claim after failed refund");
            }
            return Err((ClaimResultType::EconomyDepositFailure, e.to_string()));
        }
        debug!(claim = %claim.id(), owner = %owner, amount, "Refunded claim cost");
        Ok(())
    }

    /// Apply trust changes atomically. With an `actor`, the actor must own
    /// the claim or hold MANAGER trust in it.
    #[instrument(skip(self, changes), fields(world = %self.world, changes = changes.len()))]
    pub async fn apply_trust(
        &self,
        claim_id: ClaimId,
        actor: Option<UserId>,
        changes: Vec<TrustChange>,
    ) -> TrustResult {
        let granted = changes
            .iter()
            .filter_map(|change| match change {
                TrustChange::Set(_, level) => Some(*level),
                _ => None,
            })
            .max()
            .unwrap_or_default();
        let outcome = |result_type| TrustResult::outcome(result_type, granted).from_claim(claim_id);

        if let Some(rejected) = self.reentry([claim_id]) {
            return outcome(TrustResultType::Failure)
                .with_message(rejected.message().unwrap_or_default().to_string());
        }
        if let Some(message) = changes.iter().find_map(|change| change.validate().err()) {
            return outcome(TrustResultType::Failure).with_message(message);
        }

        let _writer = self.writer.lock().await;
        let snapshot = self.snapshot();
        let Some(claim) = snapshot.get(claim_id).cloned() else {
            return outcome(TrustResultType::Failure).with_message(format!("claim {claim_id} not found"));
        };
        if claim.is_wilderness() {
            return outcome(TrustResultType::Failure).with_message("the wilderness holds no trust");
        }

        if let Some(actor) = actor {
            let check = TrustResolver::new(&snapshot, self.providers.clans.as_ref(), &self.settings.expiration)
                .check(claim_id, &Subject::user(actor), TrustLevel::Manager);
            if !check.is_trusted() {
                return TrustResult::not_trusted(actor, TrustLevel::Manager)
                    .from_claim(claim_id)
                    .with_message("only the owner or a manager can change trust");
            }
        }

        let mut next = (*claim).clone();
        let changed = changes
            .iter()
            .fold(false, |changed, change| change.apply(&mut next.trusts) || changed);
        if !changed {
            debug!(claim = %claim_id, "Trust change left the table unchanged");
            return outcome(TrustResultType::Success);
        }

        let result = self
            .commit(
                &snapshot,
                Mutation {
                    kind: ClaimEventKind::TrustChange,
                    previous: Some(claim),
                    next,
                    user: actor,
                    charge: None,
                },
            )
            .await;
        if result.successful() {
            info!(claim = %claim_id, "Trust updated");
            return outcome(TrustResultType::Success);
        }
        let result_type = match result.result_type() {
            ClaimResultType::ClaimEventCancelled => TrustResultType::ClaimEventCancelled,
            _ => TrustResultType::Failure,
        };
        outcome(result_type).with_message(
            result
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| result.result_type().to_string()),
        )
    }

    pub async fn add_user_trust(&self, claim: ClaimId, user: UserId, level: TrustLevel) -> TrustResult {
        self.apply_trust(claim, None, vec![TrustChange::Set(TrustTarget::User(user), level)])
            .await
    }

    /// Grant `level` to every user, all or nothing
    pub async fn add_user_trusts(&self, claim: ClaimId, users: &[UserId], level: TrustLevel) -> TrustResult {
        let changes = users
            .iter()
            .map(|user| TrustChange::Set(TrustTarget::User(*user), level))
            .collect();
        self.apply_trust(claim, None, changes).await
    }

    pub async fn remove_user_trust(&self, claim: ClaimId, user: UserId) -> TrustResult {
        self.apply_trust(claim, None, vec![TrustChange::Remove(TrustTarget::User(user))])
            .await
    }

    pub async fn remove_user_trusts(&self, claim: ClaimId, users: &[UserId]) -> TrustResult {
        let changes = users
            .iter()
            .map(|user| TrustChange::Remove(TrustTarget::User(*user)))
            .collect();
        self.apply_trust(claim, None, changes).await
    }

    pub async fn add_group_trust(&self, claim: ClaimId, group: &str, level: TrustLevel) -> TrustResult {
        self.apply_trust(
            claim,
            None,
            vec![TrustChange::Set(TrustTarget::Group(group.to_string()), level)],
        )
        .await
    }

    pub async fn remove_group_trust(&self, claim: ClaimId, group: &str) -> TrustResult {
        self.apply_trust(
            claim,
            None,
            vec![TrustChange::Remove(TrustTarget::Group(group.to_string()))],
        )
        .await
    }

    /// Grant a clan `level`; `NONE` records an explicit clan deny
    pub async fn add_clan_trust(&self, claim: ClaimId, clan: &str, level: TrustLevel) -> TrustResult {
        self.apply_trust(
            claim,
            None,
            vec![TrustChange::Set(TrustTarget::Clan(clan.to_string()), level)],
        )
        .await
    }

    pub async fn remove_clan_trust(&self, claim: ClaimId, clan: &str) -> TrustResult {
        self.apply_trust(
            claim,
            None,
            vec![TrustChange::Remove(TrustTarget::Clan(clan.to_string()))],
        )
        .await
    }

    pub async fn add_public_trust(&self, claim: ClaimId, level: TrustLevel) -> TrustResult {
        self.apply_trust(claim, None, vec![TrustChange::Set(TrustTarget::public(), level)])
            .await
    }

    pub async fn remove_all_trust(&self, claim: ClaimId) -> TrustResult {
        self.apply_trust(claim, None, vec![TrustChange::Clear]).await
    }
}

fn integrity_failure(e: IntegrityError) -> ClaimResult {
    error!(error = %e, "World data failed an integrity check");
    ClaimResult::failure(ClaimResultType::Failure, e.to_string())
}

fn economy_failure(error: EconomyError, fallback: ClaimResultType) -> ClaimResult {
    let result_type = match &error {
        EconomyError::AccountNotFound(_) => ClaimResultType::EconomyAccountNotFound,
        EconomyError::InsufficientFunds { .. } => ClaimResultType::EconomyNotEnoughFunds,
        EconomyError::Transaction(_) => fallback,
    };
    ClaimResult::failure(result_type, error.to_string())
}

fn overlapping(other: &Claim) -> ClaimResult {
    ClaimResult::failure(
        ClaimResultType::OverlappingClaim,
        format!("claim would overlap claim {}", other.id()),
    )
}

/// `id` and all of its ancestors
fn ancestry(snapshot: &WorldSnapshot, id: ClaimId) -> Result<HashSet<ClaimId>, ClaimResult> {
    let mut ids: HashSet<ClaimId> = snapshot
        .get_parents(id, true)
        .map_err(integrity_failure)?
        .iter()
        .map(|claim| claim.id())
        .collect();
    ids.insert(id);
    Ok(ids)
}

/// First indexed claim intersecting `claim` that is not in `related`
fn first_overlap(
    snapshot: &WorldSnapshot,
    claim: &Claim,
    related: &HashSet<ClaimId>,
) -> Option<Arc<Claim>> {
    snapshot
        .candidates_overlapping(claim.bounds(), claim.is_cuboid())
        .into_iter()
        .find(|other| other.id() != claim.id() && !related.contains(&other.id()))
        .cloned()
}

/// Minimum and maximum dimensions. Height is checked for cuboids only.
fn check_size(limits: &ClaimLimits, bounds: &Bounds, cuboid: bool) -> Option<ClaimResult> {
    use ClaimResultType::*;

    let mut axes = vec![(
        "x",
        bounds.width_x(),
        limits.min_x,
        limits.max_x,
        BelowMinSizeX,
        ExceedsMaxSizeX,
    )];
    if cuboid {
        axes.push((
            "y",
            bounds.height_y(),
            limits.min_y,
            limits.max_y,
            BelowMinSizeY,
            ExceedsMaxSizeY,
        ));
    }
    axes.push((
        "z",
        bounds.length_z(),
        limits.min_z,
        limits.max_z,
        BelowMinSizeZ,
        ExceedsMaxSizeZ,
    ));

    for (axis, size, min, max, below, exceeds) in axes {
        if size < min {
            return Some(ClaimResult::failure(
                below,
                format!("claim {axis} size {size} is below the minimum of {min}"),
            ));
        }
        if max > 0 && size > max {
            return Some(ClaimResult::failure(
                exceeds,
                format!("claim {axis} size {size} exceeds the maximum of {max}"),
            ));
        }
    }
    None
}

fn check_count(
    snapshot: &WorldSnapshot,
    owner: UserId,
    claim_type: ClaimType,
    limits: &ClaimLimits,
) -> Option<ClaimResult> {
    if limits.create_limit == 0 {
        return None;
    }
    let owned = snapshot
        .owned_by(owner)
        .filter(|claim| claim.claim_type() == claim_type)
        .count();
    (owned >= limits.create_limit as usize).then(|| {
        ClaimResult::failure(
            ClaimResultType::ExceedsMaxClaimLimit,
            format!("owner already has {owned} {claim_type} claims (limit {})", limits.create_limit),
        )
    })
}

fn friendly_id_taken(snapshot: &WorldSnapshot, friendly_id: &str, except: ClaimId) -> Option<ClaimResult> {
    snapshot
        .claims()
        .find(|other| {
            other.id() != except
                && other
                    .friendly_id()
                    .is_some_and(|id| id.eq_ignore_ascii_case(friendly_id))
        })
        .map(|other| {
            ClaimResult::failure(
                ClaimResultType::Failure,
                format!("friendly id '{friendly_id}' is already used by claim {}", other.id()),
            )
        })
}

//! Claim event hooks
//!
//! Hooks observe claim mutations. "Before" dispatch runs synchronously on
//! the mutating task before anything is committed; the first hook that
//! returns [`HookOutcome::Cancel`] stops the chain and vetoes the change.
//! "After" dispatch is notification only.

use crate::model::{Claim, ClaimId, UserId, WorldId};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// What happened to a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimEventKind {
    Create,
    Resize,
    ChangeType,
    Update,
    TrustChange,
    Transfer,
    Remove,
    BorderCross,
}

impl ClaimEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClaimEventKind::Create => "create",
            ClaimEventKind::Resize => "resize",
            ClaimEventKind::ChangeType => "change_type",
            ClaimEventKind::Update => "update",
            ClaimEventKind::TrustChange => "trust_change",
            ClaimEventKind::Transfer => "transfer",
            ClaimEventKind::Remove => "remove",
            ClaimEventKind::BorderCross => "border_cross",
        }
    }
}

impl fmt::Display for ClaimEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPhase {
    Before,
    After,
}

/// A claim event as seen by hooks
#[derive(Debug, Clone)]
pub struct ClaimEvent {
    pub kind: ClaimEventKind,
    pub phase: EventPhase,
    pub world: WorldId,
    /// State before the change (absent for create)
    pub previous: Option<Arc<Claim>>,
    /// State after the change (absent for remove). For border crossing this
    /// is the destination claim.
    pub current: Option<Arc<Claim>>,
    /// Acting user, when known
    pub user: Option<UserId>,
}

impl ClaimEvent {
    pub fn new(kind: ClaimEventKind, world: WorldId) -> Self {
        Self {
            kind,
            phase: EventPhase::Before,
            world,
            previous: None,
            current: None,
            user: None,
        }
    }

    pub fn previous(mut self, claim: Arc<Claim>) -> Self {
        self.previous = Some(claim);
        self
    }

    pub fn current(mut self, claim: Arc<Claim>) -> Self {
        self.current = Some(claim);
        self
    }

    pub fn user(mut self, user: Option<UserId>) -> Self {
        self.user = user;
        self
    }

    /// Id of the claim the event is about
    pub fn claim_id(&self) -> Option<ClaimId> {
        self.previous
            .as_ref()
            .or(self.current.as_ref())
            .map(|claim| claim.id())
    }

    fn after(&self) -> Self {
        Self {
            phase: EventPhase::After,
            ..self.clone()
        }
    }
}

/// What a hook wants the engine to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Continue,
    /// Veto the change (before phase only)
    Cancel { reason: String },
}

impl HookOutcome {
    pub fn cancel(reason: impl Into<String>) -> Self {
        HookOutcome::Cancel {
            reason: reason.into(),
        }
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, HookOutcome::Cancel { .. })
    }
}

/// An event listener
pub trait ClaimEventHook: Send + Sync {
    fn id(&self) -> &str;

    /// Event kinds this hook wants. Empty means all.
    fn kinds(&self) -> &[ClaimEventKind] {
        &[]
    }

    /// Lower runs first
    fn priority(&self) -> i32 {
        0
    }

    fn on_event(&self, event: &ClaimEvent) -> HookOutcome;
}

/// Closure-backed hook
pub struct FnHook<F> {
    id: String,
    kinds: Vec<ClaimEventKind>,
    priority: i32,
    handler: F,
}

impl<F> FnHook<F>
where
    F: Fn(&ClaimEvent) -> HookOutcome + Send + Sync,
{
    pub fn new(id: impl Into<String>, handler: F) -> Self {
        Self {
            id: id.into(),
            kinds: Vec::new(),
            priority: 0,
            handler,
        }
    }

    pub fn on(mut self, kind: ClaimEventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<F> ClaimEventHook for FnHook<F>
where
    F: Fn(&ClaimEvent) -> HookOutcome + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn kinds(&self) -> &[ClaimEventKind] {
        &self.kinds
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn on_event(&self, event: &ClaimEvent) -> HookOutcome {
        (self.handler)(event)
    }
}

struct RegisteredHook {
    hook: Arc<dyn ClaimEventHook>,
    enabled: bool,
}

/// Central dispatch for claim hooks
///
/// Dispatch works on a copy of the hook list, so hooks may register or
/// unregister other hooks without deadlocking.
#[derive(Default)]
pub struct EventBus {
    hooks: RwLock<Vec<RegisteredHook>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, keeping priority order (FIFO within a priority)
    pub fn register(&self, hook: Arc<dyn ClaimEventHook>) -> String {
        let id = hook.id().to_string();
        let priority = hook.priority();
        let mut hooks = crate::util::write_lock(&self.hooks, "event hooks");
        let pos = hooks
            .iter()
            .position(|h| h.hook.priority() > priority)
            .unwrap_or(hooks.len());
        hooks.insert(
            pos,
            RegisteredHook {
                hook,
                enabled: true,
            },
        );
        debug!(hook = %id, priority, "Registered claim hook");
        id
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut hooks = crate::util::write_lock(&self.hooks, "event hooks");
        let before = hooks.len();
        hooks.retain(|h| h.hook.id() != id);
        hooks.len() < before
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) {
        let mut hooks = crate::util::write_lock(&self.hooks, "event hooks");
        if let Some(h) = hooks.iter_mut().find(|h| h.hook.id() == id) {
            h.enabled = enabled;
        }
    }

    pub fn len(&self) -> usize {
        crate::util::read_lock(&self.hooks, "event hooks").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn listeners(&self, kind: ClaimEventKind) -> Vec<Arc<dyn ClaimEventHook>> {
        crate::util::read_lock(&self.hooks, "event hooks")
            .iter()
            .filter(|h| h.enabled)
            .filter(|h| h.hook.kinds().is_empty() || h.hook.kinds().contains(&kind))
            .map(|h| Arc::clone(&h.hook))
            .collect()
    }

    /// Run before-hooks. Stops at the first cancel.
    pub fn before(&self, event: &ClaimEvent) -> HookOutcome {
        for hook in self.listeners(event.kind) {
            let outcome = hook.on_event(event);
            if let HookOutcome::Cancel { reason } = &outcome {
                debug!(
                    hook = hook.id(),
                    event = %event.kind,
                    claim = ?event.claim_id(),
                    reason = %reason,
                    "Claim event cancelled by hook"
                );
                return outcome;
            }
        }
        HookOutcome::Continue
    }

    /// Run after-hooks. Cancels are ignored.
    pub fn after(&self, event: &ClaimEvent) {
        let event = event.after();
        for hook in self.listeners(event.kind) {
            if hook.on_event(&event).is_cancel() {
                warn!(hook = hook.id(), event = %event.kind, "Cancel returned from after-hook, ignoring");
            }
        }
    }
}

//! Context-scoped permission entries
//!
//! The store keeps every flag, option and trust-override entry in memory so
//! queries never touch I/O. Writes go to a [`PermissionBackend`] first and
//! are committed to memory only after the backend accepted them.

use crate::error::StorageError;
use crate::model::{
    Context, ContextSet, PermissionResult, PermissionResultType, Tristate, TrustLevel, UserId,
};
use crate::permission::flags::{Flag, FlagDefinition};
use crate::permission::options::{ClaimOption, OptionValue};
use crate::permission::pending::PendingMutation;
use crate::util::{read_lock, write_lock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Who a stored entry applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum PermissionSubject {
    /// Applies to every user
    Default,
    User(UserId),
    Group(String),
}

impl fmt::Display for PermissionSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionSubject::Default => f.write_str("default"),
            PermissionSubject::User(id) => write!(f, "user:{}", id),
            PermissionSubject::Group(name) => write!(f, "group:{}", name),
        }
    }
}

/// What a stored entry sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum PermissionKey {
    Flag(Flag),
    Option(ClaimOption),
    /// Persistent per-subject trust override (`trust.<level>`)
    Trust(TrustLevel),
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionKey::Flag(flag) => write!(f, "flag.{}", flag),
            PermissionKey::Option(option) => write!(f, "option.{}", option),
            PermissionKey::Trust(level) => write!(f, "trust.{}", level),
        }
    }
}

/// Stored payload: a tristate for flags and trust overrides, a typed value for options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredValue {
    State(Tristate),
    Option(OptionValue),
}

impl StoredValue {
    pub fn as_tristate(&self) -> Tristate {
        match self {
            StoredValue::State(value) => *value,
            StoredValue::Option(_) => Tristate::Undefined,
        }
    }

    pub fn as_option(&self) -> Option<&OptionValue> {
        match self {
            StoredValue::Option(value) => Some(value),
            StoredValue::State(_) => None,
        }
    }
}

/// A single persisted entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub subject: PermissionSubject,
    pub key: PermissionKey,
    pub contexts: ContextSet,
    pub value: StoredValue,
}

/// A pending write. `value: None` removes the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionChange {
    pub subject: PermissionSubject,
    pub key: PermissionKey,
    pub contexts: ContextSet,
    pub value: Option<StoredValue>,
}

/// Authoritative store for permission entries. May be remote.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    async fn load(&self) -> Result<Vec<PermissionEntry>, StorageError>;

    async fn write(&self, change: &PermissionChange) -> Result<(), StorageError>;

    async fn write_flag_definition(&self, _definition: &FlagDefinition) -> Result<(), StorageError> {
        Ok(())
    }

    /// Whether an in-flight write can be abandoned safely
    fn supports_cancellation(&self) -> bool {
        false
    }
}

/// In-process backend with failure and latency injection
#[derive(Debug, Default)]
pub struct MemoryPermissionBackend {
    entries: Mutex<Vec<PermissionEntry>>,
    definitions: Mutex<Vec<FlagDefinition>>,
    unavailable: AtomicBool,
    cancellable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryPermissionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StorageError::Unavailable`]
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn set_cancellable(&self, cancellable: bool) {
        self.cancellable.store(cancellable, Ordering::SeqCst);
    }

    /// Delay every write by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Entries the backend holds right now
    pub fn entries(&self) -> Vec<PermissionEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn flag_definitions(&self) -> Vec<FlagDefinition> {
        self.definitions.lock().map(|d| d.clone()).unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "permission backend offline".to_string(),
            ));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PermissionBackend for MemoryPermissionBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<PermissionEntry>, StorageError> {
        self.check_available()?;
        Ok(self.entries())
    }

    async fn write(&self, change: &PermissionChange) -> Result<(), StorageError> {
        self.simulate_latency().await;
        self.check_available()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("permission backend poisoned".to_string()))?;
        entries.retain(|e| {
            !(e.subject == change.subject
                && e.key == change.key
                && same_contexts(&e.contexts, &change.contexts))
        });
        if let Some(value) = &change.value {
            entries.push(PermissionEntry {
                subject: change.subject.clone(),
                key: change.key,
                contexts: change.contexts.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    async fn write_flag_definition(&self, definition: &FlagDefinition) -> Result<(), StorageError> {
        self.simulate_latency().await;
        self.check_available()?;
        let mut definitions = self
            .definitions
            .lock()
            .map_err(|_| StorageError::Unavailable("permission backend poisoned".to_string()))?;
        definitions.retain(|d| d.flag != definition.flag);
        definitions.push(definition.clone());
        Ok(())
    }

    fn supports_cancellation(&self) -> bool {
        self.cancellable.load(Ordering::SeqCst)
    }
}

/// Order-insensitive context set equality
pub(crate) fn same_contexts(a: &ContextSet, b: &ContextSet) -> bool {
    a.len() == b.len() && a.is_subset_of(b)
}

type EntryMap = HashMap<(PermissionSubject, PermissionKey), Vec<(ContextSet, StoredValue)>>;

/// In-memory view of every entry plus the backend it mirrors
pub struct PermissionStore {
    entries: RwLock<EntryMap>,
    backend: Arc<dyn PermissionBackend>,
    /// Serializes backend-write-then-commit so commits land in submit order
    writer: tokio::sync::Mutex<()>,
}

impl PermissionStore {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            backend,
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn PermissionBackend> {
        &self.backend
    }

    /// Replace the in-memory view with the backend's contents
    pub async fn reload(&self) -> Result<usize, StorageError> {
        let loaded = self.backend.load().await?;
        let count = loaded.len();
        let mut map = EntryMap::new();
        for entry in loaded {
            insert_entry(&mut map, entry.subject, entry.key, entry.contexts, entry.value);
        }
        *write_lock(&self.entries, "permission entries") = map;
        debug!(backend = self.backend.name(), entries = count, "Loaded permission entries");
        Ok(count)
    }

    /// Most specific entry for `subject`/`key` carrying `tier` whose contexts
    /// are all present in `query` (plus `tier`). More contexts win; among
    /// equally specific entries the later one wins.
    pub fn lookup(
        &self,
        subject: &PermissionSubject,
        key: PermissionKey,
        query: &ContextSet,
        tier: &Context,
    ) -> Option<StoredValue> {
        let entries = read_lock(&self.entries, "permission entries");
        let candidates = entries.get(&(subject.clone(), key))?;
        let mut best: Option<(usize, &StoredValue)> = None;
        for (contexts, value) in candidates {
            if !contexts.contains(tier) {
                continue;
            }
            let matches = contexts.iter().all(|c| c == tier || query.contains(c));
            if !matches {
                continue;
            }
            if best.is_none_or(|(len, _)| contexts.len() >= len) {
                best = Some((contexts.len(), value));
            }
        }
        best.map(|(_, value)| value.clone())
    }

    /// Value stored under exactly `contexts`
    pub fn exact(
        &self,
        subject: &PermissionSubject,
        key: PermissionKey,
        contexts: &ContextSet,
    ) -> Option<StoredValue> {
        let entries = read_lock(&self.entries, "permission entries");
        entries.get(&(subject.clone(), key)).and_then(|candidates| {
            candidates
                .iter()
                .find(|(stored, _)| same_contexts(stored, contexts))
                .map(|(_, value)| value.clone())
        })
    }

    /// All entries for a subject
    pub fn entries_for(&self, subject: &PermissionSubject) -> Vec<PermissionEntry> {
        let entries = read_lock(&self.entries, "permission entries");
        entries
            .iter()
            .filter(|((s, _), _)| s == subject)
            .flat_map(|((s, key), values)| {
                values.iter().map(move |(contexts, value)| PermissionEntry {
                    subject: s.clone(),
                    key: *key,
                    contexts: contexts.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    fn commit(&self, change: PermissionChange) {
        let mut entries = write_lock(&self.entries, "permission entries");
        let slot = (change.subject.clone(), change.key);
        if let Some(list) = entries.get_mut(&slot) {
            list.retain(|(contexts, _)| !same_contexts(contexts, &change.contexts));
        }
        match change.value {
            Some(value) => insert_entry(&mut entries, change.subject, change.key, change.contexts, value),
            None => {
                if entries.get(&slot).is_some_and(Vec::is_empty) {
                    entries.remove(&slot);
                }
            }
        }
    }

    /// Write to the backend, then commit to memory. Runs on a spawned task.
    pub fn submit(self: &Arc<Self>, change: PermissionChange) -> PendingMutation {
        let store = Arc::clone(self);
        let cancellable = self.backend.supports_cancellation();
        PendingMutation::spawn(cancellable, move |token| async move {
            let _writer = store.writer.lock().await;
            let write = store.backend.write(&change);
            let outcome = match race_cancel(&token, cancellable, write).await {
                Some(outcome) => outcome,
                None => {
                    debug!(subject = %change.subject, key = %change.key, "Permission write cancelled");
                    return PermissionResult::failure(PermissionResultType::Cancelled, "cancelled");
                }
            };
            match outcome {
                Ok(()) => {
                    debug!(
                        subject = %change.subject,
                        key = %change.key,
                        contexts = %change.contexts,
                        removed = change.value.is_none(),
                        "Committed permission entry"
                    );
                    store.commit(change);
                    PermissionResult::success()
                }
                Err(e) => {
                    warn!(backend = store.backend.name(), error = %e, "Permission write failed");
                    PermissionResult::failure(PermissionResultType::Failure, e.to_string())
                }
            }
        })
    }

    /// Persist a flag definition, then hand it to `apply`
    pub(crate) fn submit_definition<F>(self: &Arc<Self>, definition: FlagDefinition, apply: F) -> PendingMutation
    where
        F: FnOnce(FlagDefinition) + Send + 'static,
    {
        let store = Arc::clone(self);
        let cancellable = self.backend.supports_cancellation();
        PendingMutation::spawn(cancellable, move |token| async move {
            let _writer = store.writer.lock().await;
            let write = store.backend.write_flag_definition(&definition);
            match race_cancel(&token, cancellable, write).await {
                None => PermissionResult::failure(PermissionResultType::Cancelled, "cancelled"),
                Some(Ok(())) => {
                    debug!(flag = %definition.flag, "Committed flag definition");
                    apply(definition);
                    PermissionResult::success()
                }
                Some(Err(e)) => {
                    warn!(flag = %definition.flag, error = %e, "Flag definition write failed");
                    PermissionResult::failure(PermissionResultType::Failure, e.to_string())
                }
            }
        })
    }
}

async fn race_cancel<F, T>(token: &CancellationToken, cancellable: bool, work: F) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    if !cancellable {
        return Some(work.await);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = work => Some(out),
    }
}

fn insert_entry(
    map: &mut EntryMap,
    subject: PermissionSubject,
    key: PermissionKey,
    contexts: ContextSet,
    value: StoredValue,
) {
    let list = map.entry((subject, key)).or_default();
    list.retain(|(stored, _)| !same_contexts(stored, &contexts));
    list.push((contexts, value));
}

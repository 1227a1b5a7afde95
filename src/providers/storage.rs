//! Claim persistence backends
//!
//! The engine writes through [`ClaimStorage`] before publishing a change, so
//! a failed write never becomes visible to readers.
//!
//! The JSON backend keeps one file per claim:
//!
//! ```text
//! <root>/
//! ├── <world-id>/
//! │   ├── <claim-id>.json
//! │   └── ...
//! └── ...
//! ```

use crate::error::{StorageError, StorageResult};
use crate::model::{Claim, ClaimId, WorldId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tracing::{debug, warn};

/// Durable claim store
#[async_trait]
pub trait ClaimStorage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Worlds that have stored claims
    async fn worlds(&self) -> StorageResult<Vec<WorldId>>;

    async fn load_world(&self, world: WorldId) -> StorageResult<Vec<Claim>>;

    async fn save_claim(&self, claim: &Claim) -> StorageResult<()>;

    async fn delete_claim(&self, world: WorldId, claim: ClaimId) -> StorageResult<()>;
}

/// Volatile storage with failure injection
#[derive(Debug, Default)]
pub struct MemoryStorage {
    worlds: Mutex<HashMap<WorldId, HashMap<ClaimId, Claim>>>,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Stored copy of a claim
    pub fn get(&self, world: WorldId, claim: ClaimId) -> Option<Claim> {
        self.worlds
            .lock()
            .ok()?
            .get(&world)
            .and_then(|claims| claims.get(&claim))
            .cloned()
    }

    pub fn len(&self, world: WorldId) -> usize {
        self.worlds
            .lock()
            .map(|w| w.get(&world).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage offline".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<WorldId, HashMap<ClaimId, Claim>>>> {
        self.worlds
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage poisoned".to_string()))
    }
}

#[async_trait]
impl ClaimStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn worlds(&self) -> StorageResult<Vec<WorldId>> {
        Ok(self.lock()?.keys().copied().collect())
    }

    async fn load_world(&self, world: WorldId) -> StorageResult<Vec<Claim>> {
        self.check_available()?;
        Ok(self
            .lock()?
            .get(&world)
            .map(|claims| claims.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_claim(&self, claim: &Claim) -> StorageResult<()> {
        self.check_available()?;
        self.lock()?
            .entry(claim.world())
            .or_default()
            .insert(claim.id(), claim.clone());
        Ok(())
    }

    async fn delete_claim(&self, world: WorldId, claim: ClaimId) -> StorageResult<()> {
        self.check_available()?;
        let mut worlds = self.lock()?;
        let removed = worlds.get_mut(&world).and_then(|claims| claims.remove(&claim));
        match removed {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound { world, claim }),
        }
    }
}

/// One pretty-printed JSON file per claim
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    root: PathBuf,
}

impl JsonFileStorage {
    /// Create the storage, expanding `~` and creating the root directory
    pub fn new(root: impl AsRef<str>) -> StorageResult<Self> {
        let root = PathBuf::from(shellexpand::tilde(root.as_ref()).as_ref());
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn world_dir(&self, world: WorldId) -> PathBuf {
        self.root.join(world.to_string())
    }

    fn claim_path(&self, world: WorldId, claim: ClaimId) -> PathBuf {
        self.world_dir(world).join(format!("{claim}.json"))
    }

    fn temp_path(&self, world: WorldId, claim: ClaimId) -> PathBuf {
        self.world_dir(world).join(format!(".{claim}.json.tmp"))
    }
}

#[async_trait]
impl ClaimStorage for JsonFileStorage {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn worlds(&self) -> StorageResult<Vec<WorldId>> {
        let mut worlds = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(world) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                worlds.push(world);
            }
        }
        Ok(worlds)
    }

    async fn load_world(&self, world: WorldId) -> StorageResult<Vec<Claim>> {
        let dir = self.world_dir(world);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut claims = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension() != Some(std::ffi::OsStr::new("json")) {
                continue;
            }
            // Leftover temp files from an interrupted write
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
            {
                continue;
            }
            let json = fs::read_to_string(&path).await?;
            let claim: Claim = serde_json::from_str(&json).inspect_err(|e| {
                warn!(path = %path.display(), error = %e, "Unreadable claim file");
            })?;
            claims.push(claim);
        }
        debug!(world = %world, claims = claims.len(), "Loaded claims from disk");
        Ok(claims)
    }

    async fn save_claim(&self, claim: &Claim) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(claim)?;
        fs::create_dir_all(self.world_dir(claim.world())).await?;
        let path = self.claim_path(claim.world(), claim.id());
        let temp_path = self.temp_path(claim.world(), claim.id());

        // Write then rename so readers never see a partial file
        fs::write(&temp_path, json).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn delete_claim(&self, world: WorldId, claim: ClaimId) -> StorageResult<()> {
        let path = self.claim_path(world, claim);
        if !path.exists() {
            return Err(StorageError::NotFound { world, claim });
        }
        fs::remove_file(&path).await?;
        Ok(())
    }
}

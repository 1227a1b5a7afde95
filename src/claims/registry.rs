//! World registry
//!
//! Loads worlds from storage, creates the wilderness for new worlds and
//! hands out one [`ClaimManager`] per world.

use crate::claims::manager::{ClaimManager, ManagerSettings};
use crate::claims::WorldSnapshot;
use crate::config::AppConfig;
use crate::error::Result;
use crate::model::{BlockPos, Claim, ClaimId, UserId, WorldId};
use crate::providers::{EventBus, Providers};
use crate::util::{read_lock, write_lock};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub struct ClaimRegistry {
    providers: Providers,
    settings: ManagerSettings,
    worlds: RwLock<HashMap<WorldId, Arc<ClaimManager>>>,
    /// Serializes world loads so a world is read from storage once
    loading: Mutex<()>,
}

impl ClaimRegistry {
    pub fn new(config: &AppConfig, providers: Providers) -> Self {
        Self {
            providers,
            settings: ManagerSettings {
                economy_mode: config.engine.economy_mode,
                expiration: config.expiration.clone(),
            },
            worlds: RwLock::new(HashMap::new()),
            loading: Mutex::new(()),
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.providers.events
    }

    /// Load a world, creating and saving its wilderness if storage has none.
    /// A corrupt claim tree is an error, not a partial load.
    #[instrument(skip(self))]
    pub async fn load_world(&self, world: WorldId) -> Result<Arc<ClaimManager>> {
        if let Some(manager) = self.claim_manager(world) {
            return Ok(manager);
        }
        let _loading = self.loading.lock().await;
        if let Some(manager) = self.claim_manager(world) {
            return Ok(manager);
        }

        let mut claims = self.providers.storage.load_world(world).await?;
        if !claims.iter().any(Claim::is_wilderness) {
            let wilderness = Claim::wilderness(world);
            self.providers.storage.save_claim(&wilderness).await?;
            info!(world = %world, wilderness = %wilderness.id(), "Created wilderness for new world");
            claims.push(wilderness);
        }
        let count = claims.len() - 1;
        let snapshot = WorldSnapshot::from_claims(world, claims)?;
        let manager = Arc::new(ClaimManager::new(
            snapshot,
            self.providers.clone(),
            self.settings.clone(),
        ));
        write_lock(&self.worlds, "world registry").insert(world, Arc::clone(&manager));
        info!(world = %world, claims = count, "World loaded");
        Ok(manager)
    }

    /// Load every world the storage backend knows about
    pub async fn load_all(&self) -> Result<usize> {
        let worlds = self.providers.storage.worlds().await?;
        try_join_all(worlds.iter().map(|world| self.load_world(*world))).await?;
        debug!(worlds = worlds.len(), "Loaded all worlds");
        Ok(worlds.len())
    }

    pub fn claim_manager(&self, world: WorldId) -> Option<Arc<ClaimManager>> {
        read_lock(&self.worlds, "world registry").get(&world).cloned()
    }

    pub fn worlds(&self) -> Vec<WorldId> {
        read_lock(&self.worlds, "world registry").keys().copied().collect()
    }

    fn managers(&self) -> Vec<Arc<ClaimManager>> {
        read_lock(&self.worlds, "world registry").values().cloned().collect()
    }

    /// Innermost claim at `pos`, or `None` when the world is not loaded
    pub fn claim_at(&self, world: WorldId, pos: BlockPos) -> Option<Arc<Claim>> {
        self.claim_manager(world).map(|manager| manager.claim_at(pos))
    }

    /// Look a claim up in any loaded world
    pub fn get_claim(&self, id: ClaimId) -> Option<Arc<Claim>> {
        self.managers().iter().find_map(|manager| manager.get(id))
    }

    /// Every claim in a world except its wilderness
    pub fn all_claims(&self, world: WorldId) -> Vec<Arc<Claim>> {
        self.claim_manager(world)
            .map(|manager| manager.snapshot().claims().cloned().collect())
            .unwrap_or_default()
    }

    /// Claims owned by `user` across all loaded worlds
    pub fn player_claims(&self, user: UserId) -> Vec<Arc<Claim>> {
        self.managers()
            .iter()
            .flat_map(|manager| manager.snapshot().owned_by(user).cloned().collect::<Vec<_>>())
            .collect()
    }
}

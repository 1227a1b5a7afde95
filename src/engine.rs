//! Engine assembly
//!
//! Wires configuration, providers, the world registry and the permission
//! manager together. Hosts embed an [`Engine`] and call into
//! [`Engine::registry`] for claim mutations and [`Engine::permissions`] for
//! decisions.

use crate::claims::ClaimRegistry;
use crate::config::{AppConfig, StorageBackend};
use crate::error::Result;
use crate::permission::{
    FlagRegistry, MemoryPermissionBackend, OptionRegistry, PermissionBackend, PermissionManager,
    PermissionStore,
};
use crate::providers::{ClaimStorage, ConfiguredPlayerData, JsonFileStorage, MemoryStorage, Providers};
use std::sync::Arc;
use tracing::info;

pub struct Engine {
    config: AppConfig,
    registry: Arc<ClaimRegistry>,
    permissions: PermissionManager,
}

impl Engine {
    /// Assemble an engine from explicit collaborators
    pub fn new(config: AppConfig, providers: Providers, backend: Arc<dyn PermissionBackend>) -> Self {
        let registry = Arc::new(ClaimRegistry::new(&config, providers));
        let permissions = PermissionManager::new(
            Arc::clone(&registry),
            Arc::new(PermissionStore::new(backend)),
            Arc::new(FlagRegistry::from_config(&config.flags)),
            Arc::new(OptionRegistry::from_config(&config.options)),
        );
        Self {
            config,
            registry,
            permissions,
        }
    }

    /// Assemble an engine whose storage and player data come from config
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let storage: Arc<dyn ClaimStorage> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Json => Arc::new(JsonFileStorage::new(&config.storage.path)?),
        };
        let providers = Providers::in_memory()
            .with_storage(storage)
            .with_player_data(Arc::new(ConfiguredPlayerData::from_config(&config)));
        Ok(Self::new(
            config,
            providers,
            Arc::new(MemoryPermissionBackend::new()),
        ))
    }

    /// Load permission entries and every stored world
    pub async fn start(&self) -> Result<()> {
        let entries = self.permissions.store().reload().await?;
        let worlds = self.registry.load_all().await?;
        info!(worlds, entries, "Engine started");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ClaimRegistry> {
        &self.registry
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }
}

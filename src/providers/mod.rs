//! Collaborators the engine consumes
//!
//! Implementations live outside the engine; the in-process ones here back
//! tests and the diagnostic CLI.

pub mod clan;
pub mod economy;
pub mod events;
pub mod player;
pub mod storage;

pub use clan::{ClanMembership, ClanProvider, NoClans, StaticClans};
pub use economy::{EconomyProvider, MemoryEconomy};
pub use events::{
    ClaimEvent, ClaimEventHook, ClaimEventKind, EventBus, EventPhase, FnHook, HookOutcome,
};
pub use player::{ConfiguredPlayerData, PlayerDataProvider};
pub use storage::{ClaimStorage, JsonFileStorage, MemoryStorage};

use std::sync::Arc;

/// The full set of collaborators handed to the engine
#[derive(Clone)]
pub struct Providers {
    pub player_data: Arc<dyn PlayerDataProvider>,
    pub economy: Option<Arc<dyn EconomyProvider>>,
    pub storage: Arc<dyn ClaimStorage>,
    pub events: Arc<EventBus>,
    pub clans: Arc<dyn ClanProvider>,
}

impl Providers {
    /// In-memory collaborators with default player data and no economy
    pub fn in_memory() -> Self {
        Self {
            player_data: Arc::new(ConfiguredPlayerData::default()),
            economy: None,
            storage: Arc::new(MemoryStorage::new()),
            events: Arc::new(EventBus::new()),
            clans: Arc::new(NoClans),
        }
    }

    pub fn with_player_data(mut self, player_data: Arc<dyn PlayerDataProvider>) -> Self {
        self.player_data = player_data;
        self
    }

    pub fn with_economy(mut self, economy: Arc<dyn EconomyProvider>) -> Self {
        self.economy = Some(economy);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ClaimStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clans(mut self, clans: Arc<dyn ClanProvider>) -> Self {
        self.clans = clans;
        self
    }
}

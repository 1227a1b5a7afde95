//! Player data: limits, claim-block balances and economy rates

use crate::config::{AppConfig, ClaimLimits, LimitsConfig};
use crate::model::{ClaimType, UserId};
use crate::util::{read_lock, write_lock};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-player limits and balances consulted during create, resize and transfer
pub trait PlayerDataProvider: Send + Sync {
    /// Size and count limits for `claim_type`
    fn limits(&self, user: UserId, claim_type: ClaimType) -> ClaimLimits;

    /// Total claim blocks the player has accrued (before spending)
    fn claim_blocks(&self, user: UserId) -> i64;

    /// Currency per claim block in economy mode
    fn economy_block_cost(&self, user: UserId) -> f64;

    /// Share of the purchase price refunded when a claim is removed
    fn economy_return_rate(&self, user: UserId) -> f64;
}

/// Player data seeded from configuration, with adjustable balances
#[derive(Debug)]
pub struct ConfiguredPlayerData {
    limits: LimitsConfig,
    initial_claim_blocks: i64,
    block_cost: f64,
    return_rate: f64,
    balances: RwLock<HashMap<UserId, i64>>,
    overrides: RwLock<HashMap<(UserId, ClaimType), ClaimLimits>>,
}

impl ConfiguredPlayerData {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            limits: config.limits.clone(),
            initial_claim_blocks: config.player.initial_claim_blocks,
            block_cost: config.engine.economy_block_cost,
            return_rate: config.engine.economy_return_rate,
            balances: RwLock::new(HashMap::new()),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Replace a player's accrued claim blocks
    pub fn set_claim_blocks(&self, user: UserId, blocks: i64) {
        write_lock(&self.balances, "player balances").insert(user, blocks);
    }

    pub fn add_claim_blocks(&self, user: UserId, delta: i64) {
        let mut balances = write_lock(&self.balances, "player balances");
        let entry = balances.entry(user).or_insert(self.initial_claim_blocks);
        *entry = entry.saturating_add(delta);
    }

    /// Per-player limits taking precedence over the configured ones
    pub fn set_limits(&self, user: UserId, claim_type: ClaimType, limits: ClaimLimits) {
        write_lock(&self.overrides, "player limits").insert((user, claim_type), limits);
    }
}

impl Default for ConfiguredPlayerData {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl PlayerDataProvider for ConfiguredPlayerData {
    fn limits(&self, user: UserId, claim_type: ClaimType) -> ClaimLimits {
        read_lock(&self.overrides, "player limits")
            .get(&(user, claim_type))
            .copied()
            .unwrap_or_else(|| self.limits.for_type(claim_type))
    }

    fn claim_blocks(&self, user: UserId) -> i64 {
        read_lock(&self.balances, "player balances")
            .get(&user)
            .copied()
            .unwrap_or(self.initial_claim_blocks)
    }

    fn economy_block_cost(&self, _user: UserId) -> f64 {
        self.block_cost
    }

    fn economy_return_rate(&self, _user: UserId) -> f64 {
        self.return_rate
    }
}

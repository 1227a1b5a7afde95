//! Configuration types for claimguard
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::model::ClaimType;
use crate::permission::options::OptionValue;
use serde::Deserialize;
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine-wide behaviour
    pub engine: EngineConfig,

    /// Size and count limits per claim type
    pub limits: LimitsConfig,

    /// Defaults for player data
    pub player: PlayerConfig,

    /// Claim expiration
    pub expiration: ExpirationConfig,

    /// Persistence backend
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-flag default overrides, keyed by flag name (e.g. `block-break`)
    pub flags: HashMap<String, FlagConfig>,

    /// Per-option default overrides, keyed by option name
    pub options: HashMap<String, OptionConfig>,
}

/// Engine-wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Charge currency instead of claim blocks
    pub economy_mode: bool,

    /// Currency cost per claim block in economy mode
    pub economy_block_cost: f64,

    /// Fraction of the cost refunded when a claim is deleted in economy mode
    pub economy_return_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            economy_mode: false,
            economy_block_cost: 1.0,
            economy_return_rate: 0.5,
        }
    }
}

/// Size and count limits for one claim type. A max of 0 means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClaimLimits {
    pub min_x: i64,
    pub min_y: i64,
    pub min_z: i64,
    pub max_x: i64,
    pub max_y: i64,
    pub max_z: i64,
    /// Maximum number of claims of this type per owner (0 = unlimited)
    pub create_limit: u32,
}

impl ClaimLimits {
    /// No limits at all
    pub const fn unlimited() -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            min_z: 0,
            max_x: 0,
            max_y: 0,
            max_z: 0,
            create_limit: 0,
        }
    }
}

impl Default for ClaimLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Limits per claim type
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub basic: ClaimLimits,
    pub town: ClaimLimits,
    pub subdivision: ClaimLimits,
}

impl LimitsConfig {
    /// Limits that apply to a claim type. Admin and wilderness are unlimited.
    pub fn for_type(&self, claim_type: ClaimType) -> ClaimLimits {
        match claim_type {
            ClaimType::Basic => self.basic,
            ClaimType::Town => self.town,
            ClaimType::Subdivision => self.subdivision,
            ClaimType::Admin | ClaimType::Wilderness => ClaimLimits::unlimited(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            basic: ClaimLimits {
                min_x: 5,
                min_y: 5,
                min_z: 5,
                max_x: 0,
                max_y: 0,
                max_z: 0,
                create_limit: 0,
            },
            town: ClaimLimits {
                min_x: 32,
                min_y: 32,
                min_z: 32,
                ..ClaimLimits::unlimited()
            },
            subdivision: ClaimLimits::unlimited(),
        }
    }
}

/// Defaults for player data
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Claim blocks every player starts with
    pub initial_claim_blocks: i64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            initial_claim_blocks: 1000,
        }
    }
}

/// Claim expiration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    pub enabled: bool,
    /// Days of owner inactivity before a basic claim expires (0 = never)
    pub basic_days: u32,
    /// Days of owner inactivity before a town expires (0 = never)
    pub town_days: u32,
}

impl ExpirationConfig {
    /// Expiration window for a top-level claim type, if it expires at all
    pub fn days_for(&self, claim_type: ClaimType) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let days = match claim_type {
            ClaimType::Basic => self.basic_days,
            ClaimType::Town => self.town_days,
            _ => 0,
        };
        (days > 0).then_some(days)
    }
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            basic_days: 60,
            town_days: 90,
        }
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-memory storage
    #[default]
    Memory,
    /// One JSON file per claim
    Json,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Data directory for the json backend (tilde-expanded)
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "~/.local/share/claimguard".to_string(),
        }
    }
}

/// Per-flag default overrides. Unset fields keep the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlagConfig {
    pub wilderness: Option<bool>,
    pub admin: Option<bool>,
    pub basic: Option<bool>,
    pub subdivision: Option<bool>,
    pub town: Option<bool>,

    /// Value used when resolution ends UNDEFINED
    pub fallback: Option<bool>,
}

impl FlagConfig {
    pub fn for_type(&self, claim_type: ClaimType) -> Option<bool> {
        match claim_type {
            ClaimType::Wilderness => self.wilderness,
            ClaimType::Admin => self.admin,
            ClaimType::Basic => self.basic,
            ClaimType::Subdivision => self.subdivision,
            ClaimType::Town => self.town,
        }
    }
}

/// Per-option default override
#[derive(Debug, Clone, Deserialize)]
pub struct OptionConfig {
    pub default: OptionValue,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}

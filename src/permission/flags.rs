//! Flag catalog
//!
//! A flag is a named boolean capability gate. Each flag carries the trust
//! level that grants it implicitly, a default value per claim type and a
//! fallback used when the whole resolution ladder ends UNDEFINED.

use crate::config::FlagConfig;
use crate::error::ValidationError;
use crate::model::{ClaimType, Tristate, TrustLevel};
use crate::util::read_lock;
use crate::util::write_lock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::debug;

macro_rules! flags {
    ($($variant:ident => $name:literal, $trust:expr, [$w:literal, $a:literal, $b:literal, $s:literal, $t:literal];)*) => {
        /// Protected action
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum Flag {
            $($variant,)*
        }

        impl Flag {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Flag::$variant => $name,)*
                }
            }

            pub fn all() -> &'static [Flag] {
                &[$(Flag::$variant,)*]
            }

            /// Trust level that grants this flag implicitly, if any
            pub const fn required_trust(&self) -> Option<TrustLevel> {
                match self {
                    $(Flag::$variant => $trust,)*
                }
            }

            /// Built-in defaults indexed as wilderness, admin, basic, subdivision, town
            const fn builtin_defaults(&self) -> [bool; 5] {
                match self {
                    $(Flag::$variant => [$w, $a, $b, $s, $t],)*
                }
            }
        }
    };
}

const BUILDER: Option<TrustLevel> = Some(TrustLevel::Builder);
const CONTAINER: Option<TrustLevel> = Some(TrustLevel::Container);
const ACCESSOR: Option<TrustLevel> = Some(TrustLevel::Accessor);
const OPEN: Option<TrustLevel> = None;

flags! {
    BlockBreak => "block-break", BUILDER, [true, false, false, false, false];
    BlockPlace => "block-place", BUILDER, [true, false, false, false, false];
    BlockModify => "block-modify", BUILDER, [true, false, false, false, false];
    BlockGrow => "block-grow", OPEN, [true, true, true, true, true];
    BlockSpread => "block-spread", OPEN, [true, true, true, true, true];
    CollideBlock => "collide-block", OPEN, [true, true, true, true, true];
    CollideEntity => "collide-entity", OPEN, [true, true, true, true, true];
    CommandExecute => "command-execute", OPEN, [true, true, true, true, true];
    CommandExecutePvp => "command-execute-pvp", OPEN, [true, true, true, true, true];
    EnterClaim => "enter-claim", OPEN, [true, true, true, true, true];
    ExitClaim => "exit-claim", OPEN, [true, true, true, true, true];
    EntityDamage => "entity-damage", BUILDER, [true, false, false, false, false];
    EntityRiding => "entity-riding", ACCESSOR, [true, false, false, false, false];
    EntitySpawn => "entity-spawn", OPEN, [true, true, true, true, true];
    EntityTeleportFrom => "entity-teleport-from", OPEN, [true, true, true, true, true];
    EntityTeleportTo => "entity-teleport-to", OPEN, [true, true, true, true, true];
    ExplosionBlock => "explosion-block", OPEN, [true, false, false, false, false];
    ExplosionEntity => "explosion-entity", OPEN, [true, false, false, false, false];
    InteractBlockPrimary => "interact-block-primary", BUILDER, [true, false, false, false, false];
    InteractBlockSecondary => "interact-block-secondary", ACCESSOR, [true, false, false, false, false];
    InteractEntityPrimary => "interact-entity-primary", BUILDER, [true, false, false, false, false];
    InteractEntitySecondary => "interact-entity-secondary", ACCESSOR, [true, false, false, false, false];
    InteractInventory => "interact-inventory", CONTAINER, [true, false, false, false, false];
    InteractInventoryClick => "interact-inventory-click", CONTAINER, [true, false, false, false, false];
    InteractItemPrimary => "interact-item-primary", OPEN, [true, true, true, true, true];
    InteractItemSecondary => "interact-item-secondary", OPEN, [true, true, true, true, true];
    ItemDrop => "item-drop", OPEN, [true, true, true, true, true];
    ItemPickup => "item-pickup", OPEN, [true, true, true, true, true];
    ItemSpawn => "item-spawn", OPEN, [true, true, true, true, true];
    ItemUse => "item-use", OPEN, [true, true, true, true, true];
    LeafDecay => "leaf-decay", OPEN, [true, true, true, true, true];
    LiquidFlow => "liquid-flow", OPEN, [true, true, true, true, true];
    PortalUse => "portal-use", OPEN, [true, true, true, true, true];
    ProjectileImpactBlock => "projectile-impact-block", BUILDER, [true, false, false, false, false];
    ProjectileImpactEntity => "projectile-impact-entity", BUILDER, [true, false, false, false, false];
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flag::all()
            .iter()
            .copied()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownFlag(s.to_string()))
    }
}

/// Effective definition of a flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub flag: Flag,
    pub required_trust: Option<TrustLevel>,
    /// Default per claim type. A missing type resolves UNDEFINED.
    pub defaults: HashMap<ClaimType, bool>,
    /// Polarity applied when resolution ends UNDEFINED
    pub fallback: bool,
}

impl FlagDefinition {
    /// Built-in definition
    pub fn builtin(flag: Flag) -> Self {
        let values = flag.builtin_defaults();
        let defaults = ClaimType::all()
            .iter()
            .copied()
            .zip(values)
            .collect::<HashMap<_, _>>();
        Self {
            flag,
            required_trust: flag.required_trust(),
            defaults,
            // Wilderness default doubles as the fallback polarity
            fallback: values[0],
        }
    }

    /// The flag's innate default for a claim type
    pub fn default_claim_type_value(&self, claim_type: ClaimType) -> Tristate {
        self.defaults.get(&claim_type).copied().into()
    }

    fn apply_config(&mut self, config: &FlagConfig) {
        for claim_type in ClaimType::all() {
            if let Some(value) = config.for_type(*claim_type) {
                self.defaults.insert(*claim_type, value);
            }
        }
        if let Some(fallback) = config.fallback {
            self.fallback = fallback;
        }
    }
}

/// Registry of effective flag definitions
#[derive(Debug)]
pub struct FlagRegistry {
    definitions: RwLock<HashMap<Flag, Arc<FlagDefinition>>>,
}

impl FlagRegistry {
    /// Registry with built-in definitions only
    pub fn new() -> Self {
        let definitions = Flag::all()
            .iter()
            .map(|flag| (*flag, Arc::new(FlagDefinition::builtin(*flag))))
            .collect();
        Self {
            definitions: RwLock::new(definitions),
        }
    }

    /// Registry with configured overrides applied on top of the built-ins.
    /// Unknown names are skipped (the config loader rejects them earlier).
    pub fn from_config(flags: &HashMap<String, FlagConfig>) -> Self {
        let registry = Self::new();
        {
            let mut definitions = write_lock(&registry.definitions, "flag definitions");
            for (name, config) in flags {
                let Ok(flag) = name.parse::<Flag>() else {
                    continue;
                };
                let mut definition = FlagDefinition::builtin(flag);
                definition.apply_config(config);
                debug!(flag = %flag, "Applied configured flag defaults");
                definitions.insert(flag, Arc::new(definition));
            }
        }
        registry
    }

    pub fn definition(&self, flag: Flag) -> Arc<FlagDefinition> {
        let definitions = read_lock(&self.definitions, "flag definitions");
        definitions
            .get(&flag)
            .cloned()
            .unwrap_or_else(|| Arc::new(FlagDefinition::builtin(flag)))
    }

    pub(crate) fn replace(&self, definition: FlagDefinition) {
        let mut definitions = write_lock(&self.definitions, "flag definitions");
        definitions.insert(definition.flag, Arc::new(definition));
    }
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

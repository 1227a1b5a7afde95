//! Option catalog
//!
//! Options are typed, context-scoped values (limits, rates, modes). Unlike
//! flags they are never trust-gated and never coerced to booleans.

use crate::config::OptionConfig;
use crate::error::ValidationError;
use crate::model::Context;
use crate::util::{read_lock, write_lock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A typed option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl OptionValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to decimals
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Integer(v) => Some(*v as f64),
            OptionValue::Decimal(v) => Some(*v),
            OptionValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Integer(v) => write!(f, "{}", v),
            OptionValue::Decimal(v) => write!(f, "{}", v),
            OptionValue::Text(v) => f.write_str(v),
        }
    }
}

/// Value kind accepted by an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Integer,
    Decimal,
    Text,
    /// Text restricted to a fixed set of choices
    Choice(&'static [&'static str]),
}

impl OptionKind {
    /// Check that `value` has this kind
    pub fn check(&self, value: &OptionValue) -> Result<(), String> {
        match (self, value) {
            (OptionKind::Integer, OptionValue::Integer(_)) => Ok(()),
            (OptionKind::Decimal, OptionValue::Integer(_) | OptionValue::Decimal(_)) => Ok(()),
            (OptionKind::Text, OptionValue::Text(_)) => Ok(()),
            (OptionKind::Choice(choices), OptionValue::Text(v)) if choices.contains(&v.as_str()) => {
                Ok(())
            }
            (OptionKind::Choice(choices), other) => Err(format!(
                "expected one of [{}], got '{}'",
                choices.join(", "),
                other
            )),
            (kind, other) => Err(format!("expected {:?} value, got '{}'", kind, other)),
        }
    }
}

const TRISTATE_CHOICES: &[&str] = &["undefined", "true", "false"];
const GAMEMODE_CHOICES: &[&str] = &["undefined", "survival", "creative", "adventure", "spectator"];
const WEATHER_CHOICES: &[&str] = &["undefined", "clear", "downfall"];

/// Claim-type scoped options must name the claim type they apply to
const TYPE_SCOPED: &[&str] = &[Context::CLAIM_DEFAULT];
const UNSCOPED: &[&str] = &[];

macro_rules! options {
    ($($variant:ident => $name:literal, $kind:expr, $default:expr, $global:literal, $required:expr;)*) => {
        /// Named typed option
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum ClaimOption {
            $($variant,)*
        }

        impl ClaimOption {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(ClaimOption::$variant => $name,)*
                }
            }

            pub fn all() -> &'static [ClaimOption] {
                &[$(ClaimOption::$variant,)*]
            }

            pub const fn kind(&self) -> OptionKind {
                match self {
                    $(ClaimOption::$variant => $kind,)*
                }
            }

            /// Global options apply server-wide and reject claim-specific contexts
            pub const fn is_global(&self) -> bool {
                match self {
                    $(ClaimOption::$variant => $global,)*
                }
            }

            /// Context keys that every stored value must carry
            pub const fn required_contexts(&self) -> &'static [&'static str] {
                match self {
                    $(ClaimOption::$variant => $required,)*
                }
            }

            fn builtin_default(&self) -> OptionValue {
                match self {
                    $(ClaimOption::$variant => $default,)*
                }
            }
        }
    };
}

options! {
    CreateLimit => "create-limit", OptionKind::Integer, OptionValue::Integer(0), false, TYPE_SCOPED;
    Expiration => "expiration", OptionKind::Integer, OptionValue::Integer(60), false, TYPE_SCOPED;
    MinSizeX => "min-size-x", OptionKind::Integer, OptionValue::Integer(5), false, TYPE_SCOPED;
    MinSizeY => "min-size-y", OptionKind::Integer, OptionValue::Integer(5), false, TYPE_SCOPED;
    MinSizeZ => "min-size-z", OptionKind::Integer, OptionValue::Integer(5), false, TYPE_SCOPED;
    MaxSizeX => "max-size-x", OptionKind::Integer, OptionValue::Integer(0), false, TYPE_SCOPED;
    MaxSizeY => "max-size-y", OptionKind::Integer, OptionValue::Integer(0), false, TYPE_SCOPED;
    MaxSizeZ => "max-size-z", OptionKind::Integer, OptionValue::Integer(0), false, TYPE_SCOPED;
    SpawnLimit => "spawn-limit", OptionKind::Integer, OptionValue::Integer(-1), false, UNSCOPED;
    TaxRate => "tax-rate", OptionKind::Decimal, OptionValue::Decimal(0.0), false, UNSCOPED;
    Pvp => "pvp", OptionKind::Choice(TRISTATE_CHOICES), OptionValue::Text("undefined".to_string()), false, UNSCOPED;
    PlayerGamemode => "player-gamemode", OptionKind::Choice(GAMEMODE_CHOICES), OptionValue::Text("undefined".to_string()), false, UNSCOPED;
    PlayerWeather => "player-weather", OptionKind::Choice(WEATHER_CHOICES), OptionValue::Text("undefined".to_string()), false, UNSCOPED;
    PlayerCommandEnter => "player-command-enter", OptionKind::Text, OptionValue::Text(String::new()), false, UNSCOPED;
    PlayerCommandExit => "player-command-exit", OptionKind::Text, OptionValue::Text(String::new()), false, UNSCOPED;
    AbandonReturnRatio => "abandon-return-ratio", OptionKind::Decimal, OptionValue::Decimal(1.0), true, UNSCOPED;
    EconomyBlockCost => "economy-block-cost", OptionKind::Decimal, OptionValue::Decimal(0.0), true, UNSCOPED;
    InitialClaimBlocks => "initial-claim-blocks", OptionKind::Integer, OptionValue::Integer(1000), true, UNSCOPED;
}

impl fmt::Display for ClaimOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimOption {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimOption::all()
            .iter()
            .copied()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownOption(s.to_string()))
    }
}

/// Effective definition of an option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDefinition {
    pub option: ClaimOption,
    pub kind: OptionKind,
    pub default: OptionValue,
    pub is_global: bool,
    pub required_contexts: &'static [&'static str],
}

impl OptionDefinition {
    pub fn builtin(option: ClaimOption) -> Self {
        Self {
            option,
            kind: option.kind(),
            default: option.builtin_default(),
            is_global: option.is_global(),
            required_contexts: option.required_contexts(),
        }
    }
}

/// Registry of effective option definitions
#[derive(Debug)]
pub struct OptionRegistry {
    definitions: RwLock<HashMap<ClaimOption, Arc<OptionDefinition>>>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        let definitions = ClaimOption::all()
            .iter()
            .map(|option| (*option, Arc::new(OptionDefinition::builtin(*option))))
            .collect();
        Self {
            definitions: RwLock::new(definitions),
        }
    }

    /// Registry with configured defaults. Invalid entries are skipped
    /// (the config loader rejects them earlier).
    pub fn from_config(options: &HashMap<String, OptionConfig>) -> Self {
        let registry = Self::new();
        for (name, config) in options {
            let Ok(option) = name.parse::<ClaimOption>() else {
                continue;
            };
            if option.kind().check(&config.default).is_err() {
                continue;
            }
            let mut definition = OptionDefinition::builtin(option);
            definition.default = config.default.clone();
            debug!(option = %option, default = %definition.default, "Applied configured option default");
            registry.replace(definition);
        }
        registry
    }

    pub fn definition(&self, option: ClaimOption) -> Arc<OptionDefinition> {
        let definitions = read_lock(&self.definitions, "option definitions");
        definitions
            .get(&option)
            .cloned()
            .unwrap_or_else(|| Arc::new(OptionDefinition::builtin(option)))
    }

    pub(crate) fn replace(&self, definition: OptionDefinition) {
        let mut definitions = write_lock(&self.definitions, "option definitions");
        definitions.insert(definition.option, Arc::new(definition));
    }
}

impl Default for OptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

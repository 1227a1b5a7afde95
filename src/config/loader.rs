//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (CLAIMGUARD__*)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::config::types::{AppConfig, ClaimLimits, StorageBackend};
use crate::error::ConfigError;
use crate::permission::flags::Flag;
use crate::permission::options::ClaimOption;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "claimguard.toml",
    ".claimguard.toml",
    "~/.config/claimguard/config.toml",
    "/etc/claimguard/config.toml",
];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. Defaults come from serde defaults on AppConfig

    // 2. Configuration file
    if let Some(path) = config_path {
        // Explicit path provided - must exist
        let expanded = shellexpand::tilde(path);
        if !Path::new(expanded.as_ref()).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // 3. Environment variables, e.g. CLAIMGUARD__ENGINE__ECONOMY_MODE=true
    // Double underscore (__) maps to nested keys (engine.economy_mode)
    builder = builder.add_source(
        Environment::with_prefix("CLAIMGUARD")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let engine = &config.engine;
    if engine.economy_block_cost < 0.0 {
        return Err(ConfigError::Invalid {
            message: "engine.economy_block_cost must not be negative".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&engine.economy_return_rate) {
        return Err(ConfigError::Invalid {
            message: format!(
                "engine.economy_return_rate must be within 0.0..=1.0, got {}",
                engine.economy_return_rate
            ),
        });
    }

    validate_limits(&config.limits.basic, "limits.basic")?;
    validate_limits(&config.limits.town, "limits.town")?;
    validate_limits(&config.limits.subdivision, "limits.subdivision")?;

    if config.player.initial_claim_blocks < 0 {
        return Err(ConfigError::Invalid {
            message: "player.initial_claim_blocks must not be negative".to_string(),
        });
    }

    if config.storage.backend == StorageBackend::Json && config.storage.path.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "storage.path".to_string(),
        });
    }

    for name in config.flags.keys() {
        if name.parse::<Flag>().is_err() {
            return Err(ConfigError::Unknown {
                kind: "flag",
                name: name.clone(),
            });
        }
    }

    for (name, option_config) in &config.options {
        let option: ClaimOption = name.parse().map_err(|_| ConfigError::Unknown {
            kind: "option",
            name: name.clone(),
        })?;
        if let Err(reason) = option.kind().check(&option_config.default) {
            return Err(ConfigError::Invalid {
                message: format!("options.{}.default: {}", name, reason),
            });
        }
    }

    Ok(())
}

/// Validate min <= max on every bounded axis
fn validate_limits(limits: &ClaimLimits, field_path: &str) -> Result<(), ConfigError> {
    let axes = [
        ("x", limits.min_x, limits.max_x),
        ("y", limits.min_y, limits.max_y),
        ("z", limits.min_z, limits.max_z),
    ];
    for (axis, min, max) in axes {
        if min < 0 || max < 0 {
            return Err(ConfigError::Invalid {
                message: format!("{}: {} limits must not be negative", field_path, axis),
            });
        }
        if max > 0 && min > max {
            return Err(ConfigError::Invalid {
                message: format!(
                    "{}: min_{} ({}) exceeds max_{} ({})",
                    field_path, axis, min, axis, max
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_str_basic() {
        let toml = r#"
[engine]
economy_mode = true
economy_block_cost = 2.5

[limits.basic]
min_x = 3
max_x = 100
create_limit = 4
"#;

        let config = load_config_from_str(toml).unwrap();
        assert!(config.engine.economy_mode);
        assert_eq!(config.engine.economy_block_cost, 2.5);
        assert_eq!(config.limits.basic.min_x, 3);
        assert_eq!(config.limits.basic.create_limit, 4);
    }

    #[test]
    fn test_min_exceeds_max() {
        let toml = r#"
[limits.town]
min_x = 50
max_x = 10
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_unknown_flag() {
        let toml = r#"
[flags.teleport-everywhere]
basic = true
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(
            result,
            Err(ConfigError::Unknown { kind: "flag", .. })
        ));
    }

    #[test]
    fn test_option_default_kind_mismatch() {
        let toml = r#"
[options.create-limit]
default = "lots"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_return_rate_out_of_range() {
        let toml = r#"
[engine]
economy_return_rate = 1.5
"#;
        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn test_json_storage_requires_path() {
        let toml = r#"
[storage]
backend = "json"
path = ""
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }
}

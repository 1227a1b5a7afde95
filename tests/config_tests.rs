//! Configuration loading tests

use claimguard::config::{LogFormat, StorageBackend, load_config_from_str};
use claimguard::model::ClaimType;
use claimguard::permission::{ClaimOption, Flag, FlagRegistry, OptionRegistry, OptionValue};

const MINIMAL_CONFIG: &str = r#"
[engine]
economy_mode = false
"#;

const FULL_CONFIG: &str = r#"
[engine]
economy_mode = true
economy_block_cost = 0.5
economy_return_rate = 0.75

[limits.basic]
min_x = 4
min_y = 4
min_z = 4
max_x = 256
max_y = 256
max_z = 256
create_limit = 8

[limits.town]
min_x = 64
min_z = 64
create_limit = 1

[player]
initial_claim_blocks = 2500

[expiration]
enabled = true
basic_days = 30
town_days = 0

[storage]
backend = "json"
path = "/var/lib/claimguard"

[logging]
level = "debug"
format = "json"

[flags.block-break]
basic = true
fallback = false

[flags.enter-claim]
town = false

[options.tax-rate]
default = 1.5
"#;

#[test]
fn test_minimal_config() {
    let config = load_config_from_str(MINIMAL_CONFIG).unwrap();

    assert!(!config.engine.economy_mode);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.player.initial_claim_blocks, 1000);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.flags.is_empty());
}

#[test]
fn test_full_config() {
    let config = load_config_from_str(FULL_CONFIG).unwrap();

    assert!(config.engine.economy_mode);
    assert_eq!(config.engine.economy_block_cost, 0.5);
    assert_eq!(config.engine.economy_return_rate, 0.75);

    let basic = config.limits.for_type(ClaimType::Basic);
    assert_eq!(basic.min_x, 4);
    assert_eq!(basic.max_z, 256);
    assert_eq!(basic.create_limit, 8);
    assert_eq!(config.limits.for_type(ClaimType::Town).create_limit, 1);
    // Admin and wilderness claims are never limited
    assert_eq!(config.limits.for_type(ClaimType::Admin).create_limit, 0);

    assert_eq!(config.player.initial_claim_blocks, 2500);
    assert_eq!(config.expiration.days_for(ClaimType::Basic), Some(30));
    assert_eq!(config.expiration.days_for(ClaimType::Town), None);
    assert_eq!(config.storage.backend, StorageBackend::Json);
    assert_eq!(config.storage.path, "/var/lib/claimguard");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_flag_and_option_overrides_reach_registries() {
    let config = load_config_from_str(FULL_CONFIG).unwrap();

    let flags = FlagRegistry::from_config(&config.flags);
    let block_break = flags.definition(Flag::BlockBreak);
    assert_eq!(
        block_break.default_claim_type_value(ClaimType::Basic),
        claimguard::model::Tristate::True
    );
    assert!(!block_break.fallback);
    let enter = flags.definition(Flag::EnterClaim);
    assert_eq!(
        enter.default_claim_type_value(ClaimType::Town),
        claimguard::model::Tristate::False
    );
    // Unlisted flags keep their built-in definition
    assert_eq!(
        *flags.definition(Flag::ItemDrop),
        claimguard::permission::FlagDefinition::builtin(Flag::ItemDrop)
    );

    let options = OptionRegistry::from_config(&config.options);
    assert_eq!(
        options.definition(ClaimOption::TaxRate).default,
        OptionValue::Decimal(1.5)
    );
}

#[test]
fn test_unknown_flag_rejected() {
    let config_str = r#"
[flags.fly-around]
basic = true
"#;
    assert!(load_config_from_str(config_str).is_err());
}

#[test]
fn test_option_kind_mismatch_rejected() {
    let config_str = r#"
[options.create-limit]
default = "many"
"#;
    assert!(load_config_from_str(config_str).is_err());
}

#[test]
fn test_inverted_limits_rejected() {
    let config_str = r#"
[limits.basic]
min_x = 100
max_x = 10
"#;
    assert!(load_config_from_str(config_str).is_err());
}

#[test]
fn test_return_rate_out_of_range() {
    let config_str = r#"
[engine]
economy_return_rate = 1.5
"#;
    assert!(load_config_from_str(config_str).is_err());
}

#[test]
fn test_json_storage_requires_path() {
    let config_str = r#"
[storage]
backend = "json"
path = ""
"#;
    assert!(load_config_from_str(config_str).is_err());
}

#[test]
fn test_invalid_storage_backend() {
    let config_str = r#"
[storage]
backend = "postgres"
"#;
    assert!(load_config_from_str(config_str).is_err());
}

#[test]
#[serial_test::serial]
fn test_env_overrides_file() {
    use claimguard::config::load_config;
    use std::env;
    use std::fs;
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let config_path = dir.path().join("claimguard.toml");
    fs::write(
        &config_path,
        r#"
[engine]
economy_mode = false

[player]
initial_claim_blocks = 10
"#,
    )
    .unwrap();

    unsafe {
        env::set_var("CLAIMGUARD__ENGINE__ECONOMY_MODE", "true");
        env::set_var("CLAIMGUARD__PLAYER__INITIAL_CLAIM_BLOCKS", "640");
    }

    let config = load_config(Some(config_path.to_str().unwrap()));

    unsafe {
        env::remove_var("CLAIMGUARD__ENGINE__ECONOMY_MODE");
        env::remove_var("CLAIMGUARD__PLAYER__INITIAL_CLAIM_BLOCKS");
    }

    let config = config.unwrap();
    assert!(config.engine.economy_mode);
    assert_eq!(config.player.initial_claim_blocks, 640);
}

#[test]
#[serial_test::serial]
fn test_missing_explicit_config_file() {
    use claimguard::config::load_config;

    let result = load_config(Some("/nonexistent/claimguard.toml"));
    assert!(result.is_err());
}

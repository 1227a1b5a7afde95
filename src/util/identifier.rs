//! Identifier validation
//!
//! Source/target discriminators use the `namespace:name` form
//! (e.g. `minecraft:stone`, `minecraft:player`). Friendly claim ids are short
//! human-typed keys.

use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

static DISCRIMINATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_.-]+:[a-z0-9_./-]+$").expect("discriminator pattern is valid")
});

static FRIENDLY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("friendly id pattern is valid")
});

/// Check a `namespace:name` discriminator
pub fn validate_discriminator(value: &str) -> Result<(), ValidationError> {
    if DISCRIMINATOR.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::Identifier {
            value: value.to_string(),
        })
    }
}

/// Check a friendly claim identifier
pub fn validate_friendly_id(value: &str) -> Result<(), ValidationError> {
    if FRIENDLY_ID.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::FriendlyId {
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_discriminators() {
        assert!(validate_discriminator("minecraft:stone").is_ok());
        assert!(validate_discriminator("minecraft:player").is_ok());
        assert!(validate_discriminator("mod_x:blocks/ore.iron").is_ok());
    }

    #[test]
    fn test_invalid_discriminators() {
        assert!(validate_discriminator("stone").is_err());
        assert!(validate_discriminator("Minecraft:Stone").is_err());
        assert!(validate_discriminator(":stone").is_err());
        assert!(validate_discriminator("minecraft:").is_err());
    }

    #[test]
    fn test_friendly_ids() {
        assert!(validate_friendly_id("spawn-town_1").is_ok());
        assert!(validate_friendly_id("").is_err());
        assert!(validate_friendly_id("no spaces").is_err());
        assert!(validate_friendly_id(&"x".repeat(33)).is_err());
    }
}

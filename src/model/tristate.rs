//! Three-valued permission logic

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a permission lookup: allow, deny, or no applicable rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tristate {
    True,
    False,
    #[default]
    Undefined,
}

impl Tristate {
    pub const fn from_bool(value: bool) -> Self {
        if value { Tristate::True } else { Tristate::False }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Tristate::True => Some(true),
            Tristate::False => Some(false),
            Tristate::Undefined => None,
        }
    }

    pub const fn is_defined(&self) -> bool {
        !matches!(self, Tristate::Undefined)
    }

    /// Return `self` if defined, otherwise evaluate `next`
    pub fn or_else(self, next: impl FnOnce() -> Tristate) -> Tristate {
        if self.is_defined() { self } else { next() }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tristate::True => "true",
            Tristate::False => "false",
            Tristate::Undefined => "undefined",
        }
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        Tristate::from_bool(value)
    }
}

impl From<Option<bool>> for Tristate {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Tristate::Undefined, Tristate::from_bool)
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_else_short_circuits() {
        let value = Tristate::False.or_else(|| panic!("must not evaluate"));
        assert_eq!(value, Tristate::False);
        assert_eq!(Tristate::Undefined.or_else(|| Tristate::True), Tristate::True);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Tristate::from(Some(true)), Tristate::True);
        assert_eq!(Tristate::from(None), Tristate::Undefined);
        assert_eq!(Tristate::False.as_bool(), Some(false));
        assert!(!Tristate::Undefined.is_defined());
    }
}

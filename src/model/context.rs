//! Contexts scope stored permission and option entries
//!
//! An entry applies to a query when every context on the entry also appears,
//! with an equal value, in the query's context set. Extra query contexts are
//! ignored, so an entry with fewer contexts is a wider (wildcard) rule.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Context value used for the global default and global override tiers
pub const GLOBAL: &str = "global";

/// A single key/value scoping tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Context {
    pub key: String,
    pub value: String,
}

impl Context {
    /// Claim-specific scope (value: claim id)
    pub const CLAIM: &'static str = "claim";
    /// Default scope (value: claim type name or `global`)
    pub const CLAIM_DEFAULT: &'static str = "claim_default";
    /// Override scope (value: claim id, claim type name or `global`)
    pub const CLAIM_OVERRIDE: &'static str = "claim_override";
    /// Source object discriminator (`namespace:name`)
    pub const SOURCE: &'static str = "source";
    /// Target object discriminator (`namespace:name`)
    pub const TARGET: &'static str = "target";

    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check whether this context selects a claim tier (claim, default or override)
    pub fn is_tier_key(&self) -> bool {
        matches!(
            self.key.as_str(),
            Self::CLAIM | Self::CLAIM_DEFAULT | Self::CLAIM_OVERRIDE
        )
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered set of contexts. Exact duplicates are merged on insert;
/// repeated keys with different values are kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSet(Vec<Context>);

impl ContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(Context::new(key, value));
        self
    }

    pub fn insert(&mut self, context: Context) -> bool {
        if self.0.contains(&context) {
            return false;
        }
        self.0.push(context);
        true
    }

    pub fn extend<I: IntoIterator<Item = Context>>(&mut self, contexts: I) {
        for context in contexts {
            self.insert(context);
        }
    }

    pub fn contains(&self, context: &Context) -> bool {
        self.0.contains(context)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|c| c.key == key)
    }

    /// First value recorded for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// Entry-matching rule: every context here appears in `query`
    pub fn is_subset_of(&self, query: &ContextSet) -> bool {
        self.0.iter().all(|c| query.contains(c))
    }

    /// Copy without any claim tier contexts
    pub fn without_tiers(&self) -> ContextSet {
        ContextSet(self.0.iter().filter(|c| !c.is_tier_key()).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Context> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Context> for ContextSet {
    fn from_iter<T: IntoIterator<Item = Context>>(iter: T) -> Self {
        let mut set = ContextSet::new();
        set.extend(iter);
        set
    }
}

impl fmt::Display for ContextSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

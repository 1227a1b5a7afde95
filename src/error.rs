//! Error types for claimguard
//!
//! These are infrastructure errors: configuration, storage, economy and
//! integrity failures. Domain outcomes (overlaps, size limits, trust denials)
//! are never errors; they are reported through the closed result types in
//! [`crate::model::results`]. Infrastructure errors are converted into
//! `FAILURE`-family results at the engine boundary.

use crate::model::{ClaimId, WorldId};
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Economy error: {0}")]
    Economy(#[from] EconomyError),

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Unknown {kind} '{name}' in configuration")]
    Unknown { kind: &'static str, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Claim {claim} not found in world {world}")]
    NotFound { world: WorldId, claim: ClaimId },
}

/// Economy provider errors
#[derive(Error, Debug)]
pub enum EconomyError {
    #[error("No economy account for {0}")]
    AccountNotFound(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: f64, required: f64 },

    #[error("Economy transaction failed: {0}")]
    Transaction(String),
}

/// Structural invariant violations in loaded or committed claim data.
///
/// These are fatal: the affected world cannot be served until the data is
/// repaired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Parent chain of claim {0} contains a cycle")]
    ParentCycle(ClaimId),

    #[error("Claim {claim} references missing parent {parent}")]
    DanglingParent { claim: ClaimId, parent: ClaimId },

    #[error("World {0} has more than one wilderness claim")]
    DuplicateWilderness(WorldId),

    #[error("World {0} has no wilderness claim")]
    MissingWilderness(WorldId),
}

/// Input validation errors (identifiers, discriminators)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid identifier '{value}': expected namespace:name")]
    Identifier { value: String },

    #[error("Invalid friendly id '{value}'")]
    FriendlyId { value: String },

    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),

    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    #[error("Unknown claim type '{0}'")]
    UnknownClaimType(String),

    #[error("Unknown trust level '{0}'")]
    UnknownTrustLevel(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

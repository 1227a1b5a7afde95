//! Trust model
//!
//! Resolution lives in [`resolver`]; trust mutations go through
//! [`crate::claims::ClaimManager`] because they rewrite the claim.

pub mod resolver;

pub use resolver::TrustResolver;

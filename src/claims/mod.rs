//! Claim hierarchy, per-world mutation and the world registry

pub mod hierarchy;
pub mod manager;
pub mod registry;

pub use hierarchy::WorldSnapshot;
pub use manager::{ClaimManager, ClaimUpdate, ManagerSettings, TrustChange, TrustTarget};
pub use registry::ClaimRegistry;

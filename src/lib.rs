//! Claimguard
//!
//! A land-claim protection engine for block-based multiplayer worlds.
//!
//! ## Features
//!
//! - **Claim hierarchy** of wilderness, admin, basic, town and subdivision
//!   claims with overlap, size, count and claim-block validation
//! - **Spatial index** answering "which claim owns this block" from chunk
//!   buckets
//! - **Trust model** with accessor, container, builder and manager levels,
//!   groups, clans and parent inheritance
//! - **Context-scoped flags and options** resolved through claim, default
//!   and override tiers
//! - **Event hooks** that can veto any mutation before it is applied
//!
//! ## Decision order
//!
//! ```text
//! override contexts → trust → claim / parent / type / global defaults → fallback
//! ```
//!
//! ## Example Configuration
//!
//! ```toml
//! [engine]
//! economy_mode = false
//!
//! [limits.basic]
//! min_x = 5
//! max_x = 512
//! create_limit = 10
//!
//! [flags.block-break]
//! wilderness = true
//! basic = false
//! ```

pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod permission;
pub mod providers;
pub mod spatial;
pub mod trust;
pub mod util;

// Re-export main types
pub use claims::{ClaimManager, ClaimRegistry};
pub use config::{AppConfig, load_config};
pub use engine::Engine;
pub use error::{AppError, Result};
pub use permission::PermissionManager;

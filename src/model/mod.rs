//! Domain model
//!
//! Identifiers, bounds, claims, trust, contexts and the typed result records
//! shared by every engine component.

pub mod bounds;
pub mod builder;
pub mod claim;
pub mod context;
pub mod ids;
pub mod results;
pub mod tristate;
pub mod trust;

pub use bounds::{BlockPos, Bounds, ChunkKey};
pub use builder::{ClaimBuilder, ClaimDraft};
pub use claim::{Claim, ClaimEconomyData, ClaimType, FlagResolvable, SpatialEntity, Trustable};
pub use context::{Context, ContextSet, GLOBAL};
pub use ids::{ClaimId, UserId, WorldId};
pub use results::{
    ClaimResult, ClaimResultType, PermissionResult, PermissionResultType, ResolutionSource,
    TrustResult, TrustResultType,
};
pub use tristate::Tristate;
pub use trust::{Subject, SubjectKind, TrustEntry, TrustLevel, TrustTable};

//! Claim entity and claim types
//!
//! A [`Claim`] is an immutable value once published in a world snapshot.
//! Mutations go through [`crate::claims::ClaimManager`], which clones the
//! claim, edits the copy, persists it and swaps it in atomically.

use crate::error::ValidationError;
use crate::model::bounds::{BlockPos, Bounds};
use crate::model::context::{Context, GLOBAL};
use crate::model::ids::{ClaimId, UserId, WorldId};
use crate::model::trust::TrustTable;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Horizontal extent used for the wilderness claim of every world
pub const WORLD_BORDER: i32 = 30_000_000;
/// Vertical extent used for the wilderness claim of every world
pub const WORLD_MIN_Y: i32 = -64;
pub const WORLD_MAX_Y: i32 = 320;

/// Claim type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Wilderness,
    Admin,
    Basic,
    Subdivision,
    Town,
}

impl ClaimType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Wilderness => "wilderness",
            ClaimType::Admin => "admin",
            ClaimType::Basic => "basic",
            ClaimType::Subdivision => "subdivision",
            ClaimType::Town => "town",
        }
    }

    pub fn all() -> &'static [ClaimType] {
        &[
            ClaimType::Wilderness,
            ClaimType::Admin,
            ClaimType::Basic,
            ClaimType::Subdivision,
            ClaimType::Town,
        ]
    }

    /// Whether a claim of this type may sit directly under `parent`.
    /// Top-level claims are children of the wilderness.
    pub const fn allowed_under(&self, parent: ClaimType) -> bool {
        matches!(
            (parent, self),
            (ClaimType::Wilderness, ClaimType::Admin)
                | (ClaimType::Wilderness, ClaimType::Basic)
                | (ClaimType::Wilderness, ClaimType::Town)
                | (ClaimType::Admin, ClaimType::Basic)
                | (ClaimType::Admin, ClaimType::Subdivision)
                | (ClaimType::Town, ClaimType::Basic)
                | (ClaimType::Town, ClaimType::Subdivision)
                | (ClaimType::Basic, ClaimType::Subdivision)
        )
    }

    /// Types that must carry an owner
    pub const fn requires_owner(&self) -> bool {
        matches!(
            self,
            ClaimType::Basic | ClaimType::Subdivision | ClaimType::Town
        )
    }

    /// Types whose top-level instances consume claim blocks
    pub const fn consumes_claim_blocks(&self) -> bool {
        matches!(self, ClaimType::Basic | ClaimType::Town)
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimType::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownClaimType(s.to_string()))
    }
}

/// Optional sale/rent record attached to a claim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimEconomyData {
    pub for_sale: bool,
    pub sale_price: f64,
    pub for_rent: bool,
    pub rent_rate: f64,
    pub renter: Option<UserId>,
}

/// A spatially bounded, owned region with its own trust configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub(crate) id: ClaimId,
    pub(crate) world: WorldId,
    pub(crate) claim_type: ClaimType,
    pub(crate) cuboid: bool,
    pub(crate) bounds: Bounds,
    pub(crate) owner: Option<UserId>,
    pub(crate) parent: Option<ClaimId>,
    pub(crate) resizable: bool,
    pub(crate) inherit_parent: bool,
    pub(crate) deny_messages: bool,
    pub(crate) expiration: bool,
    pub(crate) flag_overrides: bool,
    pub(crate) created: DateTime<Utc>,
    pub(crate) last_active: DateTime<Utc>,
    #[serde(default)]
    pub(crate) display_name: Option<String>,
    #[serde(default)]
    pub(crate) friendly_id: Option<String>,
    #[serde(default)]
    pub(crate) claim_group: Option<String>,
    #[serde(default)]
    pub(crate) economy: Option<ClaimEconomyData>,
    #[serde(default)]
    pub(crate) trusts: TrustTable,
}

impl Claim {
    /// The singleton root claim of a world
    pub fn wilderness(world: WorldId) -> Self {
        let now = Utc::now();
        Self {
            id: ClaimId::new(),
            world,
            claim_type: ClaimType::Wilderness,
            cuboid: false,
            bounds: Bounds::from_coords(
                -WORLD_BORDER,
                WORLD_BORDER,
                WORLD_MIN_Y,
                WORLD_MAX_Y,
                -WORLD_BORDER,
                WORLD_BORDER,
            ),
            owner: None,
            parent: None,
            resizable: false,
            inherit_parent: false,
            deny_messages: true,
            expiration: false,
            flag_overrides: true,
            created: now,
            last_active: now,
            display_name: None,
            friendly_id: None,
            claim_group: None,
            economy: None,
            trusts: TrustTable::default(),
        }
    }

    pub fn id(&self) -> ClaimId {
        self.id
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn claim_type(&self) -> ClaimType {
        self.claim_type
    }

    pub fn is_cuboid(&self) -> bool {
        self.cuboid
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn parent(&self) -> Option<ClaimId> {
        self.parent
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn inherits_parent(&self) -> bool {
        self.inherit_parent
    }

    pub fn deny_messages(&self) -> bool {
        self.deny_messages
    }

    pub fn expiration_enabled(&self) -> bool {
        self.expiration
    }

    pub fn flag_overrides(&self) -> bool {
        self.flag_overrides
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn friendly_id(&self) -> Option<&str> {
        self.friendly_id.as_deref()
    }

    pub fn claim_group(&self) -> Option<&str> {
        self.claim_group.as_deref()
    }

    pub fn economy(&self) -> Option<&ClaimEconomyData> {
        self.economy.as_ref()
    }

    pub fn trusts(&self) -> &TrustTable {
        &self.trusts
    }

    pub fn is_wilderness(&self) -> bool {
        self.claim_type == ClaimType::Wilderness
    }

    pub fn is_admin(&self) -> bool {
        self.claim_type == ClaimType::Admin
    }

    pub fn is_town(&self) -> bool {
        self.claim_type == ClaimType::Town
    }

    pub fn is_subdivision(&self) -> bool {
        self.claim_type == ClaimType::Subdivision
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner == Some(user)
    }

    /// Claim blocks this claim costs its owner: footprint area for column
    /// claims, volume for cuboids, nothing for non-consuming types.
    pub fn claim_block_cost(&self) -> i64 {
        claim_block_cost(self.claim_type, self.parent_is_root(), &self.bounds, self.cuboid)
    }

    /// Top-level claims have no parent (the wilderness is implicit)
    fn parent_is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Point in time when this claim expires, given the configured number of days
    pub fn expires_at(&self, days: u32) -> DateTime<Utc> {
        self.last_active + Duration::days(i64::from(days))
    }
}

/// Cost helper shared by validation code that has no `Claim` yet
pub(crate) fn claim_block_cost(
    claim_type: ClaimType,
    top_level: bool,
    bounds: &Bounds,
    cuboid: bool,
) -> i64 {
    if !claim_type.consumes_claim_blocks() || !top_level {
        return 0;
    }
    if cuboid { bounds.volume() } else { bounds.area() }
}

/// Something that occupies world space
pub trait SpatialEntity {
    fn world_id(&self) -> WorldId;
    fn region(&self) -> &Bounds;
    fn cuboid(&self) -> bool;

    /// Point containment honouring column semantics for non-cuboid entities
    fn contains(&self, pos: BlockPos) -> bool {
        self.region().contains_point(pos, self.cuboid())
    }

    /// Overlap test: 3D only when both sides are cuboids
    fn overlaps<S: SpatialEntity + ?Sized>(&self, other: &S) -> bool {
        self.region()
            .intersects(other.region(), self.cuboid() && other.cuboid())
    }
}

/// Something that carries ownership and trust assignments
pub trait Trustable {
    fn trust_owner(&self) -> Option<UserId>;
    fn trust_table(&self) -> &TrustTable;
    fn inherits_trust(&self) -> bool;
}

/// Something that scopes flag and option entries through contexts
pub trait FlagResolvable {
    /// Claim-specific context
    fn claim_context(&self) -> Context;
    /// Claim-type default context
    fn default_context(&self) -> Context;
    /// Override contexts in precedence order (specific, type, global)
    fn override_contexts(&self) -> Vec<Context>;
}

impl SpatialEntity for Claim {
    fn world_id(&self) -> WorldId {
        self.world
    }

    fn region(&self) -> &Bounds {
        &self.bounds
    }

    fn cuboid(&self) -> bool {
        self.cuboid
    }

    fn contains(&self, pos: BlockPos) -> bool {
        self.is_wilderness() || self.bounds.contains_point(pos, self.cuboid)
    }
}

impl Trustable for Claim {
    fn trust_owner(&self) -> Option<UserId> {
        self.owner
    }

    fn trust_table(&self) -> &TrustTable {
        &self.trusts
    }

    fn inherits_trust(&self) -> bool {
        self.inherit_parent
    }
}

impl FlagResolvable for Claim {
    fn claim_context(&self) -> Context {
        Context::new(Context::CLAIM, self.id.to_string())
    }

    fn default_context(&self) -> Context {
        Context::new(Context::CLAIM_DEFAULT, self.claim_type.as_str())
    }

    fn override_contexts(&self) -> Vec<Context> {
        let specific = Context::new(Context::CLAIM_OVERRIDE, self.id.to_string());
        if !self.flag_overrides {
            return vec![specific];
        }
        vec![
            specific,
            Context::new(Context::CLAIM_OVERRIDE, self.claim_type.as_str()),
            Context::new(Context::CLAIM_OVERRIDE, GLOBAL),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_rules() {
        assert!(ClaimType::Basic.allowed_under(ClaimType::Wilderness));
        assert!(ClaimType::Basic.allowed_under(ClaimType::Town));
        assert!(ClaimType::Subdivision.allowed_under(ClaimType::Basic));
        assert!(!ClaimType::Subdivision.allowed_under(ClaimType::Wilderness));
        assert!(!ClaimType::Town.allowed_under(ClaimType::Basic));
        assert!(!ClaimType::Wilderness.allowed_under(ClaimType::Wilderness));
    }

    #[test]
    fn test_wilderness_contains_everything() {
        let wild = Claim::wilderness(WorldId::new());
        assert!(wild.contains(BlockPos::new(i32::MAX, i32::MIN, 0)));
        assert_eq!(wild.claim_block_cost(), 0);
    }

    #[test]
    fn test_override_contexts_respect_toggle() {
        let mut claim = Claim::wilderness(WorldId::new());
        assert_eq!(claim.override_contexts().len(), 3);
        claim.flag_overrides = false;
        assert_eq!(claim.override_contexts().len(), 1);
    }

    #[test]
    fn test_claim_block_cost_rules() {
        let bounds = Bounds::from_coords(0, 9, 0, 9, 0, 9);
        assert_eq!(claim_block_cost(ClaimType::Basic, true, &bounds, false), 100);
        assert_eq!(claim_block_cost(ClaimType::Basic, true, &bounds, true), 1000);
        assert_eq!(claim_block_cost(ClaimType::Basic, false, &bounds, false), 0);
        assert_eq!(claim_block_cost(ClaimType::Admin, true, &bounds, false), 0);
        assert_eq!(claim_block_cost(ClaimType::Subdivision, false, &bounds, true), 0);
    }

    #[test]
    fn test_claim_type_parse() {
        assert_eq!("TOWN".parse::<ClaimType>().unwrap(), ClaimType::Town);
        assert!("castle".parse::<ClaimType>().is_err());
    }
}

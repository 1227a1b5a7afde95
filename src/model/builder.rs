//! Fluent claim builder
//!
//! The builder collects settings and `build()` produces an immutable,
//! structurally validated [`ClaimDraft`]. Context-dependent validation (size
//! limits, overlap, funds) happens in [`crate::claims::ClaimManager::create`].

use crate::model::bounds::{BlockPos, Bounds};
use crate::model::claim::{ClaimEconomyData, ClaimType};
use crate::model::ids::{ClaimId, UserId, WorldId};
use crate::model::results::{ClaimResult, ClaimResultType};
use crate::util::identifier;

/// Validated, immutable claim creation request
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDraft {
    pub(crate) world: WorldId,
    pub(crate) claim_type: ClaimType,
    pub(crate) bounds: Bounds,
    pub(crate) cuboid: bool,
    pub(crate) owner: Option<UserId>,
    pub(crate) parent: Option<ClaimId>,
    pub(crate) resizable: bool,
    pub(crate) inherit_parent: bool,
    pub(crate) deny_messages: bool,
    pub(crate) expiration: bool,
    pub(crate) flag_overrides: bool,
    pub(crate) display_name: Option<String>,
    pub(crate) friendly_id: Option<String>,
    pub(crate) claim_group: Option<String>,
    pub(crate) economy: Option<ClaimEconomyData>,
    pub(crate) validate: bool,
}

impl ClaimDraft {
    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn claim_type(&self) -> ClaimType {
        self.claim_type
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn is_cuboid(&self) -> bool {
        self.cuboid
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn parent(&self) -> Option<ClaimId> {
        self.parent
    }

    /// Whether size, count and claim-block limits are enforced
    pub fn validates_limits(&self) -> bool {
        self.validate
    }
}

/// Builder for [`ClaimDraft`]
#[derive(Debug, Clone)]
pub struct ClaimBuilder {
    world: WorldId,
    claim_type: ClaimType,
    corners: Option<(BlockPos, BlockPos)>,
    cuboid: bool,
    owner: Option<UserId>,
    parent: Option<ClaimId>,
    resizable: bool,
    inherit_parent: bool,
    deny_messages: bool,
    expiration: bool,
    flag_overrides: bool,
    display_name: Option<String>,
    friendly_id: Option<String>,
    claim_group: Option<String>,
    economy: Option<ClaimEconomyData>,
    validate: bool,
}

impl ClaimBuilder {
    pub fn new(world: WorldId, claim_type: ClaimType) -> Self {
        Self {
            world,
            claim_type,
            corners: None,
            cuboid: false,
            owner: None,
            parent: None,
            resizable: true,
            inherit_parent: true,
            deny_messages: true,
            expiration: true,
            flag_overrides: true,
            display_name: None,
            friendly_id: None,
            claim_group: None,
            economy: None,
            validate: true,
        }
    }

    /// Set two opposite corners (any order)
    pub fn bounds(mut self, a: BlockPos, b: BlockPos) -> Self {
        self.corners = Some((a, b));
        self
    }

    pub fn cuboid(mut self, cuboid: bool) -> Self {
        self.cuboid = cuboid;
        self
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn parent(mut self, parent: ClaimId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn inherit_parent(mut self, inherit: bool) -> Self {
        self.inherit_parent = inherit;
        self
    }

    pub fn deny_messages(mut self, deny_messages: bool) -> Self {
        self.deny_messages = deny_messages;
        self
    }

    pub fn expiration(mut self, expiration: bool) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn flag_overrides(mut self, flag_overrides: bool) -> Self {
        self.flag_overrides = flag_overrides;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn friendly_id(mut self, id: impl Into<String>) -> Self {
        self.friendly_id = Some(id.into());
        self
    }

    pub fn claim_group(mut self, group: impl Into<String>) -> Self {
        self.claim_group = Some(group.into());
        self
    }

    pub fn economy(mut self, economy: ClaimEconomyData) -> Self {
        self.economy = Some(economy);
        self
    }

    /// Skip size, count and claim-block limits (admin tooling, imports)
    pub fn skip_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Validate the structural rules and produce an immutable draft
    pub fn build(self) -> Result<ClaimDraft, ClaimResult> {
        let Some((a, b)) = self.corners else {
            return Err(ClaimResult::failure(
                ClaimResultType::Failure,
                "claim bounds are required",
            ));
        };

        match self.claim_type {
            ClaimType::Wilderness => {
                return Err(ClaimResult::failure(
                    ClaimResultType::WrongClaimType,
                    "wilderness claims are created by the world registry",
                ));
            }
            ClaimType::Subdivision if self.parent.is_none() => {
                return Err(ClaimResult::failure(
                    ClaimResultType::WrongClaimType,
                    "subdivisions require a parent claim",
                ));
            }
            ClaimType::Basic | ClaimType::Town if self.owner.is_none() => {
                return Err(ClaimResult::failure(
                    ClaimResultType::RequiresOwner,
                    format!("{} claims require an owner", self.claim_type),
                ));
            }
            _ => {}
        }

        if let Some(friendly) = &self.friendly_id
            && let Err(e) = identifier::validate_friendly_id(friendly)
        {
            return Err(ClaimResult::failure(ClaimResultType::Failure, e.to_string()));
        }

        // Admin claims are never owned
        let owner = if self.claim_type == ClaimType::Admin {
            None
        } else {
            self.owner
        };

        Ok(ClaimDraft {
            world: self.world,
            claim_type: self.claim_type,
            bounds: Bounds::new(a, b),
            cuboid: self.cuboid,
            owner,
            parent: self.parent,
            resizable: self.resizable,
            inherit_parent: self.inherit_parent,
            deny_messages: self.deny_messages,
            expiration: self.expiration,
            flag_overrides: self.flag_overrides,
            display_name: self.display_name,
            friendly_id: self.friendly_id,
            claim_group: self.claim_group,
            economy: self.economy,
            validate: self.validate,
        })
    }
}

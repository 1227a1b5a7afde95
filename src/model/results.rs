//! Typed outcome records
//!
//! Every mutating or decision-producing operation returns one of these
//! immutable records instead of an error. Callers must check the result type
//! before assuming success.

use crate::model::claim::Claim;
use crate::model::ids::{ClaimId, UserId};
use crate::model::trust::TrustLevel;
use crate::model::tristate::Tristate;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Outcome of a claim mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimResultType {
    Success,
    Failure,
    ClaimNotFound,
    WorldNotFound,
    WrongClaimType,
    OverlappingClaim,
    BelowMinSizeX,
    BelowMinSizeY,
    BelowMinSizeZ,
    ExceedsMaxSizeX,
    ExceedsMaxSizeY,
    ExceedsMaxSizeZ,
    ExceedsMaxClaimLimit,
    InsufficientClaimBlocks,
    EconomyNotEnoughFunds,
    EconomyAccountNotFound,
    EconomyWithdrawFailure,
    EconomyDepositFailure,
    RequiresOwner,
    ClaimEventCancelled,
}

impl ClaimResultType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ClaimResultType::Success => "SUCCESS",
            ClaimResultType::Failure => "FAILURE",
            ClaimResultType::ClaimNotFound => "CLAIM_NOT_FOUND",
            ClaimResultType::WorldNotFound => "WORLD_NOT_FOUND",
            ClaimResultType::WrongClaimType => "WRONG_CLAIM_TYPE",
            ClaimResultType::OverlappingClaim => "OVERLAPPING_CLAIM",
            ClaimResultType::BelowMinSizeX => "BELOW_MIN_SIZE_X",
            ClaimResultType::BelowMinSizeY => "BELOW_MIN_SIZE_Y",
            ClaimResultType::BelowMinSizeZ => "BELOW_MIN_SIZE_Z",
            ClaimResultType::ExceedsMaxSizeX => "EXCEEDS_MAX_SIZE_X",
            ClaimResultType::ExceedsMaxSizeY => "EXCEEDS_MAX_SIZE_Y",
            ClaimResultType::ExceedsMaxSizeZ => "EXCEEDS_MAX_SIZE_Z",
            ClaimResultType::ExceedsMaxClaimLimit => "EXCEEDS_MAX_CLAIM_LIMIT",
            ClaimResultType::InsufficientClaimBlocks => "INSUFFICIENT_CLAIM_BLOCKS",
            ClaimResultType::EconomyNotEnoughFunds => "ECONOMY_NOT_ENOUGH_FUNDS",
            ClaimResultType::EconomyAccountNotFound => "ECONOMY_ACCOUNT_NOT_FOUND",
            ClaimResultType::EconomyWithdrawFailure => "ECONOMY_WITHDRAW_FAILURE",
            ClaimResultType::EconomyDepositFailure => "ECONOMY_DEPOSIT_FAILURE",
            ClaimResultType::RequiresOwner => "REQUIRES_OWNER",
            ClaimResultType::ClaimEventCancelled => "CLAIM_EVENT_CANCELLED",
        }
    }
}

impl fmt::Display for ClaimResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a claim mutation
#[derive(Debug, Clone)]
pub struct ClaimResult {
    result_type: ClaimResultType,
    message: Option<String>,
    /// Claims affected (created, resized, deleted, ...)
    claims: Vec<Arc<Claim>>,
    /// Claims whose change was vetoed by an event hook
    vetoed: Vec<ClaimId>,
}

impl ClaimResult {
    pub fn success(claim: Arc<Claim>) -> Self {
        Self::success_many(vec![claim])
    }

    pub fn success_many(claims: Vec<Arc<Claim>>) -> Self {
        Self {
            result_type: ClaimResultType::Success,
            message: None,
            claims,
            vetoed: Vec::new(),
        }
    }

    pub fn failure(result_type: ClaimResultType, message: impl Into<String>) -> Self {
        Self {
            result_type,
            message: Some(message.into()),
            claims: Vec::new(),
            vetoed: Vec::new(),
        }
    }

    /// Cancellation by an event hook, keeping the claims that did succeed
    pub fn cancelled(
        message: impl Into<String>,
        processed: Vec<Arc<Claim>>,
        vetoed: Vec<ClaimId>,
    ) -> Self {
        Self::partial(ClaimResultType::ClaimEventCancelled, message, processed, vetoed)
    }

    /// A bulk operation that stopped short, with the claims it did process
    pub fn partial(
        result_type: ClaimResultType,
        message: impl Into<String>,
        processed: Vec<Arc<Claim>>,
        vetoed: Vec<ClaimId>,
    ) -> Self {
        Self {
            result_type,
            message: Some(message.into()),
            claims: processed,
            vetoed,
        }
    }

    pub fn result_type(&self) -> ClaimResultType {
        self.result_type
    }

    pub fn successful(&self) -> bool {
        self.result_type == ClaimResultType::Success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// First affected claim
    pub fn claim(&self) -> Option<&Arc<Claim>> {
        self.claims.first()
    }

    pub fn claims(&self) -> &[Arc<Claim>] {
        &self.claims
    }

    pub fn vetoed(&self) -> &[ClaimId] {
        &self.vetoed
    }
}

/// Outcome of a trust query or trust mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustResultType {
    Success,
    Failure,
    NotTrusted,
    Owner,
    Manager,
    Builder,
    Container,
    Accessor,
    Trusted,
    Public,
    PermissionGrant,
    PermissionDeny,
    ClanGrant,
    ClanDeny,
    ClanMemberGrant,
    ClanMemberDeny,
    ClaimExpired,
    /// A trust change vetoed by an event hook
    ClaimEventCancelled,
}

impl TrustResultType {
    /// Whether this outcome grants the requested trust
    pub const fn is_grant(&self) -> bool {
        matches!(
            self,
            TrustResultType::Success
                | TrustResultType::Owner
                | TrustResultType::Manager
                | TrustResultType::Builder
                | TrustResultType::Container
                | TrustResultType::Accessor
                | TrustResultType::Trusted
                | TrustResultType::Public
                | TrustResultType::PermissionGrant
                | TrustResultType::ClanGrant
                | TrustResultType::ClanMemberGrant
        )
    }

    /// Grant variant for a direct user entry at `level`
    pub const fn for_level(level: TrustLevel) -> Self {
        match level {
            TrustLevel::Manager => TrustResultType::Manager,
            TrustLevel::Builder => TrustResultType::Builder,
            TrustLevel::Container => TrustResultType::Container,
            TrustLevel::Accessor => TrustResultType::Accessor,
            TrustLevel::None => TrustResultType::NotTrusted,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            TrustResultType::Success => "SUCCESS",
            TrustResultType::Failure => "FAILURE",
            TrustResultType::NotTrusted => "NOT_TRUSTED",
            TrustResultType::Owner => "OWNER",
            TrustResultType::Manager => "MANAGER",
            TrustResultType::Builder => "BUILDER",
            TrustResultType::Container => "CONTAINER",
            TrustResultType::Accessor => "ACCESSOR",
            TrustResultType::Trusted => "TRUSTED",
            TrustResultType::Public => "PUBLIC",
            TrustResultType::PermissionGrant => "PERMISSION_GRANT",
            TrustResultType::PermissionDeny => "PERMISSION_DENY",
            TrustResultType::ClanGrant => "CLAN_GRANT",
            TrustResultType::ClanDeny => "CLAN_DENY",
            TrustResultType::ClanMemberGrant => "CLAN_MEMBER_GRANT",
            TrustResultType::ClanMemberDeny => "CLAN_MEMBER_DENY",
            TrustResultType::ClaimExpired => "CLAIM_EXPIRED",
            TrustResultType::ClaimEventCancelled => "CLAIM_EVENT_CANCELLED",
        }
    }
}

impl fmt::Display for TrustResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a trust check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustResult {
    result_type: TrustResultType,
    message: Option<String>,
    user: Option<UserId>,
    required: TrustLevel,
    /// Claim whose configuration produced the answer (differs from the
    /// queried claim when inherited from a parent)
    source_claim: Option<ClaimId>,
}

impl TrustResult {
    pub fn new(result_type: TrustResultType, user: UserId, required: TrustLevel) -> Self {
        Self {
            result_type,
            message: None,
            user: Some(user),
            required,
            source_claim: None,
        }
    }

    /// Outcome of a trust mutation
    pub fn outcome(result_type: TrustResultType, required: TrustLevel) -> Self {
        Self {
            result_type,
            message: None,
            user: None,
            required,
            source_claim: None,
        }
    }

    pub fn not_trusted(user: UserId, required: TrustLevel) -> Self {
        Self::new(TrustResultType::NotTrusted, user, required)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn from_claim(mut self, claim: ClaimId) -> Self {
        self.source_claim = Some(claim);
        self
    }

    pub fn result_type(&self) -> TrustResultType {
        self.result_type
    }

    pub fn is_trusted(&self) -> bool {
        self.result_type.is_grant()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn required(&self) -> TrustLevel {
        self.required
    }

    pub fn source_claim(&self) -> Option<ClaimId> {
        self.source_claim
    }
}

/// Outcome of a permission/option mutation or a flag decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionResultType {
    Success,
    Failure,
    InvalidContext,
    Cancelled,
}

/// Which tier of the resolution ladder produced a flag value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Override,
    Trust,
    SubjectClaim,
    InheritedClaim,
    SubjectDefault,
    SubjectGlobal,
    DefaultClaim,
    DefaultType,
    DefaultGlobal,
    FlagDefault,
    Fallback,
}

/// Result of a permission mutation or a flag decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionResult {
    result_type: PermissionResultType,
    message: Option<String>,
    value: Tristate,
    source: Option<ResolutionSource>,
    user: Option<UserId>,
    trust: Option<TrustResultType>,
}

impl PermissionResult {
    pub fn success() -> Self {
        Self {
            result_type: PermissionResultType::Success,
            message: None,
            value: Tristate::Undefined,
            source: None,
            user: None,
            trust: None,
        }
    }

    pub fn failure(result_type: PermissionResultType, message: impl Into<String>) -> Self {
        Self {
            result_type,
            message: Some(message.into()),
            ..Self::success()
        }
    }

    /// A resolved flag decision
    pub fn decision(value: Tristate, source: ResolutionSource, user: UserId) -> Self {
        Self {
            value,
            source: Some(source),
            user: Some(user),
            ..Self::success()
        }
    }

    /// A decision vetoed by an event hook. Always denies.
    pub fn vetoed(user: UserId, message: impl Into<String>) -> Self {
        Self {
            result_type: PermissionResultType::Cancelled,
            message: Some(message.into()),
            value: Tristate::False,
            source: None,
            user: Some(user),
            trust: None,
        }
    }

    pub fn with_trust(mut self, trust: TrustResultType) -> Self {
        self.trust = Some(trust);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn result_type(&self) -> PermissionResultType {
        self.result_type
    }

    pub fn successful(&self) -> bool {
        self.result_type == PermissionResultType::Success
    }

    pub fn value(&self) -> Tristate {
        self.value
    }

    /// A decision allows the action only when it resolved to TRUE
    pub fn is_allowed(&self) -> bool {
        self.value == Tristate::True
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn source(&self) -> Option<ResolutionSource> {
        self.source
    }

    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn trust(&self) -> Option<TrustResultType> {
        self.trust
    }
}

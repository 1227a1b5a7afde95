//! Trust model integration tests
//!
//! Trust levels compare as capability sets:
//! - BUILDER implies ACCESSOR and CONTAINER
//! - MANAGER implies everything
//! - ACCESSOR and CONTAINER are peers

use chrono::{Duration, Utc};
use claimguard::claims::{ClaimManager, ClaimUpdate, TrustChange, TrustTarget};
use claimguard::config::{AppConfig, ExpirationConfig};
use claimguard::model::{
    BlockPos, ClaimBuilder, ClaimId, ClaimType, Subject, TrustLevel, TrustResultType, Trustable,
    UserId, WorldId,
};
use claimguard::permission::MemoryPermissionBackend;
use claimguard::providers::{
    ClaimEventKind, ConfiguredPlayerData, FnHook, HookOutcome, NoClans, Providers, StaticClans,
};
use claimguard::trust::TrustResolver;
use claimguard::Engine;
use rstest::rstest;
use std::sync::Arc;

// =============================================================================
// Test Helpers
// =============================================================================

async fn manager_with(providers: Providers) -> Arc<ClaimManager> {
    let mut config = AppConfig::default();
    config.player.initial_claim_blocks = 100_000;
    let providers =
        providers.with_player_data(Arc::new(ConfiguredPlayerData::from_config(&config)));
    let engine = Engine::new(config, providers, Arc::new(MemoryPermissionBackend::new()));
    engine.registry().load_world(WorldId::new()).await.unwrap()
}

async fn claim(
    manager: &ClaimManager,
    claim_type: ClaimType,
    owner: UserId,
    parent: Option<ClaimId>,
    from: i32,
    to: i32,
) -> ClaimId {
    let mut builder = ClaimBuilder::new(manager.world(), claim_type)
        .owner(owner)
        .bounds(BlockPos::new(from, 0, from), BlockPos::new(to, 255, to));
    if let Some(parent) = parent {
        builder = builder.parent(parent);
    }
    let result = manager.create(builder.build().unwrap()).await;
    assert!(result.successful(), "{:?}", result.message());
    result.claim().unwrap().id()
}

// =============================================================================
// Capability ordering
// =============================================================================

#[rstest]
#[case(TrustLevel::Accessor, TrustLevel::Accessor, true)]
#[case(TrustLevel::Accessor, TrustLevel::Container, false)]
#[case(TrustLevel::Container, TrustLevel::Accessor, false)]
#[case(TrustLevel::Builder, TrustLevel::Accessor, true)]
#[case(TrustLevel::Builder, TrustLevel::Container, true)]
#[case(TrustLevel::Builder, TrustLevel::Builder, true)]
#[case(TrustLevel::Builder, TrustLevel::Manager, false)]
#[case(TrustLevel::Manager, TrustLevel::Builder, true)]
#[case(TrustLevel::Manager, TrustLevel::Manager, true)]
#[tokio::test]
async fn test_granted_level_satisfies(
    #[case] granted: TrustLevel,
    #[case] required: TrustLevel,
    #[case] expected: bool,
) {
    let manager = manager_with(Providers::in_memory()).await;
    let id = claim(&manager, ClaimType::Basic, UserId::new(), None, 0, 10).await;
    let user = UserId::new();
    assert!(manager.add_user_trust(id, user, granted).await.is_trusted());

    let result = manager.check_trust(id, &Subject::user(user), required);
    assert_eq!(result.is_trusted(), expected, "{granted} for {required}");
}

#[tokio::test]
async fn test_untrusted_then_builder() {
    let manager = manager_with(Providers::in_memory()).await;
    let id = claim(&manager, ClaimType::Basic, UserId::new(), None, 0, 10).await;
    let user = Subject::user(UserId::new());

    let before = manager.check_trust(id, &user, TrustLevel::Builder);
    assert_eq!(before.result_type(), TrustResultType::NotTrusted);

    manager.add_user_trust(id, user.user, TrustLevel::Builder).await;
    let builder = manager.check_trust(id, &user, TrustLevel::Builder);
    assert_eq!(builder.result_type(), TrustResultType::Builder);
    assert!(manager.check_trust(id, &user, TrustLevel::Container).is_trusted());
}

#[tokio::test]
async fn test_owner_always_trusted() {
    let manager = manager_with(Providers::in_memory()).await;
    let owner = UserId::new();
    let id = claim(&manager, ClaimType::Basic, owner, None, 0, 10).await;
    let result = manager.check_trust(id, &Subject::user(owner), TrustLevel::Manager);
    assert_eq!(result.result_type(), TrustResultType::Owner);
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_trust_mutations_are_idempotent() {
    let manager = manager_with(Providers::in_memory()).await;
    let id = claim(&manager, ClaimType::Basic, UserId::new(), None, 0, 10).await;
    let user = UserId::new();

    assert!(manager.add_user_trust(id, user, TrustLevel::Builder).await.is_trusted());
    let snapshot_before = manager.snapshot();
    assert!(manager.add_user_trust(id, user, TrustLevel::Builder).await.is_trusted());
    // No change, no new snapshot
    assert!(Arc::ptr_eq(&snapshot_before, &manager.snapshot()));

    let stranger = UserId::new();
    assert!(manager.remove_user_trust(id, stranger).await.is_trusted());
}

#[tokio::test]
async fn test_group_and_public_trust() {
    let manager = manager_with(Providers::in_memory()).await;
    let id = claim(&manager, ClaimType::Basic, UserId::new(), None, 0, 10).await;
    let member = Subject::user(UserId::new()).with_groups(["builders"]);

    manager.add_group_trust(id, "builders", TrustLevel::Builder).await;
    assert!(manager.check_trust(id, &member, TrustLevel::Builder).is_trusted());

    let stranger = Subject::user(UserId::new());
    assert!(!manager.check_trust(id, &stranger, TrustLevel::Accessor).is_trusted());
    manager.add_public_trust(id, TrustLevel::Accessor).await;
    let public = manager.check_trust(id, &stranger, TrustLevel::Accessor);
    assert_eq!(public.result_type(), TrustResultType::Public);

    manager.remove_all_trust(id).await;
    assert!(!manager.check_trust(id, &member, TrustLevel::Builder).is_trusted());
}

#[tokio::test]
async fn test_bulk_trust_is_atomic() {
    let manager = manager_with(Providers::in_memory()).await;
    let id = claim(&manager, ClaimType::Basic, UserId::new(), None, 0, 10).await;
    let user = UserId::new();

    let result = manager
        .apply_trust(
            id,
            None,
            vec![
                TrustChange::Set(TrustTarget::User(user), TrustLevel::Builder),
                TrustChange::Set(TrustTarget::Group(String::new()), TrustLevel::Builder),
            ],
        )
        .await;
    assert!(!result.is_trusted());
    assert!(manager.get(id).unwrap().trusts().is_empty());
}

#[tokio::test]
async fn test_actor_needs_manager() {
    let manager = manager_with(Providers::in_memory()).await;
    let owner = UserId::new();
    let id = claim(&manager, ClaimType::Basic, owner, None, 0, 10).await;
    let helper = UserId::new();
    let change = || vec![TrustChange::Set(TrustTarget::User(UserId::new()), TrustLevel::Accessor)];

    let denied = manager.apply_trust(id, Some(helper), change()).await;
    assert_eq!(denied.result_type(), TrustResultType::NotTrusted);

    manager.add_user_trust(id, helper, TrustLevel::Manager).await;
    assert!(manager.apply_trust(id, Some(helper), change()).await.is_trusted());
    assert!(manager.apply_trust(id, Some(owner), change()).await.is_trusted());
}

// =============================================================================
// Inheritance, clans and expiration
// =============================================================================

#[tokio::test]
async fn test_inherited_town_trust() {
    let manager = manager_with(Providers::in_memory()).await;
    let town = claim(&manager, ClaimType::Town, UserId::new(), None, 0, 100).await;
    let plot = claim(&manager, ClaimType::Basic, UserId::new(), Some(town), 10, 30).await;
    let user = Subject::user(UserId::new());

    manager.add_user_trust(town, user.user, TrustLevel::Accessor).await;
    assert!(manager.check_trust(plot, &user, TrustLevel::Accessor).is_trusted());

    let result = manager
        .update(plot, ClaimUpdate::new().inherit_parent(false))
        .await;
    assert!(result.successful());
    let result = manager.check_trust(plot, &user, TrustLevel::Accessor);
    assert_eq!(result.result_type(), TrustResultType::NotTrusted);
}

#[tokio::test]
async fn test_parent_manager_delegates() {
    let manager = manager_with(Providers::in_memory()).await;
    let town = claim(&manager, ClaimType::Town, UserId::new(), None, 0, 100).await;
    let plot = claim(&manager, ClaimType::Basic, UserId::new(), Some(town), 10, 30).await;
    manager
        .update(plot, ClaimUpdate::new().inherit_parent(false))
        .await;
    let mayor = UserId::new();
    manager.add_user_trust(town, mayor, TrustLevel::Manager).await;

    let result = manager.check_trust(plot, &Subject::user(mayor), TrustLevel::Builder);
    assert_eq!(result.result_type(), TrustResultType::Manager);
}

#[tokio::test]
async fn test_clan_trust() {
    let clans = Arc::new(StaticClans::new());
    let manager = manager_with(Providers::in_memory().with_clans(clans.clone())).await;
    let owner = UserId::new();
    let id = claim(&manager, ClaimType::Basic, owner, None, 0, 10).await;

    let ally = UserId::new();
    clans.join(ally, "wolves", Some(TrustLevel::Accessor));
    manager.add_clan_trust(id, "wolves", TrustLevel::Builder).await;
    let granted = manager.check_trust(id, &Subject::user(ally), TrustLevel::Builder);
    assert_eq!(granted.result_type(), TrustResultType::ClanGrant);

    // Rank trust applies inside a clanmate's claim
    let mate = UserId::new();
    clans.join(owner, "ravens", Some(TrustLevel::Builder));
    clans.join(mate, "ravens", Some(TrustLevel::Container));
    let rank = manager.check_trust(id, &Subject::user(mate), TrustLevel::Container);
    assert_eq!(rank.result_type(), TrustResultType::ClanMemberGrant);
    assert!(!manager.check_trust(id, &Subject::user(mate), TrustLevel::Builder).is_trusted());
}

#[tokio::test]
async fn test_expired_claim_blocks_trusted_users() {
    let manager = manager_with(Providers::in_memory()).await;
    let owner = UserId::new();
    let id = claim(&manager, ClaimType::Basic, owner, None, 0, 10).await;
    let friend = UserId::new();
    manager.add_user_trust(id, friend, TrustLevel::Builder).await;

    let snapshot = manager.snapshot();
    let expiration = ExpirationConfig::default();
    let later = Utc::now() + Duration::days(i64::from(expiration.basic_days) + 1);
    let resolver = TrustResolver::new(&snapshot, &NoClans, &expiration).at(later);

    let claim = snapshot.get(id).unwrap();
    assert!(resolver.is_expired(claim));
    let result = resolver.check(id, &Subject::user(friend), TrustLevel::Builder);
    assert_eq!(result.result_type(), TrustResultType::ClaimExpired);
    assert!(resolver.check(id, &Subject::user(owner), TrustLevel::Builder).is_trusted());

    // Disabling expiration on the claim lifts the block
    manager.update(id, ClaimUpdate::new().expiration(false)).await;
    let snapshot = manager.snapshot();
    let resolver = TrustResolver::new(&snapshot, &NoClans, &expiration).at(later);
    assert!(resolver.check(id, &Subject::user(friend), TrustLevel::Builder).is_trusted());
}

#[tokio::test]
async fn test_wilderness_trust_not_granted() {
    let manager = manager_with(Providers::in_memory()).await;
    let wilderness = manager.wilderness().id();
    let user = UserId::new();

    let added = manager.add_public_trust(wilderness, TrustLevel::Builder).await;
    assert_eq!(added.result_type(), TrustResultType::Failure);
    let added = manager.add_user_trust(wilderness, user, TrustLevel::Manager).await;
    assert_eq!(added.result_type(), TrustResultType::Failure);
    assert!(manager.wilderness().trust_table().is_empty());

    let result = manager.check_trust(wilderness, &Subject::user(user), TrustLevel::Builder);
    assert_eq!(result.result_type(), TrustResultType::NotTrusted);
}

#[tokio::test]
async fn test_vetoed_trust_change_reports_cancellation() {
    let manager = manager_with(Providers::in_memory()).await;
    let owner = UserId::new();
    let friend = UserId::new();
    let id = claim(&manager, ClaimType::Basic, owner, None, 0, 20).await;
    manager.providers().events.register(Arc::new(
        FnHook::new("no-guests", |_| HookOutcome::cancel("guests disabled"))
            .on(ClaimEventKind::TrustChange),
    ));

    let result = manager.add_user_trust(id, friend, TrustLevel::Accessor).await;
    assert_eq!(result.result_type(), TrustResultType::ClaimEventCancelled);
    assert_eq!(result.message(), Some("guests disabled"));
    assert!(!manager.check_trust(id, &Subject::user(friend), TrustLevel::Accessor).is_trusted());
}

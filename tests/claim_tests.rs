//! Claim lifecycle integration tests
//!
//! Covers creation, the spatial lookup, resize, type changes, ownership
//! transfer, attribute updates and (bulk) removal through a full engine.

use claimguard::Engine;
use claimguard::claims::{ClaimManager, ClaimUpdate};
use claimguard::config::AppConfig;
use claimguard::model::{
    BlockPos, Bounds, ClaimBuilder, ClaimId, ClaimResultType, ClaimType, UserId, WorldId,
};
use claimguard::permission::MemoryPermissionBackend;
use claimguard::providers::{
    ClaimEventKind, ConfiguredPlayerData, EconomyProvider, FnHook, HookOutcome, MemoryEconomy,
    MemoryStorage, Providers,
};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.player.initial_claim_blocks = 100_000;
    config
}

async fn world_engine(config: AppConfig, providers: Providers) -> (Engine, Arc<ClaimManager>) {
    let engine = Engine::new(config, providers, Arc::new(MemoryPermissionBackend::new()));
    let manager = engine.registry().load_world(WorldId::new()).await.unwrap();
    (engine, manager)
}

async fn setup() -> (Engine, Arc<ClaimManager>) {
    let config = config();
    let providers = Providers::in_memory()
        .with_player_data(Arc::new(ConfiguredPlayerData::from_config(&config)));
    world_engine(config, providers).await
}

async fn create(
    manager: &ClaimManager,
    claim_type: ClaimType,
    owner: Option<UserId>,
    parent: Option<ClaimId>,
    (x1, z1): (i32, i32),
    (x2, z2): (i32, i32),
) -> ClaimId {
    let mut builder = ClaimBuilder::new(manager.world(), claim_type)
        .bounds(BlockPos::new(x1, 0, z1), BlockPos::new(x2, 255, z2));
    if let Some(owner) = owner {
        builder = builder.owner(owner);
    }
    if let Some(parent) = parent {
        builder = builder.parent(parent);
    }
    let result = manager.create(builder.build().unwrap()).await;
    assert!(result.successful(), "{:?}: {:?}", result.result_type(), result.message());
    result.claim().unwrap().id()
}

fn veto_removal_of(engine: &Engine, target: ClaimId) {
    engine.registry().events().register(Arc::new(
        FnHook::new("protect", move |event| {
            if event.claim_id() == Some(target) {
                HookOutcome::cancel("protected claim")
            } else {
                HookOutcome::Continue
            }
        })
        .on(ClaimEventKind::Remove),
    ));
}

// =============================================================================
// Creation and lookup
// =============================================================================

mod creation {
    use super::*;

    #[tokio::test]
    async fn test_basic_claim_in_fresh_world() {
        let (_engine, manager) = setup().await;
        let world = manager.world();
        let owner = UserId::new();

        let draft = ClaimBuilder::new(world, ClaimType::Basic)
            .owner(owner)
            .bounds(BlockPos::new(0, 0, 0), BlockPos::new(10, 10, 10))
            .build()
            .unwrap();
        let result = manager.create(draft).await;
        assert_eq!(result.result_type(), ClaimResultType::Success);
        let id = result.claim().unwrap().id();

        assert_eq!(manager.claim_at(BlockPos::new(5, 5, 5)).id(), id);
        assert!(manager.claim_at(BlockPos::new(20, 0, 0)).is_wilderness());
    }

    #[tokio::test]
    async fn test_overlapping_sibling_rejected() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (20, 20)).await;

        let draft = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(UserId::new())
            .bounds(BlockPos::new(15, 0, 15), BlockPos::new(40, 255, 40))
            .build()
            .unwrap();
        let result = manager.create(draft).await;
        assert_eq!(result.result_type(), ClaimResultType::OverlappingClaim);
        assert_eq!(manager.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_subdivision_nests_inside_parent() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        let parent = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (50, 50)).await;
        let child = create(&manager, ClaimType::Subdivision, None, Some(parent), (10, 10), (20, 20)).await;

        assert_eq!(manager.claim_at(BlockPos::new(15, 64, 15)).id(), child);
        assert_eq!(manager.claim_at(BlockPos::new(30, 64, 30)).id(), parent);
        // Subdivisions inherit the parent's owner
        assert_eq!(manager.get(child).unwrap().owner(), Some(owner));

        let outside = ClaimBuilder::new(manager.world(), ClaimType::Subdivision)
            .parent(parent)
            .bounds(BlockPos::new(40, 0, 40), BlockPos::new(60, 255, 60))
            .build()
            .unwrap();
        assert!(!manager.create(outside).await.successful());
    }

    #[tokio::test]
    async fn test_wrong_parent_type_rejected() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        let basic = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (50, 50)).await;
        let draft = ClaimBuilder::new(manager.world(), ClaimType::Town)
            .owner(owner)
            .parent(basic)
            .bounds(BlockPos::new(0, 0, 0), BlockPos::new(40, 255, 40))
            .build()
            .unwrap();
        assert_eq!(
            manager.create(draft).await.result_type(),
            ClaimResultType::WrongClaimType
        );
    }

    #[tokio::test]
    async fn test_create_limit_enforced() {
        let mut config = config();
        config.limits.basic.create_limit = 1;
        let providers = Providers::in_memory()
            .with_player_data(Arc::new(ConfiguredPlayerData::from_config(&config)));
        let (_engine, manager) = world_engine(config, providers).await;
        let owner = UserId::new();
        create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (10, 10)).await;

        let draft = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(owner)
            .bounds(BlockPos::new(100, 0, 100), BlockPos::new(110, 255, 110))
            .build()
            .unwrap();
        assert_eq!(
            manager.create(draft).await.result_type(),
            ClaimResultType::ExceedsMaxClaimLimit
        );
    }

    #[tokio::test]
    async fn test_skip_validation_still_checks_overlap() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (10, 10)).await;

        let tiny = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(owner)
            .bounds(BlockPos::new(100, 0, 100), BlockPos::new(101, 255, 101))
            .skip_validation()
            .build()
            .unwrap();
        assert!(manager.create(tiny).await.successful());

        let overlapping = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(owner)
            .bounds(BlockPos::new(5, 0, 5), BlockPos::new(6, 255, 6))
            .skip_validation()
            .build()
            .unwrap();
        assert_eq!(
            manager.create(overlapping).await.result_type(),
            ClaimResultType::OverlappingClaim
        );
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_creates_admit_one() {
        let (_engine, manager) = setup().await;
        let drafts: Vec<_> = (0..8)
            .map(|i| {
                ClaimBuilder::new(manager.world(), ClaimType::Basic)
                    .owner(UserId::new())
                    .bounds(BlockPos::new(i, 0, i), BlockPos::new(i + 20, 255, i + 20))
                    .build()
                    .unwrap()
            })
            .collect();

        let results = join_all(drafts.into_iter().map(|draft| manager.create(draft))).await;
        let admitted = results.iter().filter(|r| r.successful()).count();
        assert_eq!(admitted, 1);
        assert!(results
            .iter()
            .filter(|r| !r.successful())
            .all(|r| r.result_type() == ClaimResultType::OverlappingClaim));
        assert_eq!(manager.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_world_sized_admin_claim() {
        let (_engine, manager) = setup().await;
        let draft = ClaimBuilder::new(manager.world(), ClaimType::Admin)
            .bounds(
                BlockPos::new(-1_000_000, 0, -1_000_000),
                BlockPos::new(1_000_000, 255, 1_000_000),
            )
            .build()
            .unwrap();
        let created = tokio::time::timeout(Duration::from_secs(5), manager.create(draft))
            .await
            .expect("admin claim creation finished");
        assert!(created.successful(), "{:?}", created.message());
        let admin = created.claim().unwrap().id();
        assert_eq!(manager.claim_at(BlockPos::new(123_456, 64, -98_765)).id(), admin);
        assert!(manager.claim_at(BlockPos::new(2_000_000, 64, 0)).is_wilderness());

        let owner = UserId::new();
        let shop = create(&manager, ClaimType::Basic, Some(owner), Some(admin), (500, 500), (520, 520)).await;
        assert_eq!(manager.claim_at(BlockPos::new(510, 64, 510)).id(), shop);

        let outside = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(owner)
            .bounds(BlockPos::new(999_990, 0, 0), BlockPos::new(1_000_010, 255, 20))
            .build()
            .unwrap();
        assert_eq!(
            manager.create(outside).await.result_type(),
            ClaimResultType::OverlappingClaim
        );
    }

    #[tokio::test]
    async fn test_registry_lookups() {
        let (engine, manager) = setup().await;
        let owner = UserId::new();
        let id = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (10, 10)).await;

        assert_eq!(engine.registry().get_claim(id).unwrap().id(), id);
        assert_eq!(engine.registry().all_claims(manager.world()).len(), 1);
        assert_eq!(engine.registry().player_claims(owner).len(), 1);
        assert!(engine.registry().player_claims(UserId::new()).is_empty());
    }
}

// =============================================================================
// Resize, type change and transfer
// =============================================================================

mod modification {
    use super::*;

    #[tokio::test]
    async fn test_resize_excluding_child_rejected() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        let parent = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (50, 50)).await;
        create(&manager, ClaimType::Subdivision, None, Some(parent), (30, 30), (40, 40)).await;
        let before = *manager.get(parent).unwrap().bounds();

        let result = manager
            .resize(parent, Bounds::from_coords(0, 20, 0, 255, 0, 20))
            .await;
        assert!(!result.successful());
        assert_eq!(*manager.get(parent).unwrap().bounds(), before);
    }

    #[tokio::test]
    async fn test_resize_moves_index() {
        let (_engine, manager) = setup().await;
        let id = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (10, 10)).await;
        let result = manager
            .resize(id, Bounds::from_coords(0, 30, 0, 255, 0, 30))
            .await;
        assert!(result.successful(), "{:?}", result.message());
        assert_eq!(manager.claim_at(BlockPos::new(25, 64, 25)).id(), id);
    }

    #[tokio::test]
    async fn test_wilderness_is_immutable() {
        let (_engine, manager) = setup().await;
        let wilderness = manager.wilderness().id();

        let changed = manager
            .change_type(wilderness, ClaimType::Basic, Some(UserId::new()))
            .await;
        assert_eq!(changed.result_type(), ClaimResultType::WrongClaimType);
        assert_eq!(
            manager.delete(wilderness, true).await.result_type(),
            ClaimResultType::WrongClaimType
        );
        assert_eq!(
            manager.transfer_owner(wilderness, UserId::new()).await.result_type(),
            ClaimResultType::WrongClaimType
        );
        assert!(manager.wilderness().is_wilderness());
    }

    #[tokio::test]
    async fn test_change_to_admin_clears_owner() {
        let (_engine, manager) = setup().await;
        let id = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (10, 10)).await;
        let result = manager.change_type(id, ClaimType::Admin, None).await;
        assert!(result.successful(), "{:?}", result.message());
        let claim = manager.get(id).unwrap();
        assert!(claim.is_admin());
        assert_eq!(claim.owner(), None);

        // Back to basic needs an owner
        let result = manager.change_type(id, ClaimType::Basic, None).await;
        assert_eq!(result.result_type(), ClaimResultType::RequiresOwner);
        let owner = UserId::new();
        let result = manager.change_type(id, ClaimType::Basic, Some(owner)).await;
        assert!(result.successful());
        assert_eq!(manager.get(id).unwrap().owner(), Some(owner));
    }

    #[tokio::test]
    async fn test_change_type_rejects_town_under_basic() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        let parent = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (50, 50)).await;
        let child = create(&manager, ClaimType::Subdivision, None, Some(parent), (10, 10), (20, 20)).await;

        let result = manager.change_type(child, ClaimType::Town, Some(owner)).await;
        assert_eq!(result.result_type(), ClaimResultType::WrongClaimType);
        assert_eq!(manager.get(child).unwrap().claim_type(), ClaimType::Subdivision);
    }

    #[tokio::test]
    async fn test_concurrent_resizes_cannot_both_claim_the_gap() {
        let (_engine, manager) = setup().await;
        let west = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (10, 10)).await;
        let east = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (30, 0), (40, 10)).await;

        let (grow_west, grow_east) = tokio::join!(
            manager.resize(west, Bounds::from_coords(0, 25, 0, 255, 0, 10)),
            manager.resize(east, Bounds::from_coords(20, 40, 0, 255, 0, 10)),
        );
        let outcomes = [grow_west.result_type(), grow_east.result_type()];
        assert_eq!(outcomes.iter().filter(|t| **t == ClaimResultType::Success).count(), 1);
        assert!(outcomes.contains(&ClaimResultType::OverlappingClaim));

        let snapshot = manager.snapshot();
        let (w, e) = (snapshot.get(west).unwrap(), snapshot.get(east).unwrap());
        assert!(!w.bounds().intersects(e.bounds(), false));
    }

    #[tokio::test]
    async fn test_transfer_owner() {
        let (engine, manager) = setup().await;
        let old = UserId::new();
        let new = UserId::new();
        let id = create(&manager, ClaimType::Basic, Some(old), None, (0, 0), (10, 10)).await;

        assert!(manager.transfer_owner(id, new).await.successful());
        assert_eq!(manager.get(id).unwrap().owner(), Some(new));
        assert!(engine.registry().player_claims(old).is_empty());
    }

    #[tokio::test]
    async fn test_update_attributes() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        let first = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (10, 10)).await;
        let second = create(&manager, ClaimType::Basic, Some(owner), None, (50, 50), (60, 60)).await;

        let result = manager
            .update(
                first,
                ClaimUpdate::new()
                    .display_name(Some("Home"))
                    .friendly_id(Some("home"))
                    .deny_messages(false),
            )
            .await;
        assert!(result.successful(), "{:?}", result.message());
        let claim = manager.get(first).unwrap();
        assert_eq!(claim.display_name(), Some("Home"));
        assert_eq!(claim.friendly_id(), Some("home"));
        assert!(!claim.deny_messages());

        let taken = manager
            .update(second, ClaimUpdate::new().friendly_id(Some("HOME")))
            .await;
        assert!(!taken.successful());
        assert_eq!(manager.get(second).unwrap().friendly_id(), None);
    }

    #[tokio::test]
    async fn test_hook_veto_leaves_state_unchanged() {
        let (engine, manager) = setup().await;
        let id = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (10, 10)).await;
        engine.registry().events().register(Arc::new(
            FnHook::new("freeze", |_| HookOutcome::cancel("frozen")).on(ClaimEventKind::Resize),
        ));

        let result = manager
            .resize(id, Bounds::from_coords(0, 30, 0, 255, 0, 30))
            .await;
        assert_eq!(result.result_type(), ClaimResultType::ClaimEventCancelled);
        assert_eq!(result.message(), Some("frozen"));
        assert!(manager.claim_at(BlockPos::new(25, 64, 25)).is_wilderness());
    }
}

// =============================================================================
// Hooks that try to mutate while dispatching
// =============================================================================

mod reentrancy {
    use super::*;

    /// Registers a before-hook on `kind` that runs `mutate` synchronously
    /// and records the result type it got back
    fn reenter_on<F>(
        engine: &Engine,
        kind: ClaimEventKind,
        mutate: F,
    ) -> Arc<Mutex<Option<ClaimResultType>>>
    where
        F: Fn() -> ClaimResultType + Send + Sync + 'static,
    {
        let seen = Arc::new(Mutex::new(None));
        let record = Arc::clone(&seen);
        engine.registry().events().register(Arc::new(
            FnHook::new("reenter", move |_| {
                *record.lock().unwrap() = Some(mutate());
                HookOutcome::Continue
            })
            .on(kind),
        ));
        seen
    }

    #[tokio::test]
    async fn test_touch_from_update_hook_is_refused() {
        let (engine, manager) = setup().await;
        let id = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (10, 10)).await;
        let inner = Arc::clone(&manager);
        let seen = reenter_on(&engine, ClaimEventKind::Update, move || {
            futures::executor::block_on(inner.touch(id)).result_type()
        });

        let update = manager.update(id, ClaimUpdate::new().display_name(Some("Keep")));
        let result = tokio::time::timeout(Duration::from_secs(5), update)
            .await
            .expect("update finished");
        assert!(result.successful());
        assert_eq!(*seen.lock().unwrap(), Some(ClaimResultType::Failure));
        assert_eq!(manager.get(id).unwrap().display_name(), Some("Keep"));
    }

    #[tokio::test]
    async fn test_delete_children_from_remove_hook_is_refused() {
        let (engine, manager) = setup().await;
        let owner = UserId::new();
        let parent = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (50, 50)).await;
        let child = create(&manager, ClaimType::Subdivision, None, Some(parent), (10, 10), (20, 20)).await;
        let inner = Arc::clone(&manager);
        let seen = reenter_on(&engine, ClaimEventKind::Remove, move || {
            futures::executor::block_on(inner.delete_children(parent, None)).result_type()
        });

        let result = tokio::time::timeout(Duration::from_secs(5), manager.delete_child(parent, child))
            .await
            .expect("delete finished");
        assert!(result.successful());
        assert_eq!(*seen.lock().unwrap(), Some(ClaimResultType::Failure));
        assert!(manager.get(parent).is_some());
    }

    #[tokio::test]
    async fn test_hook_cannot_touch_other_claims_either() {
        let (engine, manager) = setup().await;
        let owner = UserId::new();
        let id = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (10, 10)).await;
        let other = create(&manager, ClaimType::Basic, Some(owner), None, (50, 50), (60, 60)).await;
        let inner = Arc::clone(&manager);
        let seen = reenter_on(&engine, ClaimEventKind::Resize, move || {
            futures::executor::block_on(inner.touch(other)).result_type()
        });

        let resize = manager.resize(id, Bounds::from_coords(0, 20, 0, 255, 0, 20));
        let result = tokio::time::timeout(Duration::from_secs(5), resize)
            .await
            .expect("resize finished");
        assert!(result.successful());
        assert_eq!(*seen.lock().unwrap(), Some(ClaimResultType::Failure));

        // Outside of hook dispatch the same call goes through
        assert!(manager.touch(other).await.successful());
    }
}

// =============================================================================
// Removal
// =============================================================================

mod removal {
    use super::*;

    #[tokio::test]
    async fn test_delete_without_cascade_refuses_parent() {
        let (_engine, manager) = setup().await;
        let parent = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (50, 50)).await;
        create(&manager, ClaimType::Subdivision, None, Some(parent), (10, 10), (20, 20)).await;

        assert!(!manager.delete(parent, false).await.successful());
        let result = manager.delete(parent, true).await;
        assert!(result.successful());
        assert_eq!(result.claims().len(), 2);
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_delete_children_reports_vetoed_subset() {
        let (engine, manager) = setup().await;
        let owner = UserId::new();
        let parent = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (100, 100)).await;
        let kept = create(&manager, ClaimType::Subdivision, None, Some(parent), (0, 0), (10, 10)).await;
        let gone = create(&manager, ClaimType::Subdivision, None, Some(parent), (20, 20), (30, 30)).await;
        veto_removal_of(&engine, kept);

        let result = manager.delete_children(parent, None).await;
        assert_eq!(result.result_type(), ClaimResultType::ClaimEventCancelled);
        assert_eq!(result.vetoed(), &[kept]);
        assert_eq!(result.claims().len(), 1);
        assert_eq!(result.claims()[0].id(), gone);
        assert!(manager.get(kept).is_some());
        assert!(manager.get(gone).is_none());
    }

    #[tokio::test]
    async fn test_vetoed_child_keeps_ancestors() {
        let (engine, manager) = setup().await;
        let parent = create(&manager, ClaimType::Basic, Some(UserId::new()), None, (0, 0), (100, 100)).await;
        let child = create(&manager, ClaimType::Subdivision, None, Some(parent), (0, 0), (10, 10)).await;
        veto_removal_of(&engine, child);

        let result = manager.delete(parent, true).await;
        assert!(!result.successful());
        assert!(manager.get(parent).is_some());
        assert!(manager.get(child).is_some());
    }

    #[tokio::test]
    async fn test_delete_child_requires_direct_child() {
        let (_engine, manager) = setup().await;
        let owner = UserId::new();
        let a = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (50, 50)).await;
        let b = create(&manager, ClaimType::Basic, Some(owner), None, (100, 100), (150, 150)).await;
        let child = create(&manager, ClaimType::Subdivision, None, Some(a), (10, 10), (20, 20)).await;

        assert_eq!(
            manager.delete_child(b, child).await.result_type(),
            ClaimResultType::ClaimNotFound
        );
        assert!(manager.delete_child(a, child).await.successful());
    }
}

// =============================================================================
// Economy mode and storage rollback
// =============================================================================

mod economy {
    use super::*;

    async fn economy_setup(balance: f64) -> (Engine, Arc<ClaimManager>, Arc<MemoryEconomy>, UserId) {
        let mut config = config();
        config.engine.economy_mode = true;
        config.engine.economy_block_cost = 1.0;
        config.engine.economy_return_rate = 0.5;
        let economy = Arc::new(MemoryEconomy::new());
        let owner = UserId::new();
        economy.open_account(owner, balance);
        let providers = Providers::in_memory()
            .with_player_data(Arc::new(ConfiguredPlayerData::from_config(&config)))
            .with_economy(economy.clone());
        let (engine, manager) = world_engine(config, providers).await;
        (engine, manager, economy, owner)
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let (_engine, manager, _economy, owner) = economy_setup(10.0).await;
        let draft = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(owner)
            .bounds(BlockPos::new(0, 0, 0), BlockPos::new(9, 255, 9))
            .build()
            .unwrap();
        assert_eq!(
            manager.create(draft).await.result_type(),
            ClaimResultType::EconomyNotEnoughFunds
        );
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_missing_account() {
        let (_engine, manager, _economy, _owner) = economy_setup(1000.0).await;
        let draft = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(UserId::new())
            .bounds(BlockPos::new(0, 0, 0), BlockPos::new(9, 255, 9))
            .build()
            .unwrap();
        assert_eq!(
            manager.create(draft).await.result_type(),
            ClaimResultType::EconomyAccountNotFound
        );
    }

    #[tokio::test]
    async fn test_failed_storage_delete_pays_no_refund() {
        let mut config = config();
        config.engine.economy_mode = true;
        config.engine.economy_block_cost = 1.0;
        config.engine.economy_return_rate = 0.5;
        let economy = Arc::new(MemoryEconomy::new());
        let storage = Arc::new(MemoryStorage::new());
        let owner = UserId::new();
        economy.open_account(owner, 1000.0);
        let providers = Providers::in_memory()
            .with_player_data(Arc::new(ConfiguredPlayerData::from_config(&config)))
            .with_economy(economy.clone())
            .with_storage(storage.clone());
        let (_engine, manager) = world_engine(config, providers).await;

        let id = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (9, 9)).await;
        assert_eq!(economy.balance(owner).await.unwrap(), 900.0);

        storage.set_available(false);
        for _ in 0..3 {
            assert_eq!(manager.delete(id, false).await.result_type(), ClaimResultType::Failure);
            assert!(manager.get(id).is_some());
            assert_eq!(economy.balance(owner).await.unwrap(), 900.0);
        }

        storage.set_available(true);
        assert!(manager.delete(id, false).await.successful());
        assert_eq!(economy.balance(owner).await.unwrap(), 950.0);
    }

    #[tokio::test]
    async fn test_failed_refund_keeps_claim() {
        let (_engine, manager, economy, owner) = economy_setup(1000.0).await;
        let id = create(&manager, ClaimType::Basic, Some(owner), None, (0, 0), (9, 9)).await;
        economy.set_fail_deposit(true);

        assert_eq!(
            manager.delete(id, false).await.result_type(),
            ClaimResultType::EconomyDepositFailure
        );
        assert!(manager.get(id).is_some());
        assert_eq!(economy.balance(owner).await.unwrap(), 900.0);
    }

    #[tokio::test]
    async fn test_storage_failure_rolls_back() {
        let storage = Arc::new(MemoryStorage::new());
        let providers = Providers::in_memory().with_storage(storage.clone());
        let (_engine, manager) = world_engine(config(), providers).await;
        storage.set_available(false);

        let draft = ClaimBuilder::new(manager.world(), ClaimType::Basic)
            .owner(UserId::new())
            .bounds(BlockPos::new(0, 0, 0), BlockPos::new(9, 255, 9))
            .build()
            .unwrap();
        assert!(!manager.create(draft).await.successful());
        assert!(manager.claim_at(BlockPos::new(5, 64, 5)).is_wilderness());
        assert!(manager.snapshot().is_empty());
    }
}

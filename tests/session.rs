#![allow(non_snake_case)]
use dungeon_claim::{
    ClaimEngine,
    Error,
    binder::{
        PENDING_READOUT,
        project,
    },
    collab::in_memory::{
        InMemoryWallet,
        InMemoryWorld,
    },
    config::EngineConfig,
    test_helpers::*,
    types::{
        DiscreteItem,
        FungibleKind,
        SessionState,
        TokenAmount,
    },
};

#[tokio::test]
async fn connect__loads_items_and_balance_immediately() {
    // given
    let ctx = TestContext::new(alice());
    ctx.world.grant_item(&alice(), DiscreteItem::Gem);
    ctx.world
        .set_balance(FungibleKind::Gold, &alice(), TokenAmount(1_000));

    // when
    let identity = ctx.engine.connect().await.unwrap();

    // then
    assert_eq!(identity, alice());
    let snapshot = ctx.engine.snapshot();
    assert_eq!(snapshot.session, SessionState::Connected(alice()));
    assert!(snapshot.inventory.loaded);
    assert!(snapshot.inventory.owns(DiscreteItem::Gem));
    assert_eq!(
        snapshot.inventory.balance(FungibleKind::Gold),
        Some(TokenAmount(1_000))
    );
    assert_eq!(ctx.backend.inventory_calls(), 1);
    assert_eq!(ctx.ledger.balance_reads(), 1);
}

#[tokio::test]
async fn connect__rejected_prompt_leaves_session_disconnected() {
    let ctx = TestContext::new(alice());
    ctx.wallet.fail_next_access(Error::UserRejected);

    let result = ctx.engine.connect().await;

    assert_eq!(result, Err(Error::UserRejected));
    assert_eq!(ctx.engine.snapshot().session, SessionState::Disconnected);
    assert_eq!(ctx.backend.total_calls(), 0);
}

#[tokio::test]
async fn connect__without_provider_fails_unavailable() {
    let world = InMemoryWorld::new();
    let engine = ClaimEngine::<InMemoryWallet, _, _>::new(
        None,
        world.backend(),
        world.ledger(),
        EngineConfig::default(),
    );

    let result = engine.connect().await;

    assert_eq!(result, Err(Error::ProviderUnavailable));
    assert_eq!(engine.current_identity(), None);
}

#[tokio::test]
async fn connect__failed_initial_load_is_not_fatal() {
    let ctx = TestContext::new(alice());
    ctx.backend
        .fail_next_inventory(Error::BackendError("inventory offline".to_string()));

    let result = ctx.engine.connect().await;

    assert_eq!(result, Ok(alice()));
    let snapshot = ctx.engine.snapshot();
    assert!(!snapshot.inventory.loaded);
    assert_eq!(
        snapshot.inventory.balance(FungibleKind::Gold),
        Some(TokenAmount::ZERO)
    );
}

#[tokio::test]
async fn connect__switch_reported_during_prompt_is_not_overwritten() {
    // given
    let ctx = TestContext::new(alice());
    ctx.world.grant_item(&bob(), DiscreteItem::Gem);
    let gate = ctx.wallet.hold_next_access();

    // when
    let (connected, _) = tokio::join!(ctx.engine.connect(), async {
        ctx.engine.on_account_changed(Some(bob())).await;
        gate.release();
    });

    // then
    assert_eq!(connected, Ok(bob()));
    let snapshot = ctx.engine.snapshot();
    assert_eq!(snapshot.session, SessionState::Connected(bob()));
    assert_eq!(snapshot.inventory.owner, Some(bob()));
    assert!(snapshot.inventory.owns(DiscreteItem::Gem));
}

#[tokio::test]
async fn init_silent__resumes_authorized_account_and_reconciles() {
    // given
    let ctx = TestContext::new(alice());
    ctx.wallet.pre_authorize();
    ctx.world.grant_item(&alice(), DiscreteItem::Sword);

    // when
    let identity = ctx.engine.init_silent().await;

    // then
    assert_eq!(identity, Some(alice()));
    assert_eq!(ctx.wallet.access_requests(), 0);
    assert!(ctx.engine.snapshot().inventory.owns(DiscreteItem::Sword));
}

#[tokio::test]
async fn init_silent__unauthorized_origin_stays_disconnected_without_prompt() {
    let ctx = TestContext::new(alice());

    let identity = ctx.engine.init_silent().await;

    assert_eq!(identity, None);
    assert_eq!(ctx.wallet.access_requests(), 0);
    assert_eq!(ctx.engine.snapshot().session, SessionState::Disconnected);
    assert_eq!(ctx.backend.total_calls(), 0);
}

#[tokio::test]
async fn on_account_changed__cuts_over_to_empty_state_pending_refresh() {
    // given
    let ctx = TestContext::new(alice());
    ctx.world.grant_item(&alice(), DiscreteItem::Sword);
    ctx.world
        .set_balance(FungibleKind::Gold, &alice(), TokenAmount(70));
    ctx.world.grant_item(&bob(), DiscreteItem::Potion);
    ctx.engine.connect().await.unwrap();
    let items_gate = ctx.backend.hold_next_inventory();
    let balance_gate = ctx.ledger.hold_next_balance();

    // when
    let (_, mid_flight) = tokio::join!(ctx.engine.on_account_changed(Some(bob())), async {
        let snapshot = ctx.engine.snapshot();
        items_gate.release();
        balance_gate.release();
        snapshot
    });

    // then
    assert_eq!(mid_flight.session, SessionState::Connected(bob()));
    assert_eq!(mid_flight.inventory.owner, Some(bob()));
    assert!(mid_flight.inventory.entries.is_empty());
    assert_eq!(mid_flight.inventory.balance(FungibleKind::Gold), None);
    assert!(!mid_flight.inventory.loaded);
    let panel = project(&mid_flight, 18);
    assert_eq!(panel.wallet_status, "Connected: 0xb0b");
    assert!(panel.items.iter().all(|control| control.enabled));
    assert_eq!(panel.readout(FungibleKind::Gold).unwrap().text, PENDING_READOUT);

    let settled = ctx.engine.snapshot();
    assert!(settled.inventory.owns(DiscreteItem::Potion));
    assert!(!settled.inventory.owns(DiscreteItem::Sword));
    assert_eq!(
        settled.inventory.balance(FungibleKind::Gold),
        Some(TokenAmount::ZERO)
    );
}

#[tokio::test]
async fn on_account_changed__none_disconnects_and_clears_cache() {
    let ctx = TestContext::new(alice());
    ctx.world.grant_item(&alice(), DiscreteItem::Gem);
    ctx.engine.connect().await.unwrap();

    let change = ctx.engine.on_account_changed(None).await.unwrap();

    assert_eq!(change.current, SessionState::Disconnected);
    let snapshot = ctx.engine.snapshot();
    assert_eq!(snapshot.inventory.owner, None);
    assert!(snapshot.inventory.entries.is_empty());
    assert_eq!(project(&snapshot, 18).wallet_status, "Not connected");
}

#[tokio::test]
async fn on_account_changed__same_account_does_not_refetch() {
    let ctx = TestContext::connected(alice()).await;
    let calls = ctx.backend.inventory_calls();

    let change = ctx.engine.on_account_changed(Some(alice())).await;

    assert_eq!(change, None);
    assert_eq!(ctx.backend.inventory_calls(), calls);
}

#[tokio::test]
async fn disconnect__is_observed_by_display_subscribers_before_returning() {
    let ctx = TestContext::connected(alice()).await;
    let display = ctx.engine.subscribe_display();

    ctx.engine.disconnect();

    assert!(display.has_changed().unwrap());
    assert_eq!(ctx.engine.snapshot().session, SessionState::Disconnected);
    assert!(ctx.engine.snapshot().inventory.entries.is_empty());
}

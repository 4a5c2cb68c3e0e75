use reclaim_core::{DeliveryStatus, Gateway, Resource};
use reclaim_sync::{
    BroadcastChannel, CacheTtlConfig, CachedGateway, CycleOutcome, PollingConfig,
    RefreshOrchestrator, SharedStore, StorageBroadcast, REFRESH_MARKER_KEY,
};
use reclaim_test_utils::{fixtures, MockGateway, MutationCall};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

fn quiet_polling() -> PollingConfig {
    PollingConfig {
        delivery_interval_ms: 3_600_000,
        admin_interval_ms: 3_600_000,
        user_interval_ms: 3_600_000,
        max_interval_ms: 3_600_000,
        activity_threshold_ms: 3_600_000,
        refresh_on_start: false,
    }
}

fn tab<G: Gateway + 'static>(store: &Arc<SharedStore>, gateway: G) -> RefreshOrchestrator<G> {
    RefreshOrchestrator::new(
        gateway,
        Arc::new(StorageBroadcast::new(store.clone())),
        quiet_polling(),
    )
}

/// Subscribes immediately; the returned future resolves on the next cycle.
fn wait_for_update<G>(orchestrator: &RefreshOrchestrator<G>) -> impl Future<Output = ()> {
    let mut updates = orchestrator.watch_last_update();
    async move {
        tokio::time::timeout(Duration::from_secs(5), updates.changed())
            .await
            .expect("refresh within timeout")
            .expect("orchestrator alive");
    }
}

#[tokio::test]
async fn marker_triggers_exactly_one_cycle_in_other_tab() {
    let store = Arc::new(SharedStore::new());
    let gateway_a = Arc::new(fixtures::seeded_gateway());
    let gateway_b = Arc::new(fixtures::seeded_gateway());
    let tab_a = tab(&store, gateway_a.clone());
    let tab_b = tab(&store, gateway_b.clone());
    tab_a.set_identity(Some(fixtures::delivery_identity())).await;
    tab_b.set_identity(Some(fixtures::delivery_identity())).await;

    let updated = wait_for_update(&tab_b);
    tab_a.trigger_cross_tab_refresh().unwrap();
    updated.await;

    // Give a duplicate delivery a chance to show up before counting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(tab_b.metrics().cycles_started, 1);
    assert_eq!(gateway_b.calls(Resource::Assignments), 1);
    assert_eq!(tab_b.collections().assignments().len(), 1);
    assert_eq!(gateway_a.total_calls(), 0);
    assert_eq!(store.get(REFRESH_MARKER_KEY).unwrap(), None);

    tab_a.shutdown().await;
    tab_b.shutdown().await;
}

#[tokio::test]
async fn mutation_in_one_tab_refreshes_both() {
    let store = Arc::new(SharedStore::new());
    let gateway_a = Arc::new(fixtures::seeded_gateway());
    let gateway_b = Arc::new(fixtures::seeded_gateway());
    let tab_a = tab(&store, gateway_a.clone());
    let tab_b = tab(&store, gateway_b.clone());
    tab_a.set_identity(Some(fixtures::delivery_identity())).await;
    tab_b.set_identity(Some(fixtures::delivery_identity())).await;

    let updated = wait_for_update(&tab_b);
    tab_a
        .update_status(102, DeliveryStatus::PickedUp)
        .await
        .unwrap();
    updated.await;

    assert_eq!(
        gateway_a.mutations(),
        vec![MutationCall::UpdateStatus {
            booking_id: 102,
            status: DeliveryStatus::PickedUp,
        }]
    );
    assert_eq!(gateway_a.calls(Resource::Assignments), 1);
    assert_eq!(gateway_b.calls(Resource::Assignments), 1);
    assert_eq!(tab_a.metrics().cross_tab_emitted, 1);
    assert_eq!(tab_b.metrics().cross_tab_triggers, 1);
}

#[tokio::test]
async fn cross_tab_refresh_bypasses_cache() {
    let store = Arc::new(SharedStore::new());
    let shared = Arc::new(fixtures::seeded_gateway());
    let cached_b = CachedGateway::from_arc(shared.clone(), &CacheTtlConfig::default());
    let tab_a = tab(&store, fixtures::seeded_gateway());
    let tab_b = tab(&store, cached_b);
    tab_a.set_identity(Some(fixtures::user_identity())).await;
    tab_b.set_identity(Some(fixtures::user_identity())).await;

    assert!(matches!(
        tab_b.refresh_all().await,
        CycleOutcome::Completed { refreshed: 2, .. }
    ));
    shared.set_points_balance(30);

    let updated = wait_for_update(&tab_b);
    tab_a.trigger_cross_tab_refresh().unwrap();
    updated.await;

    assert_eq!(shared.calls(Resource::PointsBalance), 2);
    assert_eq!(
        tab_b.collections().points_balance().map(|p| p.points_balance),
        Some(30)
    );
}

#[tokio::test]
async fn teardown_leaves_no_tasks_or_listeners() {
    let store = Arc::new(SharedStore::new());
    let tab_a = tab(&store, Arc::new(MockGateway::new()));
    let tab_b = tab(&store, Arc::new(MockGateway::new()));
    tab_a.set_identity(Some(fixtures::admin_identity())).await;
    tab_b.set_identity(Some(fixtures::admin_identity())).await;
    assert_eq!(store.listener_count(), 2);

    tab_a.set_identity(None).await;
    assert_eq!(tab_a.active_tasks().await, 0);
    assert_eq!(tab_a.channel().listener_count(), 0);
    assert_eq!(store.listener_count(), 1);

    tab_b.shutdown().await;
    assert_eq!(tab_b.active_tasks().await, 0);
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn role_change_restarts_session_with_new_scope() {
    let store = Arc::new(SharedStore::new());
    let gateway = Arc::new(fixtures::seeded_gateway());
    let orchestrator = tab(&store, gateway.clone());

    orchestrator
        .set_identity(Some(fixtures::user_identity()))
        .await;
    orchestrator.refresh_all().await;
    assert_eq!(orchestrator.collections().bookings().len(), 3);

    orchestrator
        .set_identity(Some(fixtures::admin_identity()))
        .await;
    assert!(orchestrator.collections().bookings().is_empty());
    assert_eq!(store.listener_count(), 1);

    orchestrator.refresh_all().await;
    assert_eq!(orchestrator.collections().pickups().len(), 2);
    assert_eq!(gateway.calls(Resource::Bookings), 1);

    orchestrator.shutdown().await;
}

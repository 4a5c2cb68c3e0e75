//! Reclaim sync entry point.
//!
//! Binds one orchestrator to the configured identity and keeps its
//! collections fresh until Ctrl-C or until the backend rejects the token.

use std::sync::Arc;

use reclaim_core::{Gateway, ReclaimError};
use reclaim_sync::{
    init_tracing, CachedGateway, RefreshOrchestrator, RestGateway, SharedStore, StorageBroadcast,
    SyncConfig,
};

#[tokio::main]
async fn main() -> Result<(), ReclaimError> {
    let config = SyncConfig::load()?;
    init_tracing(config.log_format);

    let rest = RestGateway::new(&config)?;
    let gateway: Arc<dyn Gateway> = if config.cache.enabled {
        Arc::new(CachedGateway::new(rest, &config.cache))
    } else {
        Arc::new(rest)
    };

    let store = Arc::new(SharedStore::new());
    let channel = Arc::new(StorageBroadcast::with_key(
        store,
        config.broadcast.marker_key.clone(),
    ));
    let orchestrator = RefreshOrchestrator::new(gateway, channel, config.polling.clone());
    orchestrator
        .set_identity(Some(config.auth.identity()))
        .await;

    let mut updates = orchestrator.watch_last_update();
    let mut auth_expired = orchestrator.watch_auth_expired();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    tracing::error!(error = %err, "failed to listen for Ctrl-C");
                }
                tracing::info!("shutdown requested");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = orchestrator.collections().summary();
                tracing::info!(
                    assignments = summary.assignments,
                    pickups = summary.pickups,
                    bookings = summary.bookings,
                    has_dashboard = summary.has_dashboard,
                    points_balance = ?summary.points_balance,
                    "collections refreshed"
                );
            }
            changed = auth_expired.changed() => {
                if changed.is_err() {
                    break;
                }
                let expired = *auth_expired.borrow_and_update();
                if expired {
                    tracing::warn!("bearer token rejected, ending session");
                    break;
                }
            }
        }
    }

    orchestrator.shutdown().await;
    let metrics = orchestrator.metrics();
    tracing::info!(
        cycles_completed = metrics.cycles_completed,
        cycles_skipped = metrics.cycles_skipped,
        resource_failures = metrics.resource_failures,
        "reclaim-sync stopped"
    );
    Ok(())
}

//! Reclaim Sync - Client-side Data Freshness
//!
//! Keeps role-scoped views of backend state current without flooding the
//! backend:
//! - [`poller`]: activity- and visibility-aware polling schedule
//! - [`orchestrator`]: per-role refresh cycles with a reentrancy guard
//! - [`broadcast`]: cross-tab refresh signalling through a shared store
//! - [`cached_gateway`]: per-resource TTL caching of gateway reads
//! - [`rest`]: the HTTP gateway

pub mod activity;
pub mod broadcast;
pub mod cached_gateway;
pub mod collections;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod rest;
pub mod telemetry;

pub use activity::{ActivitySignal, ActivityTracker, PollingState};
pub use broadcast::{
    BroadcastChannel, LocalBroadcast, LocalBus, RefreshSignal, SharedStore, StorageBroadcast,
    StorageEvent, Subscription, TabId, REFRESH_MARKER_KEY,
};
pub use cached_gateway::CachedGateway;
pub use collections::{CollectionSummary, SharedCollections};
pub use config::{AuthConfig, BroadcastConfig, CacheTtlConfig, PollingConfig, SyncConfig};
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};
pub use orchestrator::{CycleOutcome, RefreshOrchestrator, ResourceOutcome};
pub use poller::{AdaptivePoller, PollerConfig, PollerHandle, TickPlan, MIN_INTERVAL};
pub use rest::RestGateway;
pub use telemetry::{init_tracing, LogFormat, LOG_FILTER_ENV};

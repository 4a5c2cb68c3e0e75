//! Role-scoped refresh orchestration.
//!
//! A [`RefreshOrchestrator`] is bound to at most one identity at a time.
//! While bound it owns two background tasks:
//!
//! 1. An [`AdaptivePoller`] running [`RefreshOrchestrator::refresh_all`] at
//!    the role's base interval
//! 2. A listener that runs a refresh whenever another tab publishes a
//!    refresh marker
//!
//! A refresh cycle fans out to the resources the role owns, concurrently,
//! and replaces each collection that refreshed successfully. Cycles never
//! overlap: a cycle requested while another for the same identity is in
//! flight is dropped, and so are cross-tab markers that arrive meanwhile.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = RefreshOrchestrator::new(gateway, channel, PollingConfig::default());
//! orchestrator.set_identity(Some(Identity::new("ravi", Role::Delivery))).await;
//! let assignments = orchestrator.collections().assignments();
//! orchestrator.shutdown().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use reclaim_core::{
    Assignment, Booking, BookingDraft, DashboardStats, DeliveryAssignmentRequest, DeliveryStatus,
    Gateway, GatewayError, Identity, MutationAck, Pickup, PointsBalance, RecordId, RedeemRequest,
    ReclaimResult, Resource, Role,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::activity::ActivityTracker;
use crate::broadcast::{BroadcastChannel, RefreshSignal, Subscription};
use crate::collections::SharedCollections;
use crate::config::PollingConfig;
use crate::metrics::{RefreshMetrics, RefreshMetricsSnapshot};
use crate::poller::{AdaptivePoller, PollerHandle};

/// Result of one [`RefreshOrchestrator::refresh_all`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every eligible refresh settled.
    Completed { refreshed: usize, failed: usize },
    /// Another cycle was already in flight.
    Skipped,
    /// No identity is bound.
    NoIdentity,
}

/// Result of refreshing a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOutcome {
    Refreshed,
    /// The gateway call failed; the previous collection was kept.
    Failed,
    /// The bound role does not own the resource.
    NotOwned,
    NoIdentity,
    /// The identity changed while the call was in flight.
    Discarded,
}

enum Fresh {
    Assignments(Vec<Assignment>),
    Pickups(Vec<Pickup>),
    Dashboard(DashboardStats),
    Bookings(Vec<Booking>),
    PointsBalance(PointsBalance),
}

/// Holds the reentrancy slot for one identity generation and releases it
/// when the cycle ends, however it ends.
///
/// The slot stores `generation + 1`, or 0 when free. A cycle left over from
/// an earlier identity never blocks the current one.
struct CycleGuard<'a> {
    slot: &'a AtomicU64,
    tag: u64,
}

impl<'a> CycleGuard<'a> {
    fn acquire(slot: &'a AtomicU64, generation: u64) -> Option<Self> {
        let tag = generation + 1;
        let mut current = slot.load(Ordering::Acquire);
        loop {
            if current >= tag {
                return None;
            }
            match slot.compare_exchange(current, tag, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Some(Self { slot, tag }),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.tag, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// State shared between the orchestrator and its background tasks.
struct RefreshCore<G> {
    gateway: G,
    channel: Arc<dyn BroadcastChannel>,
    identity: RwLock<Option<Identity>>,
    generation: AtomicU64,
    collections: SharedCollections,
    refreshing: AtomicU64,
    last_update: watch::Sender<Option<DateTime<Utc>>>,
    auth_expired: watch::Sender<bool>,
    metrics: RefreshMetrics,
}

impl<G: Gateway> RefreshCore<G> {
    fn session(&self) -> Option<(Identity, u64)> {
        let identity = self
            .identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some((identity, self.generation.load(Ordering::Acquire)))
    }

    fn bind(&self, identity: Option<Identity>) {
        let mut current = self.identity.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        *current = identity;
        self.collections.clear();
        self.auth_expired.send_replace(false);
    }

    /// Flag expired credentials so the session owner can react.
    fn observe<T>(&self, result: ReclaimResult<T>) -> ReclaimResult<T> {
        if let Err(err) = &result {
            if err.is_unauthorized() && !self.auth_expired.send_replace(true) {
                tracing::warn!(error = %err, "backend rejected session credentials");
            }
        }
        result
    }

    async fn fetch(&self, resource: Resource) -> ReclaimResult<Fresh> {
        let fresh = match resource {
            Resource::Assignments => Fresh::Assignments(self.gateway.assignments().await?),
            Resource::Pickups => Fresh::Pickups(self.gateway.pickups().await?),
            Resource::Dashboard => Fresh::Dashboard(self.gateway.dashboard().await?),
            Resource::Bookings => Fresh::Bookings(self.gateway.bookings().await?),
            Resource::PointsBalance => Fresh::PointsBalance(self.gateway.points_balance().await?),
        };
        Ok(fresh)
    }

    fn apply(&self, fresh: Fresh) {
        match fresh {
            Fresh::Assignments(rows) => self.collections.replace_assignments(rows),
            Fresh::Pickups(rows) => self.collections.replace_pickups(rows),
            Fresh::Dashboard(stats) => self.collections.replace_dashboard(stats),
            Fresh::Bookings(rows) => self.collections.replace_bookings(rows),
            Fresh::PointsBalance(balance) => self.collections.replace_points_balance(balance),
        }
    }

    async fn refresh_resource(&self, resource: Resource) -> ResourceOutcome {
        let Some((identity, generation)) = self.session() else {
            return ResourceOutcome::NoIdentity;
        };
        if !identity.role.owns(resource) {
            tracing::trace!(role = %identity.role, %resource, "resource not owned by role, skipping");
            return ResourceOutcome::NotOwned;
        }

        let result = self.observe(self.fetch(resource).await);

        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(%resource, "identity changed during refresh, dropping result");
            return ResourceOutcome::Discarded;
        }

        match result {
            Ok(fresh) => {
                self.apply(fresh);
                RefreshMetrics::incr(&self.metrics.resource_refreshes);
                ResourceOutcome::Refreshed
            }
            Err(err) => {
                RefreshMetrics::incr(&self.metrics.resource_failures);
                tracing::warn!(
                    role = %identity.role,
                    %resource,
                    error = %err,
                    "refresh failed, keeping previous data"
                );
                ResourceOutcome::Failed
            }
        }
    }

    async fn refresh_all(&self) -> CycleOutcome {
        let Some((identity, generation)) = self.session() else {
            return CycleOutcome::NoIdentity;
        };
        let Some(_guard) = CycleGuard::acquire(&self.refreshing, generation) else {
            RefreshMetrics::incr(&self.metrics.cycles_skipped);
            tracing::debug!(role = %identity.role, "refresh cycle already in flight, skipping");
            return CycleOutcome::Skipped;
        };

        RefreshMetrics::incr(&self.metrics.cycles_started);
        tracing::debug!(role = %identity.role, "refresh cycle started");

        let resources = identity.role.resources();
        let outcomes = join_all(resources.iter().map(|r| self.refresh_resource(*r))).await;
        let refreshed = outcomes
            .iter()
            .filter(|o| **o == ResourceOutcome::Refreshed)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| **o == ResourceOutcome::Failed)
            .count();

        RefreshMetrics::incr(&self.metrics.cycles_completed);
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(role = %identity.role, "refresh cycle outlived its identity");
            return CycleOutcome::Completed { refreshed, failed };
        }

        self.last_update.send_replace(Some(Utc::now()));
        tracing::debug!(role = %identity.role, refreshed, failed, "refresh cycle completed");

        CycleOutcome::Completed { refreshed, failed }
    }

    /// Role check for mutations, which are only offered to their owner.
    fn require_role(&self, role: Role, resource: Resource) -> ReclaimResult<()> {
        match self.session() {
            Some((identity, _)) if identity.role == role => Ok(()),
            Some((identity, _)) => Err(GatewayError::RoleMismatch {
                role: identity.role.to_string(),
                resource,
            }
            .into()),
            None => Err(GatewayError::RoleMismatch {
                role: "anonymous".to_string(),
                resource,
            }
            .into()),
        }
    }

    fn publish(&self) -> ReclaimResult<RefreshSignal> {
        let signal = self.channel.publish()?;
        RefreshMetrics::incr(&self.metrics.cross_tab_emitted);
        tracing::info!(tab = %self.channel.tab_id(), "cross-tab refresh triggered");
        Ok(signal)
    }
}

/// Reacts to refresh markers published by other tabs.
async fn listen<G: Gateway>(core: Arc<RefreshCore<G>>, mut subscription: Subscription) {
    while let Ok(signal) = subscription.recv().await {
        RefreshMetrics::incr(&core.metrics.cross_tab_triggers);
        tracing::debug!(origin = ?signal.origin, emitted_at_ms = signal.emitted_at_ms, "cross-tab refresh requested");
        // Another tab changed server state; cached reads predate it.
        core.gateway.discard_cached();
        core.refresh_all().await;

        // Markers that arrived mid-cycle collided with it and are dropped.
        let dropped = subscription.drain();
        if dropped > 0 {
            RefreshMetrics::add(&core.metrics.cycles_skipped, dropped as u64);
            tracing::debug!(dropped, "cross-tab refreshes collided with a cycle, dropped");
        }
    }
    tracing::debug!("broadcast channel closed, listener exiting");
}

/// Background work owned by a bound identity.
struct Session {
    identity: Identity,
    poller: PollerHandle,
    listener: JoinHandle<()>,
}

impl Session {
    fn active_tasks(&self) -> usize {
        usize::from(self.poller.is_running()) + usize::from(!self.listener.is_finished())
    }

    async fn stop(mut self) {
        self.poller.stop().await;
        self.listener.abort();
        let _ = (&mut self.listener).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Keeps role-scoped collections fresh for the bound identity.
pub struct RefreshOrchestrator<G> {
    core: Arc<RefreshCore<G>>,
    tracker: Arc<ActivityTracker>,
    polling: PollingConfig,
    session: Mutex<Option<Session>>,
}

impl<G: Gateway + 'static> RefreshOrchestrator<G> {
    pub fn new(gateway: G, channel: Arc<dyn BroadcastChannel>, polling: PollingConfig) -> Self {
        Self {
            core: Arc::new(RefreshCore {
                gateway,
                channel,
                identity: RwLock::new(None),
                generation: AtomicU64::new(0),
                collections: SharedCollections::new(),
                refreshing: AtomicU64::new(0),
                last_update: watch::Sender::new(None),
                auth_expired: watch::Sender::new(false),
                metrics: RefreshMetrics::new(),
            }),
            tracker: Arc::new(ActivityTracker::new()),
            polling,
            session: Mutex::new(None),
        }
    }

    /// Share an activity tracker with the view layer.
    pub fn with_activity_tracker(mut self, tracker: Arc<ActivityTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Bind the orchestrator to `identity`, or unbind it with `None`.
    ///
    /// Any previous polling and cross-tab listening is torn down first and
    /// the collections are cleared. Re-binding the current identity is a
    /// no-op.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref() {
            if identity.as_ref() == Some(&current.identity) {
                return;
            }
        }

        if let Some(previous) = session.take() {
            let Identity { username, role } = previous.identity.clone();
            previous.stop().await;
            tracing::info!(%username, %role, "refresh session ended");
        }

        self.core.bind(identity.clone());
        let Some(identity) = identity else {
            return;
        };

        // Subscribe before anything can publish on our behalf.
        let subscription = self.core.channel.subscribe();
        let listener = tokio::spawn(listen(self.core.clone(), subscription));

        let poller_config = self.polling.poller_config(identity.role);
        let core = self.core.clone();
        let poller = AdaptivePoller::new(poller_config, self.tracker.clone()).spawn(move || {
            let core = core.clone();
            async move {
                core.refresh_all().await;
            }
        });

        tracing::info!(
            username = %identity.username,
            role = %identity.role,
            base_interval_ms = poller_config.base_interval.as_millis() as u64,
            "refresh session started"
        );
        *session = Some(Session {
            identity,
            poller,
            listener,
        });
    }

    /// Unbind the identity and stop all background work.
    pub async fn shutdown(&self) {
        self.set_identity(None).await;
    }

    /// Background tasks currently alive (poller and listener).
    pub async fn active_tasks(&self) -> usize {
        self.session
            .lock()
            .await
            .as_ref()
            .map_or(0, Session::active_tasks)
    }

    pub fn identity(&self) -> Option<Identity> {
        self.core.session().map(|(identity, _)| identity)
    }

    pub async fn refresh_assignments(&self) -> ResourceOutcome {
        self.core.refresh_resource(Resource::Assignments).await
    }

    pub async fn refresh_pickups(&self) -> ResourceOutcome {
        self.core.refresh_resource(Resource::Pickups).await
    }

    pub async fn refresh_dashboard(&self) -> ResourceOutcome {
        self.core.refresh_resource(Resource::Dashboard).await
    }

    pub async fn refresh_bookings(&self) -> ResourceOutcome {
        self.core.refresh_resource(Resource::Bookings).await
    }

    pub async fn refresh_points(&self) -> ResourceOutcome {
        self.core.refresh_resource(Resource::PointsBalance).await
    }

    /// Run one refresh cycle for the bound role.
    pub async fn refresh_all(&self) -> CycleOutcome {
        self.core.refresh_all().await
    }

    /// Ask every other tab of this identity to refresh now.
    pub fn trigger_cross_tab_refresh(&self) -> ReclaimResult<RefreshSignal> {
        self.core.publish()
    }

    /// Announce a write to other tabs and refresh locally.
    async fn after_write(&self) {
        if let Err(err) = self.core.publish() {
            tracing::warn!(error = %err, "failed to publish refresh marker");
        }
        self.core.refresh_all().await;
    }

    /// Advance a delivery (delivery role).
    pub async fn update_status(
        &self,
        booking_id: RecordId,
        status: DeliveryStatus,
    ) -> ReclaimResult<MutationAck> {
        self.core.require_role(Role::Delivery, Resource::Assignments)?;
        let ack = self
            .core
            .observe(self.core.gateway.update_status(booking_id, status).await)?;
        tracing::info!(booking_id, %status, "delivery status updated");
        self.after_write().await;
        Ok(ack)
    }

    /// Assign a pickup to a delivery agent (admin role).
    pub async fn assign_delivery(
        &self,
        request: DeliveryAssignmentRequest,
    ) -> ReclaimResult<MutationAck> {
        self.core.require_role(Role::Admin, Resource::Pickups)?;
        let ack = self
            .core
            .observe(self.core.gateway.assign_delivery(request).await)?;
        tracing::info!(
            booking_id = request.booking_id,
            delivery_guy_id = request.delivery_guy_id,
            "delivery assigned"
        );
        self.after_write().await;
        Ok(ack)
    }

    /// Book a new pickup (user role).
    pub async fn create_booking(&self, draft: &BookingDraft) -> ReclaimResult<MutationAck> {
        self.core.require_role(Role::User, Resource::Bookings)?;
        let ack = self
            .core
            .observe(self.core.gateway.create_booking(draft).await)?;
        tracing::info!(category = %draft.category, "booking created");
        self.after_write().await;
        Ok(ack)
    }

    /// Redeem reward points (user role).
    pub async fn redeem_points(&self, request: RedeemRequest) -> ReclaimResult<MutationAck> {
        self.core.require_role(Role::User, Resource::PointsBalance)?;
        let ack = self
            .core
            .observe(self.core.gateway.redeem_points(request).await)?;
        tracing::info!(points = request.points_to_redeem, "points redeemed");
        self.after_write().await;
        Ok(ack)
    }
}

impl<G> RefreshOrchestrator<G> {
    pub fn collections(&self) -> &SharedCollections {
        &self.core.collections
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.tracker
    }

    pub fn gateway(&self) -> &G {
        &self.core.gateway
    }

    pub fn channel(&self) -> &Arc<dyn BroadcastChannel> {
        &self.core.channel
    }

    pub fn is_refreshing(&self) -> bool {
        self.core.refreshing.load(Ordering::Acquire) != 0
    }

    /// Completion time of the latest refresh cycle.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.core.last_update.borrow()
    }

    pub fn watch_last_update(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.core.last_update.subscribe()
    }

    /// Flips to `true` once the backend rejects the session's credentials.
    pub fn watch_auth_expired(&self) -> watch::Receiver<bool> {
        self.core.auth_expired.subscribe()
    }

    pub fn metrics(&self) -> RefreshMetricsSnapshot {
        self.core.metrics.snapshot()
    }
}

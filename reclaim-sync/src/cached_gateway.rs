//! Gateway decorator that memoizes read endpoints.
//!
//! Every read endpoint gets its own [`Memoized`] wrapper keyed by the
//! resource's cache key and configured with that resource's TTL. Mutations
//! always reach the inner gateway and then drop the cached reads they can
//! affect, whether or not they succeeded.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use reclaim_cache::{with_caching, CacheConfig, CacheStats, Memoized};
use reclaim_core::{
    Assignment, Booking, BookingDraft, DashboardStats, DeliveryAssignmentRequest, DeliveryStatus,
    Gateway, MutationAck, Pickup, PointsBalance, RecordId, RedeemRequest, ReclaimResult, Resource,
};

use crate::config::CacheTtlConfig;

type Fetch<T> = Box<dyn Fn(()) -> BoxFuture<'static, ReclaimResult<T>> + Send + Sync>;
type KeyFn = Box<dyn Fn(&()) -> String + Send + Sync>;
type CachedRead<T> = Memoized<Fetch<T>, KeyFn, T>;

fn memoize<G, T, R>(inner: &Arc<G>, resource: Resource, config: &CacheTtlConfig, read: R) -> CachedRead<T>
where
    G: Gateway + 'static,
    T: Send + 'static,
    R: Fn(Arc<G>) -> BoxFuture<'static, ReclaimResult<T>> + Send + Sync + 'static,
{
    let inner = inner.clone();
    let fetch: Fetch<T> = Box::new(move |()| read(inner.clone()));
    let key_fn: KeyFn = Box::new(move |_: &()| resource.cache_key().to_string());
    let cache = CacheConfig::new()
        .with_ttl(config.ttl_for(resource))
        .with_max_size(config.max_size);
    with_caching(fetch, key_fn, cache)
}

/// Wraps a gateway with per-resource TTL caching of its reads.
pub struct CachedGateway<G> {
    inner: Arc<G>,
    assignments: CachedRead<Vec<Assignment>>,
    pickups: CachedRead<Vec<Pickup>>,
    dashboard: CachedRead<DashboardStats>,
    bookings: CachedRead<Vec<Booking>>,
    points: CachedRead<PointsBalance>,
}

impl<G: Gateway + 'static> CachedGateway<G> {
    pub fn new(inner: G, config: &CacheTtlConfig) -> Self {
        Self::from_arc(Arc::new(inner), config)
    }

    pub fn from_arc(inner: Arc<G>, config: &CacheTtlConfig) -> Self {
        Self {
            assignments: memoize(&inner, Resource::Assignments, config, |g| {
                async move { g.assignments().await }.boxed()
            }),
            pickups: memoize(&inner, Resource::Pickups, config, |g| {
                async move { g.pickups().await }.boxed()
            }),
            dashboard: memoize(&inner, Resource::Dashboard, config, |g| {
                async move { g.dashboard().await }.boxed()
            }),
            bookings: memoize(&inner, Resource::Bookings, config, |g| {
                async move { g.bookings().await }.boxed()
            }),
            points: memoize(&inner, Resource::PointsBalance, config, |g| {
                async move { g.points_balance().await }.boxed()
            }),
            inner,
        }
    }

    pub fn inner(&self) -> &Arc<G> {
        &self.inner
    }
}

impl<G> CachedGateway<G> {
    /// Drop the cached read for `resource`.
    pub fn invalidate(&self, resource: Resource) {
        match resource {
            Resource::Assignments => self.assignments.clear(),
            Resource::Pickups => self.pickups.clear(),
            Resource::Dashboard => self.dashboard.clear(),
            Resource::Bookings => self.bookings.clear(),
            Resource::PointsBalance => self.points.clear(),
        }
    }

    fn invalidate_after_write(&self, write: &'static str, resources: &[Resource]) {
        for resource in resources {
            self.invalidate(*resource);
        }
        tracing::debug!(write, ?resources, "cached reads invalidated");
    }

    /// Drop every cached read.
    pub fn clear(&self) {
        for resource in Resource::ALL {
            self.invalidate(resource);
        }
    }

    pub fn stats(&self, resource: Resource) -> CacheStats {
        match resource {
            Resource::Assignments => self.assignments.stats(),
            Resource::Pickups => self.pickups.stats(),
            Resource::Dashboard => self.dashboard.stats(),
            Resource::Bookings => self.bookings.stats(),
            Resource::PointsBalance => self.points.stats(),
        }
    }
}

impl<G> fmt::Debug for CachedGateway<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedGateway")
            .field("assignments", &self.assignments)
            .field("pickups", &self.pickups)
            .field("dashboard", &self.dashboard)
            .field("bookings", &self.bookings)
            .field("points", &self.points)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<G: Gateway + 'static> Gateway for CachedGateway<G> {
    async fn assignments(&self) -> ReclaimResult<Vec<Assignment>> {
        self.assignments.call(()).await
    }

    async fn pickups(&self) -> ReclaimResult<Vec<Pickup>> {
        self.pickups.call(()).await
    }

    async fn dashboard(&self) -> ReclaimResult<DashboardStats> {
        self.dashboard.call(()).await
    }

    async fn bookings(&self) -> ReclaimResult<Vec<Booking>> {
        self.bookings.call(()).await
    }

    async fn points_balance(&self) -> ReclaimResult<PointsBalance> {
        self.points.call(()).await
    }

    async fn update_status(
        &self,
        booking_id: RecordId,
        status: DeliveryStatus,
    ) -> ReclaimResult<MutationAck> {
        let result = self.inner.update_status(booking_id, status).await;
        // Delivery completion awards points and feeds the dashboard totals.
        self.invalidate_after_write("update_status", &Resource::ALL);
        result
    }

    async fn assign_delivery(
        &self,
        request: DeliveryAssignmentRequest,
    ) -> ReclaimResult<MutationAck> {
        let result = self.inner.assign_delivery(request).await;
        self.invalidate_after_write(
            "assign_delivery",
            &[Resource::Pickups, Resource::Assignments, Resource::Bookings],
        );
        result
    }

    async fn create_booking(&self, draft: &BookingDraft) -> ReclaimResult<MutationAck> {
        let result = self.inner.create_booking(draft).await;
        self.invalidate_after_write(
            "create_booking",
            &[Resource::Bookings, Resource::Pickups, Resource::Dashboard],
        );
        result
    }

    async fn redeem_points(&self, request: RedeemRequest) -> ReclaimResult<MutationAck> {
        let result = self.inner.redeem_points(request).await;
        self.invalidate_after_write("redeem_points", &[Resource::PointsBalance]);
        result
    }

    fn discard_cached(&self) {
        self.clear();
        self.inner.discard_cached();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reclaim_test_utils::fixtures;
    use reclaim_test_utils::MockGateway;
    use std::time::Duration;

    fn cached() -> CachedGateway<MockGateway> {
        CachedGateway::new(fixtures::seeded_gateway(), &CacheTtlConfig::default())
    }

    #[tokio::test]
    async fn test_repeat_reads_hit_cache() {
        let gateway = cached();
        gateway.bookings().await.unwrap();
        gateway.bookings().await.unwrap();
        gateway.points_balance().await.unwrap();

        assert_eq!(gateway.inner().calls(Resource::Bookings), 1);
        assert_eq!(gateway.inner().calls(Resource::PointsBalance), 1);
        let stats = gateway.stats(Resource::Bookings);
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_refetched_after_resource_ttl() {
        let gateway = cached();
        gateway.pickups().await.unwrap();
        gateway.dashboard().await.unwrap();

        // Pickups expire after 10s, the dashboard only after 30s.
        tokio::time::advance(Duration::from_secs(11)).await;
        gateway.pickups().await.unwrap();
        gateway.dashboard().await.unwrap();

        assert_eq!(gateway.inner().calls(Resource::Pickups), 2);
        assert_eq!(gateway.inner().calls(Resource::Dashboard), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let gateway = cached();
        gateway.inner().fail(Resource::Assignments);
        assert!(gateway.assignments().await.is_err());

        gateway.inner().recover(Resource::Assignments);
        assert_eq!(gateway.assignments().await.unwrap().len(), 1);
        assert_eq!(gateway.inner().calls(Resource::Assignments), 2);
    }

    #[tokio::test]
    async fn test_mutation_invalidates_affected_reads() {
        let gateway = cached();
        gateway.points_balance().await.unwrap();
        gateway.bookings().await.unwrap();

        gateway
            .redeem_points(RedeemRequest { points_to_redeem: 60 })
            .await
            .unwrap();
        gateway.inner().set_points_balance(60);

        assert_eq!(gateway.points_balance().await.unwrap().points_balance, 60);
        gateway.bookings().await.unwrap();
        assert_eq!(gateway.inner().calls(Resource::PointsBalance), 2);
        assert_eq!(gateway.inner().calls(Resource::Bookings), 1);
    }

    #[tokio::test]
    async fn test_failed_mutation_still_invalidates() {
        let gateway = cached();
        gateway.bookings().await.unwrap();

        gateway.inner().set_unauthorized(true);
        let err = gateway
            .create_booking(&fixtures::sample_draft())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(gateway.stats(Resource::Bookings).total_entries == 0);
    }

    #[tokio::test]
    async fn test_discard_cached_clears_and_forwards() {
        let gateway = cached();
        gateway.dashboard().await.unwrap();
        gateway.discard_cached();

        gateway.dashboard().await.unwrap();
        assert_eq!(gateway.inner().calls(Resource::Dashboard), 2);
        assert_eq!(gateway.inner().discards(), 1);
    }

    #[tokio::test]
    async fn test_read_in_flight_during_write_is_not_cached() {
        let gateway = Arc::new(cached());
        gateway.inner().hold();
        let read = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.bookings().await })
        };
        gateway.inner().wait_for_calls(1).await;

        gateway
            .create_booking(&fixtures::sample_draft())
            .await
            .unwrap();
        gateway.inner().release();
        read.await.unwrap().unwrap();
        assert_eq!(gateway.stats(Resource::Bookings).total_entries, 0);

        gateway.bookings().await.unwrap();
        gateway.bookings().await.unwrap();
        assert_eq!(gateway.inner().calls(Resource::Bookings), 2);
    }
}

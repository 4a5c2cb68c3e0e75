//! Backend API gateway contract.
//!
//! The refresh layer only talks to the backend through this trait. The REST
//! client lives in `reclaim-sync`; mocks live in `reclaim-test-utils`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ReclaimResult;
use crate::records::{
    Assignment, Booking, BookingDraft, DashboardStats, DeliveryAssignmentRequest, DeliveryStatus,
    MutationAck, Pickup, PointsBalance, RecordId, RedeemRequest,
};

/// Named endpoints of the backend.
///
/// Read methods are safe to memoize. Mutation methods must always reach the
/// network.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `GET /delivery/assignments`
    async fn assignments(&self) -> ReclaimResult<Vec<Assignment>>;

    /// `GET /admin/pickups`
    async fn pickups(&self) -> ReclaimResult<Vec<Pickup>>;

    /// `GET /dashboard`
    async fn dashboard(&self) -> ReclaimResult<DashboardStats>;

    /// `GET /bookings`
    async fn bookings(&self) -> ReclaimResult<Vec<Booking>>;

    /// `GET /points/balance`
    async fn points_balance(&self) -> ReclaimResult<PointsBalance>;

    /// `POST /delivery/update-status`
    async fn update_status(
        &self,
        booking_id: RecordId,
        status: DeliveryStatus,
    ) -> ReclaimResult<MutationAck>;

    /// `POST /admin/assign-delivery`
    async fn assign_delivery(
        &self,
        request: DeliveryAssignmentRequest,
    ) -> ReclaimResult<MutationAck>;

    /// `POST /bookings`
    async fn create_booking(&self, draft: &BookingDraft) -> ReclaimResult<MutationAck>;

    /// `POST /points/redeem`
    async fn redeem_points(&self, request: RedeemRequest) -> ReclaimResult<MutationAck>;

    /// Drop any locally memoized reads so the next read reaches the backend.
    /// Gateways without a cache have nothing to drop.
    fn discard_cached(&self) {}
}

#[async_trait]
impl<G: Gateway + ?Sized> Gateway for Arc<G> {
    async fn assignments(&self) -> ReclaimResult<Vec<Assignment>> {
        (**self).assignments().await
    }

    async fn pickups(&self) -> ReclaimResult<Vec<Pickup>> {
        (**self).pickups().await
    }

    async fn dashboard(&self) -> ReclaimResult<DashboardStats> {
        (**self).dashboard().await
    }

    async fn bookings(&self) -> ReclaimResult<Vec<Booking>> {
        (**self).bookings().await
    }

    async fn points_balance(&self) -> ReclaimResult<PointsBalance> {
        (**self).points_balance().await
    }

    async fn update_status(
        &self,
        booking_id: RecordId,
        status: DeliveryStatus,
    ) -> ReclaimResult<MutationAck> {
        (**self).update_status(booking_id, status).await
    }

    async fn assign_delivery(
        &self,
        request: DeliveryAssignmentRequest,
    ) -> ReclaimResult<MutationAck> {
        (**self).assign_delivery(request).await
    }

    async fn create_booking(&self, draft: &BookingDraft) -> ReclaimResult<MutationAck> {
        (**self).create_booking(draft).await
    }

    async fn redeem_points(&self, request: RedeemRequest) -> ReclaimResult<MutationAck> {
        (**self).redeem_points(request).await
    }

    fn discard_cached(&self) {
        (**self).discard_cached()
    }
}

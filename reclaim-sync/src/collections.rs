//! Refreshed collections shared with the view layer.
//!
//! Each collection lives in a `watch` channel and is replaced wholesale on
//! every successful refresh. Readers get immutable snapshots and can await
//! changes.

use std::sync::Arc;

use reclaim_core::{Assignment, Booking, DashboardStats, Pickup, PointsBalance};
use tokio::sync::watch;

/// Sizes of the current collections, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionSummary {
    pub assignments: usize,
    pub pickups: usize,
    pub bookings: usize,
    pub has_dashboard: bool,
    pub points_balance: Option<i64>,
}

#[derive(Debug)]
pub struct SharedCollections {
    assignments: watch::Sender<Arc<Vec<Assignment>>>,
    pickups: watch::Sender<Arc<Vec<Pickup>>>,
    bookings: watch::Sender<Arc<Vec<Booking>>>,
    dashboard: watch::Sender<Option<Arc<DashboardStats>>>,
    points: watch::Sender<Option<PointsBalance>>,
}

impl SharedCollections {
    pub fn new() -> Self {
        Self {
            assignments: watch::Sender::new(Arc::new(Vec::new())),
            pickups: watch::Sender::new(Arc::new(Vec::new())),
            bookings: watch::Sender::new(Arc::new(Vec::new())),
            dashboard: watch::Sender::new(None),
            points: watch::Sender::new(None),
        }
    }

    pub fn assignments(&self) -> Arc<Vec<Assignment>> {
        self.assignments.borrow().clone()
    }

    pub fn pickups(&self) -> Arc<Vec<Pickup>> {
        self.pickups.borrow().clone()
    }

    pub fn bookings(&self) -> Arc<Vec<Booking>> {
        self.bookings.borrow().clone()
    }

    pub fn dashboard(&self) -> Option<Arc<DashboardStats>> {
        self.dashboard.borrow().clone()
    }

    pub fn points_balance(&self) -> Option<PointsBalance> {
        *self.points.borrow()
    }

    pub fn watch_assignments(&self) -> watch::Receiver<Arc<Vec<Assignment>>> {
        self.assignments.subscribe()
    }

    pub fn watch_pickups(&self) -> watch::Receiver<Arc<Vec<Pickup>>> {
        self.pickups.subscribe()
    }

    pub fn watch_bookings(&self) -> watch::Receiver<Arc<Vec<Booking>>> {
        self.bookings.subscribe()
    }

    pub fn watch_dashboard(&self) -> watch::Receiver<Option<Arc<DashboardStats>>> {
        self.dashboard.subscribe()
    }

    pub fn watch_points_balance(&self) -> watch::Receiver<Option<PointsBalance>> {
        self.points.subscribe()
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            assignments: self.assignments.borrow().len(),
            pickups: self.pickups.borrow().len(),
            bookings: self.bookings.borrow().len(),
            has_dashboard: self.dashboard.borrow().is_some(),
            points_balance: self.points.borrow().map(|p| p.points_balance),
        }
    }

    pub(crate) fn replace_assignments(&self, rows: Vec<Assignment>) {
        self.assignments.send_replace(Arc::new(rows));
    }

    pub(crate) fn replace_pickups(&self, rows: Vec<Pickup>) {
        self.pickups.send_replace(Arc::new(rows));
    }

    pub(crate) fn replace_bookings(&self, rows: Vec<Booking>) {
        self.bookings.send_replace(Arc::new(rows));
    }

    pub(crate) fn replace_dashboard(&self, stats: DashboardStats) {
        self.dashboard.send_replace(Some(Arc::new(stats)));
    }

    pub(crate) fn replace_points_balance(&self, balance: PointsBalance) {
        self.points.send_replace(Some(balance));
    }

    /// Drop everything, e.g. when the bound identity changes.
    pub(crate) fn clear(&self) {
        self.assignments.send_replace(Arc::new(Vec::new()));
        self.pickups.send_replace(Arc::new(Vec::new()));
        self.bookings.send_replace(Arc::new(Vec::new()));
        self.dashboard.send_replace(None);
        self.points.send_replace(None);
    }
}

impl Default for SharedCollections {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_publishes_new_snapshot() {
        let collections = SharedCollections::new();
        let before = collections.bookings();
        let mut rx = collections.watch_bookings();

        collections.replace_bookings(vec![Booking::new(1, "laptop", "pending")]);
        rx.changed().await.unwrap();

        assert!(before.is_empty(), "old snapshots are never mutated");
        assert_eq!(rx.borrow().len(), 1);
        assert_eq!(collections.bookings()[0].id, 1);
    }

    #[test]
    fn test_clear_resets_summary() {
        let collections = SharedCollections::new();
        collections.replace_points_balance(PointsBalance { points_balance: 75 });
        collections.replace_dashboard(DashboardStats::default());
        assert_eq!(collections.summary().points_balance, Some(75));
        assert!(collections.summary().has_dashboard);

        collections.clear();
        assert_eq!(collections.summary(), CollectionSummary::default());
    }
}

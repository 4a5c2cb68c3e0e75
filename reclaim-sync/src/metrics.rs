//! Refresh counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for refresh activity since the orchestrator was created.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    /// Cycles that acquired the reentrancy guard
    pub cycles_started: AtomicU64,

    /// Cycles that ran to completion
    pub cycles_completed: AtomicU64,

    /// Cycles and cross-tab markers dropped because a cycle was in flight
    pub cycles_skipped: AtomicU64,

    /// Successful per-resource refreshes
    pub resource_refreshes: AtomicU64,

    /// Failed per-resource refreshes (collection left stale)
    pub resource_failures: AtomicU64,

    /// Refreshes triggered by another tab's marker
    pub cross_tab_triggers: AtomicU64,

    /// Markers published by this tab
    pub cross_tab_emitted: AtomicU64,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        RefreshMetricsSnapshot {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            resource_refreshes: self.resource_refreshes.load(Ordering::Relaxed),
            resource_failures: self.resource_failures.load(Ordering::Relaxed),
            cross_tab_triggers: self.cross_tab_triggers.load(Ordering::Relaxed),
            cross_tab_emitted: self.cross_tab_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of refresh metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshMetricsSnapshot {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub resource_refreshes: u64,
    pub resource_failures: u64,
    pub cross_tab_triggers: u64,
    pub cross_tab_emitted: u64,
}

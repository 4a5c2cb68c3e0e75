//! User activity and visibility tracking.
//!
//! The view layer feeds input signals and foreground/background changes into
//! an [`ActivityTracker`]; the poller reads it on every tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Input events that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

/// Point-in-time view of the polling inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingState {
    pub last_activity_at: Instant,
    pub is_visible: bool,
    pub current_interval: Duration,
}

/// Shared record of the last user activity and the view's visibility.
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Mutex<Instant>,
    visible: watch::Sender<bool>,
    current_interval_ms: AtomicU64,
}

impl ActivityTracker {
    /// A visible view with activity recorded now.
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            visible: watch::Sender::new(true),
            current_interval_ms: AtomicU64::new(0),
        }
    }

    pub fn record(&self, signal: ActivitySignal) {
        tracing::trace!(?signal, "user activity");
        self.touch_at(Instant::now());
    }

    /// Set the last-activity instant explicitly.
    pub fn touch_at(&self, at: Instant) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    pub fn set_visible(&self, visible: bool) {
        let changed = self.visible.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
        if changed {
            tracing::debug!(visible, "visibility changed");
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    /// Receiver notified on every visibility flip.
    pub fn watch_visibility(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    pub(crate) fn set_current_interval(&self, interval: Duration) {
        self.current_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PollingState {
        PollingState {
            last_activity_at: self.last_activity(),
            is_visible: self.is_visible(),
            current_interval: Duration::from_millis(
                self.current_interval_ms.load(Ordering::Relaxed),
            ),
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_idle_time() {
        let tracker = ActivityTracker::new();
        tokio::time::advance(Duration::from_secs(12)).await;
        assert_eq!(tracker.idle_for(Instant::now()), Duration::from_secs(12));

        tracker.record(ActivitySignal::KeyPress);
        assert_eq!(tracker.idle_for(Instant::now()), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_visibility_flip_notifies_once() {
        let tracker = ActivityTracker::new();
        let mut rx = tracker.watch_visibility();

        tracker.set_visible(true);
        assert!(!rx.has_changed().unwrap());

        tracker.set_visible(false);
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
        assert!(!tracker.is_visible());
    }

    #[test]
    fn test_snapshot_reports_interval() {
        let tracker = ActivityTracker::new();
        tracker.set_current_interval(Duration::from_secs(20));
        let state = tracker.snapshot();
        assert!(state.is_visible);
        assert_eq!(state.current_interval, Duration::from_secs(20));
    }
}

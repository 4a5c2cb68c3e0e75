//! Activity- and visibility-aware polling scheduler.
//!
//! On every tick the poller decides whether to run the refresh callback and
//! how long to wait before the next tick:
//!
//! | idle time                      | invoke? | next interval              |
//! |--------------------------------|---------|----------------------------|
//! | `<= threshold / 2`             | yes     | `base`                     |
//! | `(threshold / 2, threshold)`   | yes     | `2 x base`                 |
//! | `[threshold, max_interval]`    | no      | `min(3 x base, max)` (*)   |
//! | `> max_interval`               | yes     | `min(3 x base, max)`       |
//!
//! (*) `2 x base` when idle equals the threshold exactly.
//!
//! Nothing is invoked while the view is hidden. A hidden/visible flip re-arms
//! the pending timer with a freshly computed interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::activity::ActivityTracker;

/// Shortest wait between ticks.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Scheduling parameters for an [`AdaptivePoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub base_interval: Duration,
    /// Hard ceiling on the computed interval. Idle time beyond it forces a
    /// refresh so an idle view never goes silent indefinitely.
    pub max_interval: Duration,
    /// Idle time after which polling backs off.
    pub activity_threshold: Duration,
    /// Run the callback once before waiting for the first interval.
    pub fire_immediately: bool,
}

impl PollerConfig {
    /// A zero `base_interval` is raised to [`MIN_INTERVAL`].
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval: base_interval.max(MIN_INTERVAL),
            max_interval: Duration::from_secs(30),
            activity_threshold: Duration::from_secs(30),
            fire_immediately: false,
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_activity_threshold(mut self, threshold: Duration) -> Self {
        self.activity_threshold = threshold;
        self
    }

    pub fn with_fire_immediately(mut self, fire: bool) -> Self {
        self.fire_immediately = fire;
        self
    }

    /// Whether a tick with the given idle time should run the callback.
    pub fn should_invoke(&self, idle: Duration, visible: bool) -> bool {
        visible && (idle < self.activity_threshold || idle > self.max_interval)
    }

    /// Interval until the next tick for the given idle time.
    pub fn next_interval(&self, idle: Duration) -> Duration {
        if idle > self.activity_threshold {
            (self.base_interval * 3).min(self.max_interval)
        } else if idle > self.activity_threshold / 2 {
            self.base_interval * 2
        } else {
            self.base_interval
        }
    }

    pub fn plan(&self, idle: Duration, visible: bool) -> TickPlan {
        TickPlan {
            invoke: self.should_invoke(idle, visible),
            next_interval: self.next_interval(idle),
        }
    }
}

/// Decision taken for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub invoke: bool,
    pub next_interval: Duration,
}

/// Polls a callback on an adaptive schedule.
#[derive(Debug, Clone)]
pub struct AdaptivePoller {
    config: PollerConfig,
    tracker: Arc<ActivityTracker>,
}

impl AdaptivePoller {
    pub fn new(config: PollerConfig, tracker: Arc<ActivityTracker>) -> Self {
        Self { config, tracker }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start polling on the current tokio runtime.
    ///
    /// The callback is awaited before the next interval is armed, so ticks
    /// never overlap. Dropping or stopping the handle cancels the timer.
    pub fn spawn<F, Fut>(self, mut callback: F) -> PollerHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let AdaptivePoller { config, tracker } = self;

        let task = tokio::spawn(async move {
            let mut visibility = tracker.watch_visibility();
            tracing::debug!(
                base_interval_ms = config.base_interval.as_millis() as u64,
                max_interval_ms = config.max_interval.as_millis() as u64,
                "poller started"
            );

            if config.fire_immediately && tracker.is_visible() {
                callback().await;
            }

            loop {
                let next = config
                    .next_interval(tracker.idle_for(Instant::now()))
                    .max(MIN_INTERVAL);
                tracker.set_current_interval(next);

                tokio::select! {
                    _ = tokio::time::sleep(next) => {
                        let idle = tracker.idle_for(Instant::now());
                        if config.should_invoke(idle, tracker.is_visible()) {
                            callback().await;
                        } else {
                            tracing::trace!(idle_ms = idle.as_millis() as u64, "poll tick skipped");
                        }
                    }
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        PollerHandle { task: Some(task) }
    }
}

/// Owner of a running poll loop.
///
/// The loop is aborted when the handle is stopped or dropped.
#[derive(Debug)]
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Cancel the pending timer and wait for the loop to exit.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            tracing::debug!("poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

//! Effect Scheduler
//!
//! The scheduler batches effect re-runs. Triggering a dependency does not
//! run anything; it adds the subscribed effects to a pending set and asks
//! for a flush. One batching window later the flush takes a snapshot of the
//! pending set, clears it, and runs the whole snapshot.
//!
//! # Guarantees
//!
//! - Pending effects form a set: any number of triggers of the same effect
//!   inside one window collapse into a single re-run.
//! - Flush requests are idempotent per window; only one flush is spawned no
//!   matter how many writes happen before it fires.
//! - A flush never interleaves with another flush. Effects triggered while a
//!   flush is in flight land in the next window's snapshot.
//! - Failures are isolated. An effect that returns an error or panics is
//!   logged and counted; the rest of its batch still runs to completion.
//!
//! # Windows
//!
//! See [`BatchWindow`]. Flushes are spawned onto the ambient tokio runtime.
//! Outside a runtime nothing is spawned and pending effects wait for an
//! explicit [`Scheduler::flush`] or [`Scheduler::settle`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, trace};

use super::effect::{Effect, EffectId};
use crate::config::{BatchWindow, RenderConfig};

/// Outcome of a single flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Effects started by this flush.
    pub ran: usize,
    /// Effects that returned an error or panicked.
    pub failed: usize,
    /// The flush found another flush in flight and left its work to it.
    pub deferred: bool,
}

#[derive(Default)]
struct FlushState {
    pending: IndexMap<EffectId, Arc<Effect>>,
    requested: bool,
    in_flight: bool,
}

struct SchedulerInner {
    window: BatchWindow,
    state: Mutex<FlushState>,
    flushes: AtomicU64,
}

/// Batches and runs triggered effects.
///
/// Cloning a scheduler yields another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler with a fixed batching window.
    pub fn new(window: BatchWindow) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                window,
                state: Mutex::new(FlushState::default()),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(config.batch_window)
    }

    pub fn window(&self) -> BatchWindow {
        self.inner.window
    }

    /// Number of effects waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of flushes that ran a batch.
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    /// Whether nothing is pending and no flush is running.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.pending.is_empty() && !state.in_flight
    }

    pub(crate) fn enqueue(&self, effect: Arc<Effect>) {
        {
            let mut state = self.inner.state.lock();
            state.pending.entry(effect.id()).or_insert(effect);
        }
        self.schedule_flush();
    }

    /// Request a flush at the end of the current window.
    ///
    /// Repeated requests inside one window are no-ops.
    pub fn schedule_flush(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.requested {
                return;
            }
            state.requested = true;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let scheduler = self.clone();
                handle.spawn(async move {
                    scheduler.wait_window().await;
                    scheduler.flush().await;
                });
            }
            Err(_) => {
                debug!("no async runtime; pending effects wait for an explicit flush");
            }
        }
    }

    async fn wait_window(&self) {
        match self.inner.window.interval() {
            None => tokio::task::yield_now().await,
            Some(interval) => tokio::time::sleep(interval).await,
        }
    }

    /// Run every pending effect.
    ///
    /// All effects of the snapshot are started together and awaited as a
    /// group. The flush is complete once each of them has settled, whether
    /// successfully or not.
    pub async fn flush(&self) -> FlushReport {
        let batch: Vec<Arc<Effect>> = {
            let mut state = self.inner.state.lock();
            if state.in_flight {
                // The running flush reschedules on completion.
                state.requested = false;
                return FlushReport {
                    deferred: true,
                    ..FlushReport::default()
                };
            }
            state.requested = false;
            if state.pending.is_empty() {
                return FlushReport::default();
            }
            state.in_flight = true;
            std::mem::take(&mut state.pending).into_values().collect()
        };

        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(effects = batch.len(), window = ?self.inner.window, "flushing effects");

        let runs = batch
            .iter()
            .map(|effect| AssertUnwindSafe(effect.run()).catch_unwind());
        let outcomes = join_all(runs).await;

        let mut report = FlushReport {
            ran: batch.len(),
            ..FlushReport::default()
        };
        for (effect, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    error!(effect = effect.id().raw(), error = %err, "effect failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        effect = effect.id().raw(),
                        panic = panic_message(panic.as_ref()),
                        "effect panicked"
                    );
                }
            }
        }

        let reschedule = {
            let mut state = self.inner.state.lock();
            state.in_flight = false;
            !state.pending.is_empty()
        };
        if reschedule {
            trace!("effects triggered during flush; scheduling next window");
            self.schedule_flush();
        }

        report
    }

    /// Flush until nothing is pending and no flush is in flight.
    pub async fn settle(&self) {
        loop {
            let (pending, in_flight) = {
                let state = self.inner.state.lock();
                (!state.pending.is_empty(), state.in_flight)
            };
            match (pending, in_flight) {
                (false, false) => return,
                (_, true) => tokio::task::yield_now().await,
                (true, false) => {
                    self.flush().await;
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(BatchWindow::Microtask)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("window", &self.inner.window)
            .field("pending", &self.pending_count())
            .field("flushes", &self.flush_count())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, StateError};
    use crate::reactive::{Dependency, ReactiveContext};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_effect(scheduler: &Scheduler, dependency: &Arc<Dependency>) -> Arc<Effect> {
        let dependency = dependency.clone();
        Effect::new_sync(scheduler, move || {
            ReactiveContext::track(&dependency);
            Ok(())
        })
    }

    #[tokio::test]
    async fn repeated_triggers_collapse() {
        let scheduler = Scheduler::default();
        let dependency = Dependency::new();
        let effect = counting_effect(&scheduler, &dependency);
        effect.run().await.unwrap();

        for _ in 0..10 {
            dependency.trigger();
        }
        assert_eq!(scheduler.pending_count(), 1);

        let report = scheduler.flush().await;
        assert_eq!(report.ran, 1);
        assert_eq!(effect.run_count(), 2);
    }

    #[tokio::test]
    async fn spawned_flush_runs_after_yield() {
        let scheduler = Scheduler::default();
        let dependency = Dependency::new();
        let effect = counting_effect(&scheduler, &dependency);
        effect.run().await.unwrap();

        dependency.trigger();
        assert_eq!(effect.run_count(), 1);

        // Let the spawned flush task run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(effect.run_count(), 2);
        assert!(scheduler.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn frame_window_waits_for_tick() {
        let scheduler = Scheduler::new(BatchWindow::Frame { interval_ms: 16 });
        let dependency = Dependency::new();
        let effect = counting_effect(&scheduler, &dependency);
        effect.run().await.unwrap();

        dependency.trigger();
        tokio::task::yield_now().await;
        assert_eq!(effect.run_count(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(effect.run_count(), 2);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let scheduler = Scheduler::default();
        let dependency = Dependency::new();
        let completed = Arc::new(AtomicUsize::new(0));

        let failing = Effect::new_sync(&scheduler, {
            let dependency = dependency.clone();
            move || {
                ReactiveContext::track(&dependency);
                Err(Error::State(StateError::InvalidPath(String::new())))
            }
        });
        let panicking = Effect::new_sync(&scheduler, {
            let dependency = dependency.clone();
            let completed = completed.clone();
            move || {
                ReactiveContext::track(&dependency);
                if completed.load(Ordering::SeqCst) > 0 {
                    panic!("second run panics");
                }
                Ok(())
            }
        });
        let healthy = Effect::new_sync(&scheduler, {
            let dependency = dependency.clone();
            let completed = completed.clone();
            move || {
                ReactiveContext::track(&dependency);
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let _ = failing.run().await;
        panicking.run().await.unwrap();
        healthy.run().await.unwrap();

        dependency.trigger();
        let report = scheduler.flush().await;

        assert_eq!(report.ran, 3);
        assert_eq!(report.failed, 2);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
        assert!(ReactiveContext::current().is_none());
    }

    #[tokio::test]
    async fn writes_during_flush_go_to_next_window() {
        let scheduler = Scheduler::default();
        let upstream = Dependency::new();
        let downstream = Dependency::new();

        // Re-triggers a dependency it also reads: must not re-enter its own batch
        let effect = Effect::new_sync(&scheduler, {
            let upstream = upstream.clone();
            let downstream = downstream.clone();
            move || {
                ReactiveContext::track(&upstream);
                downstream.trigger();
                Ok(())
            }
        });
        let follower = counting_effect(&scheduler, &downstream);

        effect.run().await.unwrap();
        follower.run().await.unwrap();
        scheduler.settle().await;
        let baseline = follower.run_count();

        upstream.trigger();
        let report = scheduler.flush().await;
        assert_eq!(report.ran, 1);
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.settle().await;
        assert_eq!(follower.run_count(), baseline + 1);
    }
}

//! Effect Implementation
//!
//! An Effect is a re-runnable unit of work whose reactive reads determine
//! when it runs again.
//!
//! # How Effects Work
//!
//! 1. Creating an effect does not run it. The renderer creates an effect per
//!    binding and awaits its first [`Effect::run`] to produce initial output.
//!
//! 2. Every run first unsubscribes the effect from the dependency sets it
//!    recorded last time, then executes the body with the effect installed
//!    in the [`ReactiveContext`]. Reads during the body repopulate the sets,
//!    so an effect is only ever subscribed to what it last actually read.
//!
//! 3. When a dependency triggers, the effect is handed to its scheduler,
//!    which batches re-runs per window.
//!
//! # Bodies Are Asynchronous
//!
//! A body returns a future. Reads performed while that future is polled are
//! tracked, including reads after an `.await`, because the context slot is
//! reinstalled on every poll.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::ReactiveContext;
use super::dependency::{Dependency, DependencyId};
use super::scheduler::Scheduler;
use crate::error::Result;

/// Future produced by one run of an effect body.
pub type EffectFuture = BoxFuture<'static, Result<()>>;

type Body = Box<dyn Fn() -> EffectFuture + Send + Sync>;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A re-runnable computation bound to a scheduler.
///
/// # Example
///
/// ```rust,ignore
/// let state = Reactive::wrap(json!({ "count": 0 }))?;
/// let effect = Effect::new_sync(&scheduler, {
///     let state = state.clone();
///     move || {
///         println!("count is {}", state.get("count"));
///         Ok(())
///     }
/// });
/// effect.run().await?;      // prints "count is 0", subscribes to `count`
/// state.set("count", 5)?;   // schedules a re-run
/// ```
pub struct Effect {
    id: EffectId,
    body: Body,
    dependencies: Mutex<IndexMap<DependencyId, Arc<Dependency>>>,
    scheduler: Scheduler,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl Effect {
    /// Create an effect with an asynchronous body. The body is not run.
    pub fn new<F, Fut>(scheduler: &Scheduler, body: F) -> Arc<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Arc::new(Self {
            id: EffectId::next(),
            body: Box::new(move || body().boxed()),
            dependencies: Mutex::new(IndexMap::new()),
            scheduler: scheduler.clone(),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        })
    }

    /// Create an effect with a synchronous body. The body is not run.
    pub fn new_sync<F>(scheduler: &Scheduler, body: F) -> Arc<Self>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self::new(scheduler, move || std::future::ready(body()))
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Execute the body once, rebuilding the dependency set from scratch.
    ///
    /// The previously active effect is restored when this returns, whether
    /// the body succeeded, failed or panicked.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        self.clear_dependencies();
        let run = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(effect = self.id.0, run, "running effect");

        let this = Arc::clone(self);
        ReactiveContext::scope(Arc::clone(self), async move { (this.body)().await }).await
    }

    /// Hand the effect to its scheduler for a batched re-run.
    pub fn schedule(self: &Arc<Self>) {
        if !self.is_disposed() {
            self.scheduler.enqueue(Arc::clone(self));
        }
    }

    /// Stop the effect permanently and drop its subscriptions.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.clear_dependencies();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the body has been started.
    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependency sets recorded by the last run.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.lock().len()
    }

    pub(crate) fn record(&self, dependency: &Arc<Dependency>) {
        self.dependencies
            .lock()
            .entry(dependency.id())
            .or_insert_with(|| Arc::clone(dependency));
    }

    fn clear_dependencies(&self) {
        let stale = std::mem::take(&mut *self.dependencies.lock());
        for dependency in stale.values() {
            dependency.unsubscribe(self.id);
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        for dependency in self.dependencies.get_mut().values() {
            dependency.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[tokio::test]
    async fn effect_does_not_run_on_creation() {
        let scheduler = Scheduler::default();
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new_sync(&scheduler, move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_count(), 0);

        effect.run().await.unwrap();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[tokio::test]
    async fn run_rebuilds_dependencies() {
        let scheduler = Scheduler::default();
        let first = Dependency::new();
        let second = Dependency::new();
        let use_first = Arc::new(AtomicBool::new(true));

        let effect = Effect::new_sync(&scheduler, {
            let first = first.clone();
            let second = second.clone();
            let use_first = use_first.clone();
            move || {
                if use_first.load(Ordering::SeqCst) {
                    ReactiveContext::track(&first);
                } else {
                    ReactiveContext::track(&second);
                }
                Ok(())
            }
        });

        effect.run().await.unwrap();
        assert_eq!(first.subscriber_count(), 1);
        assert_eq!(second.subscriber_count(), 0);

        use_first.store(false, Ordering::SeqCst);
        effect.run().await.unwrap();
        assert_eq!(first.subscriber_count(), 0);
        assert_eq!(second.subscriber_count(), 1);
        assert_eq!(effect.dependency_count(), 1);
    }

    #[tokio::test]
    async fn reads_after_await_are_tracked() {
        let scheduler = Scheduler::default();
        let dependency = Dependency::new();

        let effect = Effect::new(&scheduler, {
            let dependency = dependency.clone();
            move || {
                let dependency = dependency.clone();
                async move {
                    tokio::task::yield_now().await;
                    ReactiveContext::track(&dependency);
                    Ok(())
                }
            }
        });

        effect.run().await.unwrap();
        assert_eq!(dependency.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn slot_is_restored_after_panic() {
        let scheduler = Scheduler::default();
        let effect = Effect::new_sync(&scheduler, || panic!("effect body failed"));

        let outcome = std::panic::AssertUnwindSafe(effect.run())
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        assert!(ReactiveContext::current().is_none());
    }

    #[tokio::test]
    async fn effect_does_not_run_after_disposal() {
        let scheduler = Scheduler::default();
        let dependency = Dependency::new();
        let effect = Effect::new_sync(&scheduler, {
            let dependency = dependency.clone();
            move || {
                ReactiveContext::track(&dependency);
                Ok(())
            }
        });

        effect.run().await.unwrap();
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(dependency.subscriber_count(), 0);

        effect.run().await.unwrap();
        effect.schedule();
        assert_eq!(effect.run_count(), 1);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn effect_ids_are_unique() {
        let scheduler = Scheduler::default();
        let a = Effect::new_sync(&scheduler, || Ok(()));
        let b = Effect::new_sync(&scheduler, || Ok(()));
        assert_ne!(a.id(), b.id());
    }
}

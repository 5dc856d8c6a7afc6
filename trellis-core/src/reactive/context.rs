//! Reactive Context
//!
//! The reactive context records which effect is currently running. This is
//! what makes dependency tracking automatic: when a reactive property is
//! read, the property subscribes whatever effect occupies the slot.
//!
//! # Implementation
//!
//! The slot is a tokio task-local rather than a thread-local. An effect's
//! future is wrapped in [`ReactiveContext::scope`], which installs the effect
//! for the duration of every poll of that future and restores the previous
//! occupant when the poll returns, including when it unwinds. Two effects
//! interleaving on one thread therefore never observe each other's slot, and
//! nested runs (an effect that renders a subtree whose own effects run
//! inline) save and restore the outer effect automatically.

use std::future::Future;
use std::sync::Arc;

use super::dependency::Dependency;
use super::effect::Effect;

tokio::task_local! {
    static ACTIVE_EFFECT: Option<Arc<Effect>>;
}

/// Accessors for the active-effect slot.
pub struct ReactiveContext;

impl ReactiveContext {
    /// The effect currently executing, if any.
    pub fn current() -> Option<Arc<Effect>> {
        ACTIVE_EFFECT.try_with(|slot| slot.clone()).ok().flatten()
    }

    /// Check if a read right now would register a dependency.
    pub fn is_active() -> bool {
        ACTIVE_EFFECT
            .try_with(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Run `future` with `effect` occupying the slot.
    pub(crate) fn scope<F>(effect: Arc<Effect>, future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        ACTIVE_EFFECT.scope(Some(effect), future)
    }

    /// Run `f` with an empty slot so its reads subscribe nothing.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        ACTIVE_EFFECT.sync_scope(None, f)
    }

    /// Subscribe the active effect, if any, to `dependency`.
    ///
    /// The dependency is also recorded on the effect so the subscription can
    /// be dropped before the effect's next run.
    pub fn track(dependency: &Arc<Dependency>) {
        if let Some(effect) = Self::current() {
            dependency.subscribe(&effect);
            effect.record(dependency);
        }
    }
}

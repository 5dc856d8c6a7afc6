//! Dependency Sets
//!
//! A [`Dependency`] is the set of effects subscribed to one reactive
//! property. Reading the property inside an effect subscribes the effect;
//! writing the property triggers every subscriber.
//!
//! Subscribers are held weakly. An effect belongs to the presentation node
//! that created it, and once that node is dropped the effect disappears from
//! every set it was subscribed to without further bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::effect::{Effect, EffectId};

/// Unique identifier for a dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyId(u64);

impl DependencyId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The effects subscribed to one reactive property.
#[derive(Debug)]
pub struct Dependency {
    id: DependencyId,
    subscribers: Mutex<IndexMap<EffectId, Weak<Effect>>>,
}

impl Dependency {
    /// Create an empty dependency set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: DependencyId::next(),
            subscribers: Mutex::new(IndexMap::new()),
        })
    }

    pub fn id(&self) -> DependencyId {
        self.id
    }

    pub(crate) fn subscribe(&self, effect: &Arc<Effect>) {
        self.subscribers
            .lock()
            .entry(effect.id())
            .or_insert_with(|| Arc::downgrade(effect));
    }

    pub(crate) fn unsubscribe(&self, effect: EffectId) {
        self.subscribers.lock().shift_remove(&effect);
    }

    /// Schedule every live subscriber for a re-run.
    ///
    /// Subscribers whose effect has been dropped are pruned on the way.
    pub fn trigger(&self) {
        let live: Vec<Arc<Effect>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|_, weak| weak.strong_count() > 0);
            subscribers.values().filter_map(Weak::upgrade).collect()
        };

        trace!(dependency = ?self.id, subscribers = live.len(), "trigger");

        for effect in live {
            effect.schedule();
        }
    }

    /// Number of effects currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

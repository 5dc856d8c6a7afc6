//! Named State Registry
//!
//! Hands a state root from server rendering to client hydration by name.
//! Most callers use the process-wide [`StateRegistry::global`]; tests and
//! servers rendering several isolated apps create their own.

use std::sync::OnceLock;

use dashmap::DashMap;
use tracing::debug;

use super::node::{IntoReactive, Reactive};
use crate::error::StateError;

#[derive(Default)]
pub struct StateRegistry {
    roots: DashMap<String, Reactive>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static StateRegistry {
        static GLOBAL: OnceLock<StateRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StateRegistry::new)
    }

    /// Wrap `value` and store it under `name`, replacing any previous root.
    pub fn register(&self, name: &str, value: impl IntoReactive) -> Result<Reactive, StateError> {
        let root = value.into_reactive()?;
        if self.roots.insert(name.to_string(), root.clone()).is_some() {
            debug!(name, "replaced registered state");
        }
        Ok(root)
    }

    pub fn get(&self, name: &str) -> Option<Reactive> {
        self.roots.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<Reactive> {
        self.roots.remove(name).map(|(_, root)| root)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roots.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// The name a root is registered under, if any.
    pub fn name_of(&self, root: &Reactive) -> Option<String> {
        self.roots
            .iter()
            .find(|entry| entry.value() == root)
            .map(|entry| entry.key().clone())
    }
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistry")
            .field("names", &self.names())
            .finish()
    }
}

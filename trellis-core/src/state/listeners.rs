//! Path Listeners
//!
//! Every state tree carries one listener registry shared by all of its
//! nodes. A listener is keyed by a dotted path and receives a [`Change`] for
//! writes to that path or to any path below it. The wildcard path `*`
//! receives every change in the tree.
//!
//! Handlers run synchronously inside the write, after the new value is in
//! place and with no locks held, most specific path first.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use super::node::{Reactive, RootShared};
use crate::error::StateError;

/// Path that matches every change in a tree.
pub const WILDCARD: &str = "*";

/// One completed write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Dotted path from the root to the written property.
    pub path: String,
    /// Snapshot before the write; `None` when the property did not exist.
    pub old_value: Option<Value>,
    /// Snapshot after the write; `None` when the property was removed.
    pub new_value: Option<Value>,
}

pub type ListenerFn = Arc<dyn Fn(&Change) + Send + Sync>;

/// Identifier returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Listeners of one tree, grouped by path.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    by_path: RwLock<IndexMap<String, IndexMap<ListenerId, ListenerFn>>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, path: &str, handler: ListenerFn) -> ListenerId {
        let id = ListenerId::next();
        self.by_path
            .write()
            .entry(path.to_string())
            .or_default()
            .insert(id, handler);
        id
    }

    pub(crate) fn remove(&self, path: &str, id: ListenerId) -> bool {
        let mut by_path = self.by_path.write();
        let Some(handlers) = by_path.get_mut(path) else {
            return false;
        };
        let removed = handlers.shift_remove(&id).is_some();
        if handlers.is_empty() {
            by_path.shift_remove(path);
        }
        removed
    }

    pub(crate) fn remove_all(&self, path: Option<&str>) -> usize {
        let mut by_path = self.by_path.write();
        match path {
            Some(path) => by_path.shift_remove(path).map_or(0, |handlers| handlers.len()),
            None => std::mem::take(&mut *by_path).values().map(IndexMap::len).sum(),
        }
    }

    pub(crate) fn list(&self, path: &str) -> Vec<ListenerId> {
        self.by_path
            .read()
            .get(path)
            .map(|handlers| handlers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Handlers for a change at `path`: exact path, then each ancestor from
    /// nearest to root, then the wildcard.
    pub(crate) fn matching(&self, path: &str) -> Vec<ListenerFn> {
        let by_path = self.by_path.read();
        if by_path.is_empty() {
            return Vec::new();
        }

        let mut handlers = Vec::new();
        let mut current = path;
        loop {
            if let Some(found) = by_path.get(current) {
                handlers.extend(found.values().cloned());
            }
            match current.rfind('.') {
                Some(dot) => current = &current[..dot],
                None => break,
            }
        }
        if let Some(found) = by_path.get(WILDCARD) {
            handlers.extend(found.values().cloned());
        }
        handlers
    }
}

fn validate_path(path: &str) -> Result<(), StateError> {
    let invalid = || StateError::InvalidPath(path.to_string());
    if path == WILDCARD {
        return Ok(());
    }
    if path.is_empty() || path.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if path.split('.').any(|segment| segment.is_empty() || segment.contains('*')) {
        return Err(invalid());
    }
    Ok(())
}

/// Handle returned by [`Reactive::add_listener`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: ListenerId,
    path: String,
    root: Weak<RootShared>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Remove the listener. Returns `false` if it was already removed.
    pub fn unsubscribe(self) -> bool {
        match self.root.upgrade() {
            Some(root) => root.listeners.remove(&self.path, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

impl Reactive {
    /// Register a handler for changes at `path` or below it.
    ///
    /// Paths are dotted and absolute from the tree's root, whichever node
    /// the listener is added through.
    pub fn add_listener<F>(&self, path: &str, handler: F) -> Result<Subscription, StateError>
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        validate_path(path)?;
        let root = self.root_shared();
        let id = root.listeners.add(path, Arc::new(handler));
        Ok(Subscription {
            id,
            path: path.to_string(),
            root: Arc::downgrade(root),
        })
    }

    pub fn remove_listener(&self, path: &str, id: ListenerId) -> bool {
        self.root_shared().listeners.remove(path, id)
    }

    /// Remove every listener on `path`, or on all paths when `None`.
    /// Returns how many were removed.
    pub fn remove_all_listeners(&self, path: Option<&str>) -> usize {
        self.root_shared().listeners.remove_all(path)
    }

    pub fn listeners(&self, path: &str) -> Vec<ListenerId> {
        self.root_shared().listeners.list(path)
    }
}

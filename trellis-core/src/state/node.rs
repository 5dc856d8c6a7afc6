//! Reactive Nodes
//!
//! A [`Reactive`] is a handle to one object or array of a reactive state
//! tree. Reads go through [`Reactive::get`] and subscribe the running effect
//! to the property read; writes go through [`Reactive::set`] and notify path
//! listeners and trigger subscribed effects.
//!
//! # Identity
//!
//! Every object or array stored in a tree is held by exactly one node, and
//! reading it always yields a handle to that node. Two handles compare equal
//! exactly when they address the same node, so re-wrapping is idempotent:
//! `Reactive::wrap(node.clone())` returns `node`.
//!
//! # Paths
//!
//! Each node remembers the property path from its root at the time it was
//! stored. Change notifications use the dotted form of that path plus the
//! property written (`todos.3.done`).
//!
//! # Structural Dependencies
//!
//! Besides one dependency set per property, arrays track `length` and objects
//! track their key set, so code that iterates a node re-runs on insertion or
//! removal.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use tracing::trace;

use super::date::ReactiveDate;
use super::listeners::{Change, ListenerRegistry};
use super::value::{date_json, json_eq, json_type_name, Field, Input};
use crate::error::StateError;
use crate::reactive::{Dependency, ReactiveContext};

/// Property name reporting an array's element count.
pub const LENGTH: &str = "length";

/// Most slots a single index or length write may add to an array.
pub const MAX_ARRAY_GROWTH: usize = 65_536;

/// Dependency key for an object's key set.
const KEYS: &str = "#keys";

pub(crate) type Path = SmallVec<[String; 4]>;

/// Unique identifier for a reactive node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State shared by every node of one tree.
pub(crate) struct RootShared {
    pub(crate) listeners: ListenerRegistry,
}

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Value(Value),
    Node(Reactive),
    Date(DateTime<Utc>),
}

impl Slot {
    fn to_json(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Node(node) => node.to_json(),
            Self::Date(date) => date_json(*date),
        }
    }

    fn same_as(&self, input: &Input) -> bool {
        match (self, input) {
            (Self::Value(current), Input::Value(next)) => {
                !next.is_object() && !next.is_array() && json_eq(current, next)
            }
            (Self::Node(current), Input::Node(next)) => current == next,
            (Self::Date(current), Input::Date(next)) => current == next,
            _ => false,
        }
    }
}

enum Shape {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

impl Shape {
    fn slot(&self, prop: &str) -> Option<&Slot> {
        match self {
            Self::Object(map) => map.get(prop),
            Self::Array(items) => parse_index(prop).and_then(|index| items.get(index)),
        }
    }

    fn slot_mut(&mut self, prop: &str) -> Option<&mut Slot> {
        match self {
            Self::Object(map) => map.get_mut(prop),
            Self::Array(items) => parse_index(prop).and_then(move |index| items.get_mut(index)),
        }
    }
}

struct NodeInner {
    id: NodeId,
    root: Arc<RootShared>,
    path: Path,
    shape: RwLock<Shape>,
    dependencies: Mutex<HashMap<String, Arc<Dependency>>>,
}

/// Handle to a reactive object or array.
///
/// Handles are cheap to clone and compare by node identity.
#[derive(Clone)]
pub struct Reactive {
    inner: Arc<NodeInner>,
}

/// Values that can become (or already are) the root of a reactive tree.
pub trait IntoReactive {
    fn into_reactive(self) -> Result<Reactive, StateError>;
}

impl IntoReactive for Reactive {
    fn into_reactive(self) -> Result<Reactive, StateError> {
        Ok(self)
    }
}

impl IntoReactive for &Reactive {
    fn into_reactive(self) -> Result<Reactive, StateError> {
        Ok(self.clone())
    }
}

impl IntoReactive for Value {
    fn into_reactive(self) -> Result<Reactive, StateError> {
        let root = Arc::new(RootShared {
            listeners: ListenerRegistry::default(),
        });
        match ingest(self, &root, Path::new()) {
            Slot::Node(node) => Ok(node),
            Slot::Value(value) => Err(StateError::NotAContainer(json_type_name(&value))),
            Slot::Date(_) => Err(StateError::NotAContainer("a date")),
        }
    }
}

/// Convert a JSON value into a slot, creating nodes for composites.
fn ingest(value: Value, root: &Arc<RootShared>, path: Path) -> Slot {
    let shape = match value {
        Value::Object(map) => Shape::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let child = ingest(value, root, extend(&path, &key));
                    (key, child)
                })
                .collect(),
        ),
        Value::Array(items) => Shape::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(index, value)| ingest(value, root, extend(&path, &index.to_string())))
                .collect(),
        ),
        primitive => return Slot::Value(primitive),
    };

    Slot::Node(Reactive {
        inner: Arc::new(NodeInner {
            id: NodeId::next(),
            root: Arc::clone(root),
            path,
            shape: RwLock::new(shape),
            dependencies: Mutex::new(HashMap::new()),
        }),
    })
}

fn extend(path: &Path, prop: &str) -> Path {
    let mut path = path.clone();
    path.push(prop.to_string());
    path
}

/// Canonical array index: digits only, no leading zeros.
pub(crate) fn parse_index(prop: &str) -> Option<usize> {
    let canonical = prop == "0" || (!prop.starts_with('0') && prop.bytes().all(|b| b.is_ascii_digit()));
    if canonical && !prop.is_empty() {
        prop.parse().ok()
    } else {
        None
    }
}

impl Reactive {
    /// Wrap a JSON object or array, or return an existing node unchanged.
    pub fn wrap(value: impl IntoReactive) -> Result<Self, StateError> {
        value.into_reactive()
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dotted path of this node from its root; empty for the root itself.
    pub fn path(&self) -> String {
        self.inner.path.join(".")
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.inner.shape.read(), Shape::Array(_))
    }

    /// Whether both handles belong to the same tree.
    pub fn same_root(&self, other: &Reactive) -> bool {
        Arc::ptr_eq(&self.inner.root, &other.inner.root)
    }

    pub(crate) fn root_shared(&self) -> &Arc<RootShared> {
        &self.inner.root
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read a property, subscribing the running effect to it.
    pub fn get(&self, prop: &str) -> Field {
        self.track(prop);
        let shape = self.inner.shape.read();
        if let Shape::Array(items) = &*shape {
            if prop == LENGTH {
                return Field::Value(Value::from(items.len()));
            }
        }
        match shape.slot(prop) {
            Some(slot) => self.field(prop, slot),
            None => Field::Absent,
        }
    }

    /// Read a dotted path (`user.address.city`), tracking every step.
    pub fn get_path(&self, path: &str) -> Field {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Field::Absent;
        };
        let mut current = self.get(first);
        for segment in segments {
            current = match current {
                Field::Node(node) => node.get(segment),
                _ => return Field::Absent,
            };
        }
        current
    }

    /// Whether a property exists, subscribing to it.
    pub fn contains(&self, prop: &str) -> bool {
        !self.get(prop).is_absent()
    }

    /// Number of elements or keys, subscribing to structural changes.
    pub fn len(&self) -> usize {
        self.track_structure();
        match &*self.inner.shape.read() {
            Shape::Object(map) => map.len(),
            Shape::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property names in order, subscribing to structural changes.
    pub fn keys(&self) -> Vec<String> {
        self.track_structure();
        match &*self.inner.shape.read() {
            Shape::Object(map) => map.keys().cloned().collect(),
            Shape::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// Every value in order, subscribing to the structure and each element.
    pub fn items(&self) -> Vec<Field> {
        self.keys().iter().map(|key| self.get(key)).collect()
    }

    /// Key/value pairs in order, subscribing to the structure and each entry.
    pub fn entries(&self) -> Vec<(String, Field)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let field = self.get(&key);
                (key, field)
            })
            .collect()
    }

    /// Untracked JSON snapshot of the subtree.
    pub fn to_json(&self) -> Value {
        match &*self.inner.shape.read() {
            Shape::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, slot)| (key.clone(), slot.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            Shape::Array(items) => Value::Array(items.iter().map(Slot::to_json).collect()),
        }
    }

    fn field(&self, prop: &str, slot: &Slot) -> Field {
        match slot {
            Slot::Value(value) => Field::Value(value.clone()),
            Slot::Node(node) => Field::Node(node.clone()),
            Slot::Date(_) => Field::Date(ReactiveDate::new(self.clone(), prop)),
        }
    }

    pub(crate) fn date_untracked(&self, prop: &str) -> Option<DateTime<Utc>> {
        match self.inner.shape.read().slot(prop) {
            Some(Slot::Date(date)) => Some(*date),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write a property.
    ///
    /// Returns `Ok(false)` without notifying anyone when the new value equals
    /// the current one. Writing `length` on an array always notifies.
    pub fn set(&self, prop: &str, value: impl Into<Input>) -> Result<bool, StateError> {
        let input = value.into();
        if matches!(input, Input::Absent) {
            return self.remove(prop);
        }

        let index = match &*self.inner.shape.read() {
            Shape::Array(_) if prop == LENGTH => None,
            Shape::Array(items) => Some(
                parse_index(prop)
                    .filter(|&index| index <= items.len() + MAX_ARRAY_GROWTH)
                    .ok_or_else(|| StateError::InvalidIndex {
                        node: self.id(),
                        prop: prop.to_string(),
                    })?,
            ),
            Shape::Object(_) => None,
        };
        if index.is_none() && self.is_array() {
            return self.set_len(length_of(&input)?);
        }

        if let Some(current) = self.inner.shape.read().slot(prop) {
            if current.same_as(&input) {
                return Ok(false);
            }
        }

        let path = extend(&self.inner.path, prop);
        let slot = self.slot_for(input, &path);

        let (previous, structural, old_len) = {
            let mut shape = self.inner.shape.write();
            match &mut *shape {
                Shape::Object(map) => {
                    let previous = map.insert(prop.to_string(), slot);
                    let added = previous.is_none();
                    (previous, added, None)
                }
                Shape::Array(items) => {
                    let index = index.unwrap_or_default();
                    let old_len = items.len();
                    if index < old_len {
                        (Some(std::mem::replace(&mut items[index], slot)), false, None)
                    } else {
                        items.resize(index, Slot::Value(Value::Null));
                        items.push(slot);
                        (None, true, Some(old_len))
                    }
                }
            }
        };

        self.notify(&path, previous.as_ref().map(Slot::to_json), self.snapshot(prop));
        self.trigger(prop);

        if structural {
            match old_len {
                Some(old_len) => {
                    let new_len = index.map_or(old_len, |i| i + 1);
                    self.notify(
                        &extend(&self.inner.path, LENGTH),
                        Some(Value::from(old_len)),
                        Some(Value::from(new_len)),
                    );
                    self.trigger(LENGTH);
                }
                None => self.trigger(KEYS),
            }
        }

        Ok(true)
    }

    /// Remove a property; the change reports the new value as absent.
    ///
    /// On arrays this leaves a null hole and keeps the length.
    pub fn remove(&self, prop: &str) -> Result<bool, StateError> {
        let previous = {
            let mut shape = self.inner.shape.write();
            match &mut *shape {
                Shape::Object(map) => map.shift_remove(prop),
                Shape::Array(items) => {
                    let index = parse_index(prop).ok_or_else(|| StateError::InvalidIndex {
                        node: self.id(),
                        prop: prop.to_string(),
                    })?;
                    match items.get_mut(index) {
                        Some(Slot::Value(Value::Null)) | None => None,
                        Some(slot) => Some(std::mem::replace(slot, Slot::Value(Value::Null))),
                    }
                }
            }
        };

        let Some(previous) = previous else {
            return Ok(false);
        };

        let path = extend(&self.inner.path, prop);
        self.notify(&path, Some(previous.to_json()), None);
        self.trigger(prop);
        if !self.is_array() {
            self.trigger(KEYS);
        }
        Ok(true)
    }

    /// Append to an array, returning the new length.
    pub fn push(&self, value: impl Into<Input>) -> Result<usize, StateError> {
        let len = self.untracked_len_of_array()?;
        self.set(&len.to_string(), value)?;
        Ok(len + 1)
    }

    /// Remove and return the last element of an array.
    pub fn pop(&self) -> Result<Field, StateError> {
        let (index, removed) = {
            let mut shape = self.inner.shape.write();
            let Shape::Array(items) = &mut *shape else {
                return Err(StateError::NotAnArray(self.id()));
            };
            match items.pop() {
                Some(slot) => (items.len(), slot),
                None => return Ok(Field::Absent),
            }
        };

        let prop = index.to_string();
        self.notify(&extend(&self.inner.path, &prop), Some(removed.to_json()), None);
        self.notify(
            &extend(&self.inner.path, LENGTH),
            Some(Value::from(index + 1)),
            Some(Value::from(index)),
        );
        self.trigger(&prop);
        self.trigger(LENGTH);

        Ok(match removed {
            Slot::Value(value) => Field::Value(value),
            Slot::Node(node) => Field::Node(node),
            Slot::Date(date) => Field::Value(date_json(date)),
        })
    }

    /// Truncate or extend an array.
    ///
    /// Always notifies, even when the length is unchanged: length writes are
    /// how truncation and growth are observed.
    pub fn set_len(&self, len: usize) -> Result<bool, StateError> {
        let (old_len, truncated) = {
            let mut shape = self.inner.shape.write();
            let Shape::Array(items) = &mut *shape else {
                return Err(StateError::NotAnArray(self.id()));
            };
            let old_len = items.len();
            if len > old_len + MAX_ARRAY_GROWTH {
                return Err(StateError::InvalidLength(len.to_string()));
            }
            let truncated = old_len.saturating_sub(len);
            items.resize(len, Slot::Value(Value::Null));
            (old_len, truncated)
        };

        self.notify(
            &extend(&self.inner.path, LENGTH),
            Some(Value::from(old_len)),
            Some(Value::from(len)),
        );
        self.trigger(LENGTH);
        for index in len..len + truncated {
            self.trigger(&index.to_string());
        }
        Ok(true)
    }

    /// Mutate a date in place and notify the owning property.
    pub(crate) fn update_date<F>(
        &self,
        prop: &str,
        component: &'static str,
        value: i64,
        update: F,
    ) -> Result<(), StateError>
    where
        F: FnOnce(DateTime<Utc>) -> Option<DateTime<Utc>>,
    {
        let (old, new) = {
            let mut shape = self.inner.shape.write();
            let Some(Slot::Date(date)) = shape.slot_mut(prop) else {
                return Err(StateError::NotADate(prop.to_string()));
            };
            let old = *date;
            let new = update(old).ok_or_else(|| StateError::InvalidDate {
                prop: prop.to_string(),
                component,
                value,
            })?;
            *date = new;
            (old, new)
        };

        let path = extend(&self.inner.path, prop);
        self.notify(&path, Some(date_json(old)), Some(date_json(new)));
        self.trigger(prop);
        Ok(())
    }

    fn slot_for(&self, input: Input, path: &Path) -> Slot {
        match input {
            Input::Value(value) => ingest(value, &self.inner.root, path.clone()),
            Input::Date(date) => Slot::Date(date),
            // A node keeps its identity only at the path it was ingested at.
            Input::Node(node) if self.same_root(&node) && node.inner.path == *path && !node.reaches(self.id()) => {
                Slot::Node(node)
            }
            Input::Node(node) => ingest(node.to_json(), &self.inner.root, path.clone()),
            Input::Absent => Slot::Value(Value::Null),
        }
    }

    /// Whether `target` is this node or one of its descendants.
    fn reaches(&self, target: NodeId) -> bool {
        if self.id() == target {
            return true;
        }
        let children: Vec<Reactive> = match &*self.inner.shape.read() {
            Shape::Object(map) => map.values().filter_map(slot_node).collect(),
            Shape::Array(items) => items.iter().filter_map(slot_node).collect(),
        };
        children.iter().any(|child| child.reaches(target))
    }

    fn untracked_len_of_array(&self) -> Result<usize, StateError> {
        match &*self.inner.shape.read() {
            Shape::Array(items) => Ok(items.len()),
            Shape::Object(_) => Err(StateError::NotAnArray(self.id())),
        }
    }

    fn snapshot(&self, prop: &str) -> Option<Value> {
        self.inner.shape.read().slot(prop).map(Slot::to_json)
    }

    // ------------------------------------------------------------------------
    // Dependency bookkeeping
    // ------------------------------------------------------------------------

    fn dependency(&self, prop: &str) -> Arc<Dependency> {
        Arc::clone(
            self.inner
                .dependencies
                .lock()
                .entry(prop.to_string())
                .or_insert_with(Dependency::new),
        )
    }

    pub(crate) fn track(&self, prop: &str) {
        let dependency = self.dependency(prop);
        ReactiveContext::track(&dependency);
    }

    fn track_structure(&self) {
        if self.is_array() {
            self.track(LENGTH);
        } else {
            self.track(KEYS);
        }
    }

    fn trigger(&self, prop: &str) {
        let dependency = self.inner.dependencies.lock().get(prop).cloned();
        if let Some(dependency) = dependency {
            trace!(node = %self.id(), prop, "property changed");
            dependency.trigger();
        }
    }

    fn notify(&self, path: &Path, old_value: Option<Value>, new_value: Option<Value>) {
        let path = path.join(".");
        let handlers = self.inner.root.listeners.matching(&path);
        if handlers.is_empty() {
            return;
        }
        let change = Change {
            path,
            old_value,
            new_value,
        };
        for handler in handlers {
            handler(&change);
        }
    }
}

fn slot_node(slot: &Slot) -> Option<Reactive> {
    match slot {
        Slot::Node(node) => Some(node.clone()),
        _ => None,
    }
}

fn length_of(input: &Input) -> Result<usize, StateError> {
    let invalid = || StateError::InvalidLength(format!("{input:?}"));
    match input {
        Input::Value(value) => {
            let len = value.as_f64().ok_or_else(invalid)?;
            if len < 0.0 || len.fract() != 0.0 || len > u32::MAX as f64 {
                return Err(invalid());
            }
            Ok(len as usize)
        }
        _ => Err(invalid()),
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Reactive {}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.inner.id)
            .field("path", &self.path())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Scheduler};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn state() -> Reactive {
        Reactive::wrap(json!({
            "count": 0,
            "user": { "name": "Ada", "tags": ["a", "b"] },
            "items": [1, 2, 3]
        }))
        .unwrap()
    }

    #[test]
    fn wrap_is_idempotent() {
        let root = state();
        let again = Reactive::wrap(root.clone()).unwrap();
        assert_eq!(root, again);
        assert_eq!(Reactive::wrap(&again).unwrap(), root);
    }

    #[test]
    fn wrapping_a_primitive_fails() {
        assert_eq!(
            Reactive::wrap(json!(3)).unwrap_err(),
            StateError::NotAContainer("a number")
        );
    }

    #[test]
    fn nested_reads_return_the_same_node() {
        let root = state();
        let first = root.get("user").into_node().unwrap();
        let second = root.get("user").into_node().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.path(), "user");
        assert_eq!(first.get("tags").into_node().unwrap().path(), "user.tags");
    }

    #[test]
    fn get_path_walks_nodes() {
        let root = state();
        assert_eq!(root.get_path("user.name").as_str(), Some("Ada"));
        assert_eq!(root.get_path("user.tags.1").as_str(), Some("b"));
        assert!(root.get_path("user.name.first").is_absent());
        assert!(root.get_path("missing").is_absent());
    }

    #[test]
    fn array_length_reads() {
        let root = state();
        let items = root.get("items").into_node().unwrap();
        assert_eq!(items.get(LENGTH).as_i64(), Some(3));
        assert_eq!(items.len(), 3);
        assert_eq!(items.keys(), vec!["0", "1", "2"]);
    }

    #[test]
    fn redundant_write_is_a_noop() {
        let root = state();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let _sub = root
            .add_listener("count", move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(!root.set("count", 0).unwrap());
        assert!(!root.set("count", 0.0).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert!(root.set("count", 1).unwrap());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composite_writes_always_replace() {
        let root = state();
        let before = root.get("user").into_node().unwrap();
        assert!(root.set("user", json!({ "name": "Ada" })).unwrap());
        let after = root.get("user").into_node().unwrap();
        assert_ne!(before, after);
        assert_eq!(after.path(), "user");
    }

    #[test]
    fn storing_a_node_at_its_own_path_keeps_identity() {
        let root = state();
        let user = root.get("user").into_node().unwrap();
        assert!(!root.set("user", &user).unwrap());

        root.remove("user").unwrap();
        assert!(root.set("user", &user).unwrap());
        assert_eq!(root.get("user").into_node().unwrap(), user);
    }

    #[test]
    fn moved_nodes_report_their_new_path() {
        let root = state();
        let user = root.get("user").into_node().unwrap();
        root.set("owner", &user).unwrap();
        root.remove("user").unwrap();

        let owner = root.get("owner").into_node().unwrap();
        assert_ne!(owner, user);
        assert_eq!(owner.path(), "owner");
        assert_eq!(owner.get("tags").into_node().unwrap().path(), "owner.tags");

        let paths = Arc::new(Mutex::new(Vec::new()));
        let paths_clone = paths.clone();
        let _sub = root
            .add_listener("*", move |change| paths_clone.lock().push(change.path.clone()))
            .unwrap();
        owner.set("name", "Grace").unwrap();
        assert_eq!(*paths.lock(), vec!["owner.name"]);
        assert_eq!(root.get_path("owner.name").as_str(), Some("Grace"));
    }

    #[test]
    fn storing_an_ancestor_copies_it() {
        let root = state();
        let user = root.get("user").into_node().unwrap();
        user.set("root", &root).unwrap();
        let copy = user.get("root").into_node().unwrap();
        assert_ne!(copy, root);
        assert_eq!(copy.get("count").as_i64(), Some(0));
    }

    #[test]
    fn foreign_nodes_are_copied() {
        let root = state();
        let other = Reactive::wrap(json!({ "x": 1 })).unwrap();
        root.set("other", &other).unwrap();
        let stored = root.get("other").into_node().unwrap();
        assert_ne!(stored, other);
        assert!(stored.same_root(&root));
        assert_eq!(stored.to_json(), json!({ "x": 1 }));
    }

    #[test]
    fn push_pop_and_set_len() {
        let root = state();
        let items = root.get("items").into_node().unwrap();

        assert_eq!(items.push(4).unwrap(), 4);
        assert_eq!(items.to_json(), json!([1, 2, 3, 4]));

        assert_eq!(items.pop().unwrap().as_i64(), Some(4));
        assert!(items.set_len(1).unwrap());
        assert_eq!(items.to_json(), json!([1]));

        items.set("3", "x").unwrap();
        assert_eq!(items.to_json(), json!([1, null, null, "x"]));

        items.set(LENGTH, 2).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn array_rejects_non_index_props() {
        let root = state();
        let items = root.get("items").into_node().unwrap();
        assert!(matches!(
            items.set("first", 1),
            Err(StateError::InvalidIndex { .. })
        ));
        assert!(matches!(items.set("01", 1), Err(StateError::InvalidIndex { .. })));
        assert!(matches!(items.set(LENGTH, -1), Err(StateError::InvalidLength(_))));
        assert!(matches!(root.push(1), Err(StateError::NotAnArray(_))));
    }

    #[test]
    fn oversized_growth_is_rejected() {
        let root = state();
        let items = root.get("items").into_node().unwrap();

        assert!(matches!(
            items.set("18446744073709551615", 1),
            Err(StateError::InvalidIndex { .. })
        ));
        assert!(matches!(
            items.set(&(3 + MAX_ARRAY_GROWTH + 1).to_string(), 1),
            Err(StateError::InvalidIndex { .. })
        ));
        assert!(matches!(
            items.set_len(u32::MAX as usize),
            Err(StateError::InvalidLength(_))
        ));
        assert!(matches!(
            items.set(LENGTH, u32::MAX),
            Err(StateError::InvalidLength(_))
        ));
        assert_eq!(items.to_json(), json!([1, 2, 3]));
    }

    #[test]
    fn remove_reports_absent() {
        let root = state();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let changes_clone = changes.clone();
        let _sub = root
            .add_listener("count", move |change| changes_clone.lock().push(change.clone()))
            .unwrap();

        assert!(root.remove("count").unwrap());
        assert!(!root.remove("count").unwrap());

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value, Some(json!(0)));
        assert_eq!(changes[0].new_value, None);
    }

    #[tokio::test]
    async fn effects_track_reads_and_rerun_on_writes() {
        let scheduler = Scheduler::default();
        let root = state();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let effect = Effect::new_sync(&scheduler, {
            let root = root.clone();
            let seen = seen.clone();
            move || {
                seen.lock().push(root.get("count").to_string());
                Ok(())
            }
        });
        effect.run().await.unwrap();

        root.set("count", 1).unwrap();
        root.set("count", 2).unwrap();
        root.set("count", 3).unwrap();
        scheduler.settle().await;

        assert_eq!(*seen.lock(), vec!["0", "3"]);
    }

    #[tokio::test]
    async fn descendant_writes_do_not_trigger_ancestor_reads() {
        let scheduler = Scheduler::default();
        let root = state();

        let effect = Effect::new_sync(&scheduler, {
            let root = root.clone();
            move || {
                root.get("user");
                Ok(())
            }
        });
        effect.run().await.unwrap();

        let user = root.get("user").into_node().unwrap();
        user.set("name", "Grace").unwrap();
        assert_eq!(scheduler.pending_count(), 0);

        root.set("user", json!({})).unwrap();
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[tokio::test]
    async fn structural_reads_rerun_on_insertion() {
        let scheduler = Scheduler::default();
        let root = state();
        let user = root.get("user").into_node().unwrap();

        let effect = Effect::new_sync(&scheduler, {
            let user = user.clone();
            move || {
                user.keys();
                Ok(())
            }
        });
        effect.run().await.unwrap();

        user.set("name", "Grace").unwrap();
        assert_eq!(scheduler.pending_count(), 0);

        user.set("email", "grace@example.com").unwrap();
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[tokio::test]
    async fn set_len_notifies_even_when_equal() {
        let scheduler = Scheduler::default();
        let root = state();
        let items = root.get("items").into_node().unwrap();

        let effect = Effect::new_sync(&scheduler, {
            let items = items.clone();
            move || {
                items.len();
                Ok(())
            }
        });
        effect.run().await.unwrap();

        items.set_len(3).unwrap();
        assert_eq!(scheduler.pending_count(), 1);
    }
}

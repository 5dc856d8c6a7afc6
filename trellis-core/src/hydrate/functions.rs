//! Named function registry.
//!
//! Functions cannot travel inside a serialized descriptor. Instead both
//! sides register the same functions under the same names: the server
//! writes names into the bootstrap and the client looks them up here.

use std::fmt;
use std::sync::OnceLock;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::dom::Event;
use crate::error::HydrationError;
use crate::render::{ChildrenThunk, Descriptor, Handler, Thunk, ValueThunk};
use crate::state::Reactive;

/// Which slot of a descriptor a function fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// Child thunk producing a descriptor.
    Thunk,
    /// Attribute thunk producing a value.
    Value,
    /// Children thunk producing a descriptor list.
    Children,
    Handler,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thunk => "thunk",
            Self::Value => "value thunk",
            Self::Children => "children thunk",
            Self::Handler => "handler",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
enum Registered {
    Thunk(Thunk),
    Value(ValueThunk),
    Children(ChildrenThunk),
    Handler(Handler),
}

impl Registered {
    fn kind(&self) -> FunctionKind {
        match self {
            Self::Thunk(_) => FunctionKind::Thunk,
            Self::Value(_) => FunctionKind::Value,
            Self::Children(_) => FunctionKind::Children,
            Self::Handler(_) => FunctionKind::Handler,
        }
    }
}

/// Functions addressable by name.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: DashMap<String, Registered>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static FunctionRegistry {
        static GLOBAL: OnceLock<FunctionRegistry> = OnceLock::new();
        GLOBAL.get_or_init(FunctionRegistry::new)
    }

    fn insert(&self, name: &str, function: Registered) {
        if let Some(previous) = self.functions.insert(name.to_string(), function) {
            debug!(name, replaced = %previous.kind(), "function re-registered");
        }
    }

    /// Register a child thunk and return it, named.
    pub fn register_thunk<F>(&self, name: &str, f: F) -> Thunk
    where
        F: Fn(&Reactive) -> Descriptor + Send + Sync + 'static,
    {
        let thunk = Thunk::named(name, f);
        self.insert(name, Registered::Thunk(thunk.clone()));
        thunk
    }

    pub fn register_value<F>(&self, name: &str, f: F) -> ValueThunk
    where
        F: Fn(&Reactive) -> Value + Send + Sync + 'static,
    {
        let thunk = ValueThunk::named(name, f);
        self.insert(name, Registered::Value(thunk.clone()));
        thunk
    }

    pub fn register_children<F>(&self, name: &str, f: F) -> ChildrenThunk
    where
        F: Fn(&Reactive) -> Vec<Descriptor> + Send + Sync + 'static,
    {
        let thunk = ChildrenThunk::named(name, f);
        self.insert(name, Registered::Children(thunk.clone()));
        thunk
    }

    pub fn register_handler<F>(&self, name: &str, f: F) -> Handler
    where
        F: Fn(&Event, &Reactive) + Send + Sync + 'static,
    {
        let handler = Handler::named(name, f);
        self.insert(name, Registered::Handler(handler.clone()));
        handler
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<FunctionKind> {
        self.functions.get(name).map(|entry| entry.kind())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn lookup(&self, name: &str) -> Result<Registered, HydrationError> {
        self.functions
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HydrationError::UnknownFunction(name.to_string()))
    }

    pub fn thunk(&self, name: &str) -> Result<Thunk, HydrationError> {
        match self.lookup(name)? {
            Registered::Thunk(thunk) => Ok(thunk),
            other => Err(mismatch(name, FunctionKind::Thunk, &other)),
        }
    }

    pub fn value(&self, name: &str) -> Result<ValueThunk, HydrationError> {
        match self.lookup(name)? {
            Registered::Value(thunk) => Ok(thunk),
            other => Err(mismatch(name, FunctionKind::Value, &other)),
        }
    }

    pub fn children(&self, name: &str) -> Result<ChildrenThunk, HydrationError> {
        match self.lookup(name)? {
            Registered::Children(thunk) => Ok(thunk),
            other => Err(mismatch(name, FunctionKind::Children, &other)),
        }
    }

    pub fn handler(&self, name: &str) -> Result<Handler, HydrationError> {
        match self.lookup(name)? {
            Registered::Handler(handler) => Ok(handler),
            other => Err(mismatch(name, FunctionKind::Handler, &other)),
        }
    }
}

fn mismatch(name: &str, expected: FunctionKind, found: &Registered) -> HydrationError {
    HydrationError::FunctionKind {
        name: name.to_string(),
        expected: expected.as_str(),
        found: found.kind().as_str(),
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("names", &names).finish()
    }
}

//! Descriptors
//!
//! A [`Descriptor`] describes a desired presentation node. Descriptors are
//! immutable once built and cheap to clone; the renderer never changes them.
//!
//! Functions embedded in descriptors take the render state as their only
//! argument. A function that should survive hydration must carry a name
//! registered in a [`FunctionRegistry`](crate::hydrate::FunctionRegistry).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::dom::{self, Event};
use crate::state::Reactive;

/// A function of the render state, optionally named for hydration.
pub struct Func<T> {
    name: Option<Arc<str>>,
    f: Arc<dyn Fn(&Reactive) -> T + Send + Sync>,
}

/// Produces a descriptor: a reactive text source or a reactive subtree.
pub type Thunk = Func<Descriptor>;

/// Produces an attribute value.
pub type ValueThunk = Func<Value>;

/// Produces a child list.
pub type ChildrenThunk = Func<Vec<Descriptor>>;

impl<T> Func<T> {
    /// An anonymous function. It renders normally but cannot be hydrated.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Reactive) -> T + Send + Sync + 'static,
    {
        Self {
            name: None,
            f: Arc::new(f),
        }
    }

    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Reactive) -> T + Send + Sync + 'static,
    {
        Self {
            name: Some(Arc::from(name)),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn call(&self, state: &Reactive) -> T {
        (self.f)(state)
    }
}

impl<T> Clone for Func<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

impl<T> fmt::Debug for Func<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Func({name})"),
            None => f.write_str("Func(<anonymous>)"),
        }
    }
}

/// An event handler. Handlers are attached as-is, never invoked to resolve
/// a value.
#[derive(Clone)]
pub struct Handler {
    name: Option<Arc<str>>,
    f: Arc<dyn Fn(&Event, &Reactive) + Send + Sync>,
}

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Event, &Reactive) + Send + Sync + 'static,
    {
        Self {
            name: None,
            f: Arc::new(f),
        }
    }

    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Event, &Reactive) + Send + Sync + 'static,
    {
        Self {
            name: Some(Arc::from(name)),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn call(&self, event: &Event, state: &Reactive) {
        (self.f)(event, state)
    }

    /// Bind to a state, producing a host event listener.
    pub fn bind(&self, state: &Reactive) -> dom::EventListener {
        let handler = self.clone();
        let state = state.clone();
        Arc::new(move |event| handler.call(event, &state))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Handler({name})"),
            None => f.write_str("Handler(<anonymous>)"),
        }
    }
}

/// The value of one element attribute.
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// A fixed value. Strings are still templated against the state.
    Static(Value),
    Thunk(ValueThunk),
    Handler(Handler),
}

/// The children of an element.
#[derive(Debug, Clone)]
pub enum Children {
    List(Vec<Descriptor>),
    Thunk(ChildrenThunk),
}

impl Default for Children {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct ElementDescriptor {
    pub tag: String,
    pub attributes: IndexMap<String, AttrValue>,
    pub children: Children,
}

/// A desired presentation node.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Null, boolean, number or string. Strings may contain `${...}`.
    Primitive(Value),
    Thunk(Thunk),
    /// An existing host node, inserted as-is.
    Node(dom::Node),
    Element(Arc<ElementDescriptor>),
}

impl Descriptor {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Primitive(Value::String(text.into()))
    }

    pub fn thunk<F>(f: F) -> Self
    where
        F: Fn(&Reactive) -> Descriptor + Send + Sync + 'static,
    {
        Self::Thunk(Thunk::new(f))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }
}

impl From<Value> for Descriptor {
    fn from(value: Value) -> Self {
        Self::Primitive(value)
    }
}

impl From<&str> for Descriptor {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Descriptor {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<i64> for Descriptor {
    fn from(n: i64) -> Self {
        Self::Primitive(Value::from(n))
    }
}

impl From<f64> for Descriptor {
    fn from(n: f64) -> Self {
        Self::Primitive(Value::from(n))
    }
}

impl From<bool> for Descriptor {
    fn from(b: bool) -> Self {
        Self::Primitive(Value::Bool(b))
    }
}

impl From<dom::Node> for Descriptor {
    fn from(node: dom::Node) -> Self {
        Self::Node(node)
    }
}

impl From<Thunk> for Descriptor {
    fn from(thunk: Thunk) -> Self {
        Self::Thunk(thunk)
    }
}

impl From<ElementBuilder> for Descriptor {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

/// Start building an element descriptor.
pub fn element(tag: &str) -> ElementBuilder {
    ElementBuilder {
        tag: tag.to_string(),
        attributes: IndexMap::new(),
        children: Vec::new(),
        children_thunk: None,
    }
}

/// Builder for [`ElementDescriptor`].
///
/// ```rust,ignore
/// let counter = element("button")
///     .attr("class", "counter")
///     .on("onclick", Handler::named("increment", increment))
///     .child("Count: ${count}")
///     .build();
/// ```
#[derive(Debug)]
pub struct ElementBuilder {
    tag: String,
    attributes: IndexMap<String, AttrValue>,
    children: Vec<Descriptor>,
    children_thunk: Option<ChildrenThunk>,
}

impl ElementBuilder {
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes
            .insert(name.to_string(), AttrValue::Static(value.into()));
        self
    }

    pub fn attr_fn(mut self, name: &str, thunk: ValueThunk) -> Self {
        self.attributes
            .insert(name.to_string(), AttrValue::Thunk(thunk));
        self
    }

    /// Attach an event handler under an event-shaped key such as `onclick`.
    pub fn on(mut self, key: &str, handler: Handler) -> Self {
        self.attributes
            .insert(key.to_string(), AttrValue::Handler(handler));
        self
    }

    pub fn child(mut self, child: impl Into<Descriptor>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, D>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Descriptor>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Compute the child list from state. Replaces any listed children.
    pub fn children_fn(mut self, thunk: ChildrenThunk) -> Self {
        self.children_thunk = Some(thunk);
        self
    }

    pub fn build(self) -> Descriptor {
        let children = match self.children_thunk {
            Some(thunk) => Children::Thunk(thunk),
            None => Children::List(self.children),
        };
        Descriptor::Element(Arc::new(ElementDescriptor {
            tag: self.tag,
            attributes: self.attributes,
            children,
        }))
    }
}

//! Host Tree
//!
//! An in-memory presentation tree with the primitives the renderer needs:
//! element and text creation, attributes, style properties, event
//! handlers, and child append/remove/replace. Nodes are reference-counted
//! handles; a child holds only a weak link to its parent.
//!
//! Every node also owns the effects bound to it. Dropping the last handle to
//! a node drops those effects, which is how a discarded subtree stops
//! reacting to state changes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::HostError;
use crate::reactive::Effect;

/// Elements that never have children or a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

/// Unique identifier for a host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomId(u64);

impl DomId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// An event delivered to a node's handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name without the attribute prefix (`click`, `input`).
    pub kind: String,
    #[serde(default)]
    pub detail: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;

/// What part of a node an effect keeps current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// The content of a text node.
    Text,
    /// The node itself, replaced wholesale on change.
    Subtree,
    /// One attribute of an element.
    Attribute(String),
    /// The full child list of an element.
    Children,
}

/// An effect owned by the node it updates.
#[derive(Debug, Clone)]
pub struct Binding {
    pub kind: BindingKind,
    pub effect: Arc<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Element(String),
    Text,
}

#[derive(Default)]
struct NodeData {
    text: String,
    attributes: IndexMap<String, String>,
    style: IndexMap<String, String>,
    handlers: IndexMap<String, EventListener>,
    children: Vec<Node>,
    parent: Weak<NodeInner>,
    bindings: SmallVec<[Binding; 2]>,
}

struct NodeInner {
    id: DomId,
    kind: Kind,
    data: Mutex<NodeData>,
}

/// Handle to a host node. Clones share the node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Non-owning handle, held by effects that update a node.
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({})", node.id()),
            None => f.write_str("WeakNode(dropped)"),
        }
    }
}

impl Node {
    fn with_kind(kind: Kind, text: String) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: DomId::next(),
                kind,
                data: Mutex::new(NodeData {
                    text,
                    ..NodeData::default()
                }),
            }),
        }
    }

    /// Create an element. Tag names are stored lowercase.
    pub fn element(tag: &str) -> Self {
        Self::with_kind(Kind::Element(tag.to_ascii_lowercase()), String::new())
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(Kind::Text, content.into())
    }

    pub fn id(&self) -> DomId {
        self.inner.id
    }

    /// Tag name, `None` for text nodes.
    pub fn tag(&self) -> Option<&str> {
        match &self.inner.kind {
            Kind::Element(tag) => Some(tag),
            Kind::Text => None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.inner.kind == Kind::Text
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------------

    /// Replace the content of a text node, or the children of an element
    /// with a single text node.
    pub fn set_text(&self, content: impl Into<String>) {
        let content = content.into();
        match self.inner.kind {
            Kind::Text => self.inner.data.lock().text = content,
            Kind::Element(_) => {
                self.clear_children();
                // A fresh text node has no parent and cannot form a cycle
                let _ = self.append_child(&Node::text(content));
            }
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.inner.kind {
            Kind::Text => self.inner.data.lock().text.clone(),
            Kind::Element(_) => self
                .children()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Attributes and style
    // ------------------------------------------------------------------------

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.data.lock().attributes.get(name).cloned()
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.inner
            .data
            .lock()
            .attributes
            .insert(name.to_string(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.inner.data.lock().attributes.shift_remove(name).is_some()
    }

    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .data
            .lock()
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn style_property(&self, name: &str) -> Option<String> {
        self.inner.data.lock().style.get(name).cloned()
    }

    pub fn set_style_property(&self, name: &str, value: impl Into<String>) {
        self.inner
            .data
            .lock()
            .style
            .insert(name.to_string(), value.into());
    }

    pub fn remove_style_property(&self, name: &str) -> bool {
        self.inner.data.lock().style.shift_remove(name).is_some()
    }

    /// Replace all style properties by parsing `name: value` declarations.
    pub fn set_style_text(&self, text: &str) {
        let style = parse_style(text);
        self.inner.data.lock().style = style;
    }

    /// Style properties serialized as declarations.
    pub fn style_text(&self) -> String {
        style_text(&self.inner.data.lock().style)
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Install the handler for `event`, replacing any previous one.
    pub fn set_handler(&self, event: &str, listener: EventListener) {
        self.inner
            .data
            .lock()
            .handlers
            .insert(event.to_string(), listener);
    }

    pub fn remove_handler(&self, event: &str) -> bool {
        self.inner.data.lock().handlers.shift_remove(event).is_some()
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.inner.data.lock().handlers.contains_key(event)
    }

    /// Deliver `event` to this node's handler. Returns whether one ran.
    pub fn dispatch(&self, event: &Event) -> bool {
        let handler = self.inner.data.lock().handlers.get(&event.kind).cloned();
        match handler {
            Some(handler) => {
                trace!(node = %self.id(), event = %event.kind, "dispatching event");
                handler(event);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Tree structure
    // ------------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .data
            .lock()
            .parent
            .upgrade()
            .map(|inner| Node { inner })
    }

    pub fn children(&self) -> Vec<Node> {
        self.inner.data.lock().children.clone()
    }

    /// The sibling immediately before this node in its parent.
    pub fn previous_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let data = parent.inner.data.lock();
        let index = data.children.iter().position(|child| child.ptr_eq(self))?;
        index.checked_sub(1).map(|prev| data.children[prev].clone())
    }

    pub fn child_count(&self) -> usize {
        self.inner.data.lock().children.len()
    }

    /// Append `child`, moving it out of its current parent first.
    pub fn append_child(&self, child: &Node) -> Result<(), HostError> {
        self.check_insertable(child)?;
        child.detach();
        child.inner.data.lock().parent = Arc::downgrade(&self.inner);
        self.inner.data.lock().children.push(child.clone());
        Ok(())
    }

    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut data = self.inner.data.lock();
            let before = data.children.len();
            data.children.retain(|existing| !existing.ptr_eq(child));
            before != data.children.len()
        };
        if removed {
            child.inner.data.lock().parent = Weak::new();
        }
        removed
    }

    /// Remove and return every child.
    pub fn clear_children(&self) -> Vec<Node> {
        let removed = std::mem::take(&mut self.inner.data.lock().children);
        for child in &removed {
            child.inner.data.lock().parent = Weak::new();
        }
        removed
    }

    /// Remove this node from its parent, if any.
    pub fn detach(&self) -> bool {
        match self.parent() {
            Some(parent) => parent.remove_child(self),
            None => false,
        }
    }

    /// Put `replacement` where this node is in its parent's child list.
    pub fn replace_with(&self, replacement: &Node) -> Result<(), HostError> {
        if self.ptr_eq(replacement) {
            return Ok(());
        }
        let parent = self.parent().ok_or(HostError::Detached(self.id()))?;
        parent.check_insertable(replacement)?;
        replacement.detach();

        {
            let mut data = parent.inner.data.lock();
            let index = data
                .children
                .iter()
                .position(|existing| existing.ptr_eq(self))
                .ok_or(HostError::Detached(self.id()))?;
            data.children[index] = replacement.clone();
        }
        self.inner.data.lock().parent = Weak::new();
        replacement.inner.data.lock().parent = Arc::downgrade(&parent.inner);
        Ok(())
    }

    /// Whether `other` is this node or one of its ancestors.
    fn is_self_or_ancestor(&self, other: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.ptr_eq(other) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    fn check_insertable(&self, child: &Node) -> Result<(), HostError> {
        if self.is_self_or_ancestor(child) {
            return Err(HostError::Cycle {
                parent: self.id(),
                child: child.id(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------------

    pub(crate) fn bind(&self, kind: BindingKind, effect: Arc<Effect>) {
        self.inner.data.lock().bindings.push(Binding { kind, effect });
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.inner.data.lock().bindings.to_vec()
    }

    /// Move the subtree binding driven by `effect` from this node to `to`.
    pub(crate) fn transfer_binding(&self, effect: &Arc<Effect>, to: &Node) {
        let moved = {
            let mut data = self.inner.data.lock();
            let index = data
                .bindings
                .iter()
                .position(|binding| Arc::ptr_eq(&binding.effect, effect));
            index.map(|index| data.bindings.remove(index))
        };
        if let Some(binding) = moved {
            to.inner.data.lock().bindings.push(binding);
        }
    }

    /// Stop every effect bound to this node and its descendants.
    pub fn dispose(&self) {
        let (bindings, children) = {
            let mut data = self.inner.data.lock();
            (std::mem::take(&mut data.bindings), data.children.clone())
        };
        for binding in bindings {
            binding.effect.dispose();
        }
        for child in children {
            child.dispose();
        }
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Serialize the subtree as HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        let tag = match &self.inner.kind {
            Kind::Text => {
                out.push_str(&html_escape::encode_text(&self.inner.data.lock().text));
                return;
            }
            Kind::Element(tag) => tag,
        };

        let (attributes, style, children) = {
            let data = self.inner.data.lock();
            (data.attributes.clone(), style_text(&data.style), data.children.clone())
        };

        out.push('<');
        out.push_str(tag);
        for (name, value) in &attributes {
            push_attribute(out, name, value);
        }
        if !style.is_empty() {
            push_attribute(out, "style", &style);
        }
        out.push('>');

        if is_void(tag) {
            return;
        }
        for child in &children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

pub(crate) fn push_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&html_escape::encode_double_quoted_attribute(value));
    out.push('"');
}

pub(crate) fn parse_style(text: &str) -> IndexMap<String, String> {
    text.split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let (name, value) = (name.trim(), value.trim());
            (!name.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

pub(crate) fn style_text(style: &IndexMap<String, String>) -> String {
    style
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::Element(tag) => f
                .debug_struct("Element")
                .field("id", &self.inner.id)
                .field("tag", tag)
                .field("children", &self.child_count())
                .finish(),
            Kind::Text => f
                .debug_struct("Text")
                .field("id", &self.inner.id)
                .field("text", &self.inner.data.lock().text)
                .finish(),
        }
    }
}

//! Live Renderer
//!
//! Turns a [`Descriptor`] and a state root into a host tree whose reactive
//! parts are each kept current by their own effect.
//!
//! # Binding Granularity
//!
//! | Descriptor part            | Effects                                  |
//! |----------------------------|------------------------------------------|
//! | thunk yielding a primitive | one, rewrites the text node              |
//! | thunk yielding a subtree   | one, replaces the rendered node          |
//! | string with `${...}`       | one, re-evaluates the template           |
//! | plain primitive            | none                                     |
//! | element attribute          | one per attribute                        |
//! | element children           | one for the whole list, rebuilt on change |
//!
//! Effects are owned by the host node they update and capture only a weak
//! handle to it, so discarding a node stops its bindings.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::descriptor::{AttrValue, Children, Descriptor, ElementDescriptor, Thunk};
use crate::config::RenderConfig;
use crate::dom::{BindingKind, Node, WeakNode};
use crate::error::Result;
use crate::reactive::{Effect, ReactiveContext, Scheduler};
use crate::state::{display_json, Reactive};
use crate::template;

/// Renders descriptors into live host trees.
#[derive(Clone)]
pub struct Renderer {
    scheduler: Scheduler,
    config: Arc<RenderConfig>,
}

impl Renderer {
    /// Create a renderer with its own scheduler.
    pub fn new(config: RenderConfig) -> Self {
        Self {
            scheduler: Scheduler::from_config(&config),
            config: Arc::new(config),
        }
    }

    /// Create a renderer that batches through an existing scheduler.
    pub fn with_scheduler(scheduler: Scheduler, config: RenderConfig) -> Self {
        Self {
            scheduler,
            config: Arc::new(config),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `descriptor` against `state`.
    ///
    /// Every binding has run once when the returned future completes.
    pub fn render(&self, descriptor: &Descriptor, state: &Reactive) -> BoxFuture<'static, Result<Node>> {
        let renderer = self.clone();
        let descriptor = descriptor.clone();
        let state = state.clone();
        async move { renderer.render_owned(descriptor, state).await }.boxed()
    }

    /// Render and append the result to `parent`.
    pub async fn mount(&self, parent: &Node, descriptor: &Descriptor, state: &Reactive) -> Result<Node> {
        let node = self.render(descriptor, state).await?;
        parent.append_child(&node)?;
        Ok(node)
    }

    async fn render_owned(&self, descriptor: Descriptor, state: Reactive) -> Result<Node> {
        match descriptor {
            Descriptor::Thunk(thunk) => {
                let first = ReactiveContext::untracked(|| thunk.call(&state));
                if first.is_primitive() {
                    self.bind_text(thunk, state).await
                } else {
                    self.bind_subtree(thunk, state).await
                }
            }
            Descriptor::Primitive(Value::String(text)) if template::has_markers(&text) => {
                self.bind_template(&text, state).await
            }
            Descriptor::Primitive(value) => Ok(Node::text(display_json(&value))),
            Descriptor::Node(node) => Ok(node),
            Descriptor::Element(element) => self.render_element(&element, state).await,
        }
    }

    async fn bind_text(&self, thunk: Thunk, state: Reactive) -> Result<Node> {
        let node = Node::text("");
        let target = node.downgrade();

        let effect = Effect::new_sync(&self.scheduler, move || {
            let Some(node) = target.upgrade() else {
                return Ok(());
            };
            match thunk.call(&state) {
                Descriptor::Primitive(value) => node.set_text(display_json(&value)),
                other => warn!(
                    node = %node.id(),
                    thunk = ?thunk,
                    "text binding produced {:?}; keeping previous text",
                    other
                ),
            }
            Ok(())
        });

        node.bind(BindingKind::Text, Arc::clone(&effect));
        effect.run().await?;
        Ok(node)
    }

    async fn bind_subtree(&self, thunk: Thunk, state: Reactive) -> Result<Node> {
        // The effect keeps only a weak handle to the node it last rendered;
        // the first render is handed back through `initial`.
        let current: Arc<Mutex<Option<WeakNode>>> = Arc::new(Mutex::new(None));
        let initial: Arc<Mutex<Option<Node>>> = Arc::new(Mutex::new(None));
        let renderer = self.clone();
        let (slot, first) = (Arc::clone(&current), Arc::clone(&initial));

        let effect = Effect::new(&self.scheduler, move || {
            let renderer = renderer.clone();
            let state = state.clone();
            let thunk = thunk.clone();
            let slot = Arc::clone(&slot);
            let first = Arc::clone(&first);
            async move {
                let this = ReactiveContext::current();
                let descriptor = thunk.call(&state);
                let rendered = renderer.render(&descriptor, &state).await?;

                let previous = slot.lock().replace(rendered.downgrade());
                let Some(previous) = previous else {
                    *first.lock() = Some(rendered);
                    return Ok(());
                };
                let Some(previous) = previous.upgrade() else {
                    return Ok(());
                };
                if let Some(this) = &this {
                    previous.transfer_binding(this, &rendered);
                }
                if let Err(err) = previous.replace_with(&rendered) {
                    warn!(node = %previous.id(), error = %err, "subtree update was not attached");
                }
                Ok(())
            }
        });

        effect.run().await?;
        let node = initial.lock().take().unwrap_or_else(|| Node::text(""));
        node.bind(BindingKind::Subtree, effect);
        Ok(node)
    }

    async fn bind_template(&self, text: &str, state: Reactive) -> Result<Node> {
        let node = Node::text("");
        let target = node.downgrade();
        let compiled = template::compile(text);

        let effect = Effect::new_sync(&self.scheduler, move || {
            if let Some(node) = target.upgrade() {
                node.set_text(compiled.evaluate(&state));
            }
            Ok(())
        });

        node.bind(BindingKind::Text, Arc::clone(&effect));
        effect.run().await?;
        Ok(node)
    }

    async fn render_element(&self, element: &ElementDescriptor, state: Reactive) -> Result<Node> {
        trace!(tag = %element.tag, attributes = element.attributes.len(), "rendering element");
        let node = Node::element(&element.tag);

        for (key, value) in &element.attributes {
            match (self.config.event_name(key), value) {
                (Some(event), AttrValue::Handler(handler)) => {
                    node.set_handler(event, handler.bind(&state));
                }
                (None, AttrValue::Handler(handler)) => {
                    warn!(key = %key, handler = ?handler, "handler bound to a non-event attribute; skipped");
                }
                (_, AttrValue::Static(_) | AttrValue::Thunk(_)) => {
                    self.bind_attribute(&node, key, value.clone(), state.clone()).await?;
                }
            }
        }

        self.bind_children(&node, element.children.clone(), state).await?;
        Ok(node)
    }

    async fn bind_attribute(&self, node: &Node, key: &str, value: AttrValue, state: Reactive) -> Result<()> {
        let target = node.downgrade();
        let config = Arc::clone(&self.config);
        let name = key.to_string();

        let effect = Effect::new_sync(&self.scheduler, move || {
            let Some(node) = target.upgrade() else {
                return Ok(());
            };
            let resolved = match &value {
                AttrValue::Static(value) => value.clone(),
                AttrValue::Thunk(thunk) => thunk.call(&state),
                AttrValue::Handler(_) => return Ok(()),
            };
            apply_attribute(&node, &name, resolved, &state, &config);
            Ok(())
        });

        node.bind(BindingKind::Attribute(key.to_string()), Arc::clone(&effect));
        effect.run().await
    }

    async fn bind_children(&self, node: &Node, children: Children, state: Reactive) -> Result<()> {
        let target = node.downgrade();
        let renderer = self.clone();

        let effect = Effect::new(&self.scheduler, move || {
            let target = target.clone();
            let renderer = renderer.clone();
            let state = state.clone();
            let children = children.clone();
            async move {
                if target.upgrade().is_none() {
                    return Ok(());
                }
                let list = match &children {
                    Children::List(list) => list.clone(),
                    Children::Thunk(thunk) => thunk.call(&state),
                };

                let mut rendered = Vec::with_capacity(list.len());
                for child in &list {
                    rendered.push(renderer.render(child, &state).await?);
                }

                let Some(node) = target.upgrade() else {
                    return Ok(());
                };
                let dropped = node.clear_children();
                if !dropped.is_empty() {
                    debug!(node = %node.id(), dropped = dropped.len(), "rebuilding child list");
                }
                for child in &rendered {
                    node.append_child(child)?;
                }
                Ok(())
            }
        });

        node.bind(BindingKind::Children, Arc::clone(&effect));
        effect.run().await
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("scheduler", &self.scheduler)
            .field("config", &self.config)
            .finish()
    }
}

/// Write one resolved attribute value onto an element.
fn apply_attribute(node: &Node, key: &str, value: Value, state: &Reactive, config: &RenderConfig) {
    if config.is_style_key(key) {
        match value {
            Value::Object(properties) => {
                for (property, value) in properties {
                    match value {
                        Value::Null => {
                            node.remove_style_property(&property);
                        }
                        value => node.set_style_property(&property, templated(&value, state)),
                    }
                }
            }
            Value::Null => node.set_style_text(""),
            value => node.set_style_text(&templated(&value, state)),
        }
        return;
    }

    match value {
        Value::Null => {
            node.remove_attribute(key);
        }
        value => node.set_attribute(key, templated(&value, state)),
    }
}

fn templated(value: &Value, state: &Reactive) -> String {
    let text = display_json(value);
    if template::has_markers(&text) {
        template::evaluate(&text, state)
    } else {
        text
    }
}

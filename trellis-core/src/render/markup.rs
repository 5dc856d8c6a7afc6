//! Markup Renderer
//!
//! Server-side rendering: the same dispatch as the live renderer, producing
//! an HTML string instead of host nodes. Nothing is bound. Reads happen
//! outside any effect, and event handlers are omitted because they have no
//! meaning in static markup.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use super::descriptor::{AttrValue, Children, Descriptor, ElementDescriptor};
use crate::config::RenderConfig;
use crate::dom::{is_void, parse_style, push_attribute, style_text};
use crate::reactive::ReactiveContext;
use crate::state::{display_json, Reactive};
use crate::template;

/// Renders descriptors to HTML strings.
#[derive(Debug, Clone)]
pub struct MarkupRenderer {
    config: Arc<RenderConfig>,
}

impl MarkupRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `descriptor` against the current contents of `state`.
    pub fn render_to_string(&self, descriptor: &Descriptor, state: &Reactive) -> String {
        ReactiveContext::untracked(|| {
            let mut out = String::new();
            self.write(descriptor, state, &mut out);
            out
        })
    }

    fn write(&self, descriptor: &Descriptor, state: &Reactive, out: &mut String) {
        match descriptor {
            // A thunk's primitive result is text, never a template.
            Descriptor::Thunk(thunk) => match thunk.call(state) {
                Descriptor::Primitive(value) => {
                    out.push_str(&html_escape::encode_text(&display_json(&value)));
                }
                other => self.write(&other, state, out),
            },
            Descriptor::Primitive(value) => {
                out.push_str(&html_escape::encode_text(&text_of(value, state)));
            }
            Descriptor::Node(node) => out.push_str(&node.to_html()),
            Descriptor::Element(element) => self.write_element(element, state, out),
        }
    }

    fn write_element(&self, element: &ElementDescriptor, state: &Reactive, out: &mut String) {
        trace!(tag = %element.tag, "writing element markup");
        let tag = element.tag.to_ascii_lowercase();
        let mut style: IndexMap<String, String> = IndexMap::new();

        out.push('<');
        out.push_str(&tag);
        for (key, value) in &element.attributes {
            let resolved = match value {
                AttrValue::Handler(_) => continue,
                _ if self.config.event_name(key).is_some() => continue,
                AttrValue::Static(value) => value.clone(),
                AttrValue::Thunk(thunk) => thunk.call(state),
            };

            if self.config.is_style_key(key) {
                merge_style(&mut style, resolved, state);
                continue;
            }
            if !resolved.is_null() {
                push_attribute(out, key, &text_of(&resolved, state));
            }
        }
        if !style.is_empty() {
            push_attribute(out, "style", &style_text(&style));
        }
        out.push('>');

        if is_void(&tag) {
            return;
        }

        let children = match &element.children {
            Children::List(list) => list.clone(),
            Children::Thunk(thunk) => thunk.call(state),
        };
        for child in &children {
            self.write(child, state, out);
        }

        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }
}

impl Default for MarkupRenderer {
    fn default() -> Self {
        Self::new(RenderConfig::server())
    }
}

fn text_of(value: &Value, state: &Reactive) -> String {
    let text = display_json(value);
    if template::has_markers(&text) {
        template::evaluate(&text, state)
    } else {
        text
    }
}

fn merge_style(style: &mut IndexMap<String, String>, value: Value, state: &Reactive) {
    match value {
        Value::Object(properties) => {
            for (property, value) in properties {
                if value.is_null() {
                    style.shift_remove(&property);
                } else {
                    style.insert(property, text_of(&value, state));
                }
            }
        }
        Value::Null => style.clear(),
        value => *style = parse_style(&text_of(&value, state)),
    }
}

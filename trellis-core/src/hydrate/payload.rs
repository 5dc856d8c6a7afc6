//! Bootstrap payload.
//!
//! The payload is plain JSON. Its fields are, in order: the state roots to
//! re-register, the function reference table, the render options, and the
//! render call itself. Functions appear in the descriptor only as
//! placeholders that the table maps to registered names.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::functions::{FunctionKind, FunctionRegistry};
use crate::config::RenderConfig;
use crate::error::HydrationError;
use crate::render::{AttrValue, Children, Descriptor, ElementDescriptor};
use crate::state::StateRegistry;

const PLACEHOLDER_PREFIX: &str = "__fn_";

/// Data form of a [`Descriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DescriptorData {
    Primitive {
        value: Value,
    },
    Thunk {
        placeholder: String,
    },
    Element {
        tag: String,
        #[serde(default)]
        attributes: IndexMap<String, AttrData>,
        #[serde(default)]
        children: ChildrenData,
    },
}

/// Data form of an [`AttrValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttrData {
    Static { value: Value },
    Thunk { placeholder: String },
    Handler { placeholder: String },
}

/// Data form of [`Children`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildrenData {
    List { items: Vec<DescriptorData> },
    Thunk { placeholder: String },
}

impl Default for ChildrenData {
    fn default() -> Self {
        Self::List { items: Vec::new() }
    }
}

/// One entry of the function reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub kind: FunctionKind,
    pub name: String,
}

/// Where the client puts the hydrated tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTarget {
    /// The markup element emitted right before the bootstrap script.
    PreviousSibling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCall {
    pub target: RenderTarget,
    /// Registered name of the state root to render against.
    pub state: String,
    pub descriptor: DescriptorData,
}

/// Everything the client needs to re-create a server render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    pub states: IndexMap<String, Value>,
    pub functions: IndexMap<String, FunctionRef>,
    pub options: RenderConfig,
    pub render: RenderCall,
}

impl Bootstrap {
    /// Capture `descriptor` rendered against the root registered as
    /// `state_name`, together with every root in `states`.
    pub fn capture(
        descriptor: &Descriptor,
        state_name: &str,
        states: &StateRegistry,
        options: &RenderConfig,
    ) -> Result<Self, HydrationError> {
        if states.get(state_name).is_none() {
            return Err(HydrationError::UnknownState(state_name.to_string()));
        }

        let snapshots: IndexMap<String, Value> = states
            .names()
            .into_iter()
            .filter_map(|name| {
                let root = states.get(&name)?;
                Some((name, root.to_json()))
            })
            .collect();

        let mut dehydrator = Dehydrator::default();
        let descriptor = dehydrator.descriptor(descriptor, "root")?;

        Ok(Self {
            states: snapshots,
            functions: dehydrator.table,
            options: options.clone(),
            render: RenderCall {
                target: RenderTarget::PreviousSibling,
                state: state_name.to_string(),
                descriptor,
            },
        })
    }

    pub fn to_json(&self) -> Result<String, HydrationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self, HydrationError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// The `<script>` element carrying this payload.
    ///
    /// `</` is written as `<\/` so the payload cannot close the script early;
    /// JSON reads both spellings the same.
    pub fn to_script(&self) -> Result<String, HydrationError> {
        let payload = self.to_json()?.replace("</", "<\\/");
        Ok(format!(
            r#"<script type="{}">{}</script>"#,
            html_escape::encode_double_quoted_attribute(&self.options.bootstrap_script_type),
            payload
        ))
    }

    /// Find and parse the payload of the first bootstrap script in `html`.
    pub fn extract(html: &str, script_type: &str) -> Result<Self, HydrationError> {
        let open = format!(
            r#"<script type="{}">"#,
            html_escape::encode_double_quoted_attribute(script_type)
        );
        let start = html.find(&open).ok_or(HydrationError::MissingPayload)? + open.len();
        let len = html[start..]
            .find("</script>")
            .ok_or(HydrationError::MissingPayload)?;
        Self::from_json(&html[start..start + len])
    }

    /// Turn the data descriptor back into a live one, resolving every
    /// placeholder through the table and `functions`.
    pub fn descriptor(&self, functions: &FunctionRegistry) -> Result<Descriptor, HydrationError> {
        Rehydrator {
            table: &self.functions,
            functions,
        }
        .descriptor(&self.render.descriptor)
    }
}

#[derive(Default)]
struct Dehydrator {
    table: IndexMap<String, FunctionRef>,
    assigned: HashMap<(FunctionKind, String), String>,
}

impl Dehydrator {
    fn placeholder(&mut self, kind: FunctionKind, name: Option<&str>, context: &str) -> Result<String, HydrationError> {
        let name = name.ok_or_else(|| HydrationError::AnonymousFunction(context.to_string()))?;
        let key = (kind, name.to_string());
        if let Some(existing) = self.assigned.get(&key) {
            return Ok(existing.clone());
        }
        let placeholder = format!("{PLACEHOLDER_PREFIX}{}", self.table.len());
        self.table.insert(
            placeholder.clone(),
            FunctionRef {
                kind,
                name: name.to_string(),
            },
        );
        self.assigned.insert(key, placeholder.clone());
        Ok(placeholder)
    }

    fn descriptor(&mut self, descriptor: &Descriptor, context: &str) -> Result<DescriptorData, HydrationError> {
        Ok(match descriptor {
            Descriptor::Primitive(value) => DescriptorData::Primitive {
                value: value.clone(),
            },
            Descriptor::Thunk(thunk) => DescriptorData::Thunk {
                placeholder: self.placeholder(FunctionKind::Thunk, thunk.name(), context)?,
            },
            Descriptor::Node(_) => return Err(HydrationError::HostNode),
            Descriptor::Element(element) => self.element(element, context)?,
        })
    }

    fn element(&mut self, element: &ElementDescriptor, context: &str) -> Result<DescriptorData, HydrationError> {
        let context = format!("{context} > {}", element.tag);

        let mut attributes = IndexMap::with_capacity(element.attributes.len());
        for (key, value) in &element.attributes {
            let slot = format!("{context}[{key}]");
            let data = match value {
                AttrValue::Static(value) => AttrData::Static {
                    value: value.clone(),
                },
                AttrValue::Thunk(thunk) => AttrData::Thunk {
                    placeholder: self.placeholder(FunctionKind::Value, thunk.name(), &slot)?,
                },
                AttrValue::Handler(handler) => AttrData::Handler {
                    placeholder: self.placeholder(FunctionKind::Handler, handler.name(), &slot)?,
                },
            };
            attributes.insert(key.clone(), data);
        }

        let children = match &element.children {
            Children::List(items) => ChildrenData::List {
                items: items
                    .iter()
                    .enumerate()
                    .map(|(index, child)| self.descriptor(child, &format!("{context}:{index}")))
                    .collect::<Result<_, _>>()?,
            },
            Children::Thunk(thunk) => ChildrenData::Thunk {
                placeholder: self.placeholder(FunctionKind::Children, thunk.name(), &context)?,
            },
        };

        Ok(DescriptorData::Element {
            tag: element.tag.clone(),
            attributes,
            children,
        })
    }
}

struct Rehydrator<'a> {
    table: &'a IndexMap<String, FunctionRef>,
    functions: &'a FunctionRegistry,
}

impl Rehydrator<'_> {
    fn resolve(&self, placeholder: &str, expected: FunctionKind) -> Result<&str, HydrationError> {
        let entry = self
            .table
            .get(placeholder)
            .ok_or_else(|| HydrationError::UnknownPlaceholder(placeholder.to_string()))?;
        if entry.kind != expected {
            return Err(HydrationError::FunctionKind {
                name: entry.name.clone(),
                expected: expected.as_str(),
                found: entry.kind.as_str(),
            });
        }
        Ok(&entry.name)
    }

    fn descriptor(&self, data: &DescriptorData) -> Result<Descriptor, HydrationError> {
        Ok(match data {
            DescriptorData::Primitive { value } => Descriptor::Primitive(value.clone()),
            DescriptorData::Thunk { placeholder } => {
                let name = self.resolve(placeholder, FunctionKind::Thunk)?;
                Descriptor::Thunk(self.functions.thunk(name)?)
            }
            DescriptorData::Element {
                tag,
                attributes,
                children,
            } => {
                let mut attrs = IndexMap::with_capacity(attributes.len());
                for (key, attr) in attributes {
                    let value = match attr {
                        AttrData::Static { value } => AttrValue::Static(value.clone()),
                        AttrData::Thunk { placeholder } => {
                            let name = self.resolve(placeholder, FunctionKind::Value)?;
                            AttrValue::Thunk(self.functions.value(name)?)
                        }
                        AttrData::Handler { placeholder } => {
                            let name = self.resolve(placeholder, FunctionKind::Handler)?;
                            AttrValue::Handler(self.functions.handler(name)?)
                        }
                    };
                    attrs.insert(key.clone(), value);
                }

                let children = match children {
                    ChildrenData::List { items } => Children::List(
                        items
                            .iter()
                            .map(|item| self.descriptor(item))
                            .collect::<Result<_, _>>()?,
                    ),
                    ChildrenData::Thunk { placeholder } => {
                        let name = self.resolve(placeholder, FunctionKind::Children)?;
                        Children::Thunk(self.functions.children(name)?)
                    }
                };

                Descriptor::Element(Arc::new(ElementDescriptor {
                    tag: tag.clone(),
                    attributes: attrs,
                    children,
                }))
            }
        })
    }
}

//! Trellis Core
//!
//! A declarative UI rendering engine. Views are plain descriptors built
//! from primitives, thunks and elements; state is a reactive JSON tree;
//! each reactive part of a rendered view is kept current by its own effect.
//!
//! - Reactive state with per-property dependency tracking and change
//!   listeners
//! - Batched effect scheduling
//! - `${expr}` template interpolation
//! - A live renderer targeting an in-memory host tree
//! - A markup renderer for server output
//! - A bootstrap payload that lets a client take over server markup
//!
//! # Architecture
//!
//! - `reactive`: dependency tracking, effects and the scheduler
//! - `state`: the reactive state tree, listeners, dates and the state registry
//! - `template`: the template expression language and its cache
//! - `dom`: the host node tree the live renderer writes to
//! - `render`: descriptors and both renderers
//! - `hydrate`: the function registry and the bootstrap payload
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::render::{element, Renderer};
//! use trellis_core::state::Reactive;
//! use trellis_core::RenderConfig;
//! use serde_json::json;
//!
//! let state = Reactive::wrap(json!({ "count": 0 }))?;
//! let view = element("p").child("Count: ${count}").build();
//!
//! let renderer = Renderer::new(RenderConfig::interactive());
//! let node = renderer.render(&view, &state).await?;
//!
//! state.set("count", 1)?;
//! renderer.scheduler().settle().await;
//! assert_eq!(node.to_html(), "<p>Count: 1</p>");
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod hydrate;
pub mod reactive;
pub mod render;
pub mod state;
pub mod template;

pub use config::{BatchWindow, RenderConfig};
pub use error::{Error, Result};

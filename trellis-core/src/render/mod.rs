//! Rendering
//!
//! Descriptors in, presentation out. [`Renderer`] builds a live host tree
//! with one effect per reactive part; [`MarkupRenderer`] produces the
//! equivalent HTML string for server rendering.

mod client;
mod descriptor;
mod markup;

pub use client::Renderer;
pub use descriptor::{
    element, AttrValue, Children, ChildrenThunk, Descriptor, ElementBuilder, ElementDescriptor,
    Func, Handler, Thunk, ValueThunk,
};
pub use markup::MarkupRenderer;

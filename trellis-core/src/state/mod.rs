//! Reactive State
//!
//! Wraps JSON-shaped application data so that reads record dependencies and
//! writes notify listeners and re-run effects.
//!
//! - [`Reactive`]: handle to an object or array node
//! - [`Field`] / [`Input`]: what reads return and what writes accept
//! - [`ReactiveDate`]: date handle whose mutators notify the owner
//! - [`Change`] and [`Subscription`]: path listeners
//! - [`StateRegistry`]: named roots for hydration

mod date;
mod listeners;
mod node;
mod registry;
mod value;

pub use date::ReactiveDate;
pub use listeners::{Change, ListenerFn, ListenerId, Subscription, WILDCARD};
pub use node::{IntoReactive, NodeId, Reactive, LENGTH, MAX_ARRAY_GROWTH};
pub use registry::StateRegistry;
pub use value::{Field, Input};

pub(crate) use value::{display_json, json_eq};

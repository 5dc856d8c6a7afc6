//! Reactive Primitives
//!
//! This module implements dependency tracking and effect scheduling, the
//! machinery underneath the reactive state wrapper and the renderer.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dependency`] is the set of effects subscribed to one reactive
//! property. Reading the property inside a running effect subscribes the
//! effect; writing it triggers every subscriber.
//!
//! ## Effects
//!
//! An [`Effect`] is a re-runnable computation. Each run starts from an empty
//! dependency set and records whatever it reads, so subscriptions always
//! reflect the most recent run.
//!
//! ## Scheduler
//!
//! Triggered effects are not run inline. The [`Scheduler`] collects them
//! into a pending set and runs the set once per batching window, isolating
//! failures between effects of the same batch.
//!
//! # Implementation Notes
//!
//! The "currently running effect" lives in a task-local slot (see
//! [`ReactiveContext`]) so concurrent render contexts, such as a server
//! rendering several requests on one runtime, never corrupt each other's
//! tracking.

mod context;
mod dependency;
mod effect;
mod scheduler;

pub use context::ReactiveContext;
pub use dependency::{Dependency, DependencyId};
pub use effect::{Effect, EffectFuture, EffectId};
pub use scheduler::{FlushReport, Scheduler};

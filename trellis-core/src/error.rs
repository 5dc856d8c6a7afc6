//! Error Types
//!
//! Every fallible operation in the crate returns one of the enums below,
//! all of which convert into the crate-level [`Error`].
//!
//! [`TemplateError`] is the exception: a template that cannot be evaluated
//! degrades to its literal text, so it never reaches the crate-level error.

use thiserror::Error;

use crate::dom::DomId;
use crate::state::NodeId;

/// Errors raised by the reactive state wrapper.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// Only objects and arrays can become reactive nodes.
    #[error("only objects and arrays can be wrapped, got {0}")]
    NotAContainer(&'static str),

    /// A listener path was empty or malformed.
    #[error("invalid listener path `{0}`")]
    InvalidPath(String),

    /// An array was addressed with a property that is not an index.
    #[error("`{prop}` is not a valid index into array node {node}")]
    InvalidIndex { node: NodeId, prop: String },

    /// An array-only operation was applied to an object node.
    #[error("node {0} is not an array")]
    NotAnArray(NodeId),

    /// A `length` write carried something other than a non-negative integer.
    #[error("invalid array length {0}")]
    InvalidLength(String),

    /// The property addressed by a date handle no longer holds a date.
    #[error("property `{0}` does not hold a date")]
    NotADate(String),

    /// A date mutator produced a value outside the calendar.
    #[error("cannot set {component} to {value} on `{prop}`")]
    InvalidDate {
        prop: String,
        component: &'static str,
        value: i64,
    },
}

/// Why a template could not be compiled or evaluated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("unterminated `${{` at offset {0}")]
    Unterminated(usize),

    #[error("unexpected {found} at offset {offset}")]
    Syntax { offset: usize, found: String },

    #[error("`{0}` is not defined")]
    Missing(String),

    #[error("cannot apply `{op}` to {operand}")]
    Type { op: &'static str, operand: String },

    #[error("arithmetic produced a non-finite number")]
    NonFinite,
}

/// Errors raised by host tree operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The node to replace or remove is not attached to a parent.
    #[error("node {0} is not attached to a parent")]
    Detached(DomId),

    /// A node cannot become its own descendant.
    #[error("cannot insert node {child} into its own subtree at {parent}")]
    Cycle { parent: DomId, child: DomId },
}

/// Errors raised while generating or replaying a hydration bootstrap.
#[derive(Debug, Error)]
pub enum HydrationError {
    /// Functions must be registered by name to cross the server/client boundary.
    #[error("anonymous function in {0} cannot be serialized; register it by name")]
    AnonymousFunction(String),

    /// The bootstrap referenced a function the client registry does not know.
    #[error("function `{0}` is not registered")]
    UnknownFunction(String),

    /// A registered name resolved to a function of the wrong kind.
    #[error("function `{name}` is registered as a {found}, expected a {expected}")]
    FunctionKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A placeholder in the descriptor is missing from the function table.
    #[error("placeholder `{0}` is missing from the function table")]
    UnknownPlaceholder(String),

    /// The render call named a state root that was never registered.
    #[error("state `{0}` is not registered")]
    UnknownState(String),

    /// Host nodes are live objects and have no data form.
    #[error("host nodes cannot be embedded in a hydrated descriptor")]
    HostNode,

    /// The render target named by the bootstrap does not exist.
    #[error("node {0} has no previous sibling to replace")]
    MissingTarget(DomId),

    /// The payload could not be located inside the bootstrap markup.
    #[error("bootstrap payload not found")]
    MissingPayload,

    #[error("malformed bootstrap payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid render configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("frame interval must be at least 1 ms")]
    ZeroFrameInterval,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Hydration(#[from] HydrationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Crate-level result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

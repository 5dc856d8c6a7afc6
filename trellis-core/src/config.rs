//! Render Configuration
//!
//! A small serde-backed option bag shared by the scheduler, both renderers
//! and the hydration bridge. Every field has a default, so a configuration
//! document only needs to name what it changes:
//!
//! ```json
//! { "batch_window": { "kind": "frame", "interval_ms": 8 } }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default frame interval (roughly 60 Hz).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// When a requested flush actually runs.
///
/// The window is fixed per scheduler. Interactive rendering batches per UI
/// frame; server rendering has no frame clock and batches per async turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchWindow {
    /// Flush after yielding once to the async runtime.
    #[default]
    Microtask,

    /// Flush after the next frame tick.
    Frame { interval_ms: u64 },
}

impl BatchWindow {
    /// A frame window at the default interval.
    pub fn frame() -> Self {
        Self::Frame {
            interval_ms: DEFAULT_FRAME_INTERVAL_MS,
        }
    }

    /// Length of the window, `None` for microtask batching.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Microtask => None,
            Self::Frame { interval_ms } => Some(Duration::from_millis(*interval_ms)),
        }
    }
}

/// Options for rendering and scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Batching window for effect re-runs.
    pub batch_window: BatchWindow,

    /// Attribute keys starting with this prefix name event handlers.
    pub event_prefix: String,

    /// Attribute key that addresses the style of an element.
    pub style_key: String,

    /// `type` attribute of the emitted hydration script.
    pub bootstrap_script_type: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            batch_window: BatchWindow::Microtask,
            event_prefix: "on".to_string(),
            style_key: "style".to_string(),
            bootstrap_script_type: "application/trellis-bootstrap".to_string(),
        }
    }
}

impl RenderConfig {
    /// Preset for server rendering: microtask batching.
    pub fn server() -> Self {
        Self::default()
    }

    /// Preset for interactive rendering: per-frame batching.
    pub fn interactive() -> Self {
        Self {
            batch_window: BatchWindow::frame(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration document.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let BatchWindow::Frame { interval_ms: 0 } = self.batch_window {
            return Err(ConfigError::ZeroFrameInterval);
        }
        Ok(())
    }

    /// The event name an attribute key binds, if it is handler-shaped.
    ///
    /// `onclick` binds `click`; the bare prefix binds nothing.
    pub fn event_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.event_prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Whether an attribute key addresses the element style.
    pub fn is_style_key(&self, key: &str) -> bool {
        key == self.style_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RenderConfig::from_json_str(r#"{ "event_prefix": "on-" }"#).unwrap();
        assert_eq!(config.event_prefix, "on-");
        assert_eq!(config.style_key, "style");
        assert_eq!(config.batch_window, BatchWindow::Microtask);
    }

    #[test]
    fn frame_window_parses() {
        let config = RenderConfig::from_json_str(
            r#"{ "batch_window": { "kind": "frame", "interval_ms": 8 } }"#,
        )
        .unwrap();
        assert_eq!(config.batch_window.interval(), Some(Duration::from_millis(8)));
    }

    #[test]
    fn zero_frame_interval_is_rejected() {
        let err = RenderConfig::from_json_str(
            r#"{ "batch_window": { "kind": "frame", "interval_ms": 0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroFrameInterval));
    }

    #[test]
    fn event_names_strip_prefix() {
        let config = RenderConfig::default();
        assert_eq!(config.event_name("onclick"), Some("click"));
        assert_eq!(config.event_name("on"), None);
        assert_eq!(config.event_name("title"), None);
    }
}

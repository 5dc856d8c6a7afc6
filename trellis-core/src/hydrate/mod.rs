//! Server Rendering Handoff
//!
//! The server renders markup and appends a bootstrap script describing how
//! the markup was produced. The client reads the script, re-registers the
//! state roots, resolves functions by name and renders a live tree that
//! replaces the static markup.
//!
//! ```rust,ignore
//! // server
//! let html = MarkupRenderer::default().render_with_bootstrap(&view, "app", &states)?;
//!
//! // client
//! let live = hydrate_from_script(&script, &renderer, &functions, &states).await?;
//! ```

mod functions;
mod payload;

pub use functions::{FunctionKind, FunctionRegistry};
pub use payload::{AttrData, Bootstrap, ChildrenData, DescriptorData, FunctionRef, RenderCall, RenderTarget};

use tracing::{debug, instrument, warn};

use crate::config::RenderConfig;
use crate::dom::Node;
use crate::error::{HostError, HydrationError, Result};
use crate::render::{Descriptor, MarkupRenderer, Renderer};
use crate::state::StateRegistry;

/// Build the bootstrap `<script>` for `descriptor` rendered against the
/// root registered as `state_name`.
pub fn generate_bootstrap(
    descriptor: &Descriptor,
    state_name: &str,
    states: &StateRegistry,
    options: &RenderConfig,
) -> Result<String> {
    Ok(Bootstrap::capture(descriptor, state_name, states, options)?.to_script()?)
}

impl MarkupRenderer {
    /// Markup for `descriptor` followed directly by its bootstrap script.
    pub fn render_with_bootstrap(
        &self,
        descriptor: &Descriptor,
        state_name: &str,
        states: &StateRegistry,
    ) -> Result<String> {
        let state = states
            .get(state_name)
            .ok_or_else(|| HydrationError::UnknownState(state_name.to_string()))?;
        let mut html = self.render_to_string(descriptor, &state);
        html.push_str(&generate_bootstrap(descriptor, state_name, states, self.config())?);
        Ok(html)
    }
}

/// Replay a bootstrap payload and replace `target` with the live result.
///
/// States from the payload replace same-named roots in `states`. The live
/// tree batches through `renderer`'s scheduler with the payload's options.
/// A detached `target` is a lost update: the live tree is returned without
/// being attached anywhere.
#[instrument(skip_all, fields(payload_len = payload.len(), target_node = %target.id()))]
pub async fn hydrate(
    payload: &str,
    target: &Node,
    renderer: &Renderer,
    functions: &FunctionRegistry,
    states: &StateRegistry,
) -> Result<Node> {
    let bootstrap = Bootstrap::from_json(payload)?;
    let descriptor = bootstrap.descriptor(functions)?;

    for (name, value) in &bootstrap.states {
        states.register(name, value.clone())?;
    }
    let state = states
        .get(&bootstrap.render.state)
        .ok_or_else(|| HydrationError::UnknownState(bootstrap.render.state.clone()))?;

    let renderer = Renderer::with_scheduler(renderer.scheduler().clone(), bootstrap.options.clone());
    let live = renderer.render(&descriptor, &state).await?;
    match target.replace_with(&live) {
        Ok(()) => {}
        Err(HostError::Detached(id)) => {
            warn!(node = %id, "hydration target is detached; live tree left unattached");
        }
        Err(err) => return Err(err.into()),
    }
    debug!(states = bootstrap.states.len(), functions = bootstrap.functions.len(), "hydrated");
    Ok(live)
}

/// Hydrate from a script element whose text is the payload. The markup to
/// replace is the script's previous sibling.
pub async fn hydrate_from_script(
    script: &Node,
    renderer: &Renderer,
    functions: &FunctionRegistry,
    states: &StateRegistry,
) -> Result<Node> {
    let target = script
        .previous_sibling()
        .ok_or(HydrationError::MissingTarget(script.id()))?;
    hydrate(&script.text_content(), &target, renderer, functions, states).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Event;
    use crate::error::Error;
    use crate::render::element;
    use serde_json::json;

    fn counter(functions: &FunctionRegistry) -> Descriptor {
        element("button")
            .on(
                "onclick",
                functions.register_handler("increment", |_, state| {
                    let next = state.get("count").as_i64().unwrap_or(0) + 1;
                    state.set("count", next).unwrap();
                }),
            )
            .child("Count: ${count}")
            .build()
    }

    #[test]
    fn markup_is_followed_by_script() {
        let functions = FunctionRegistry::new();
        let states = StateRegistry::new();
        states.register("app", json!({ "count": 2 })).unwrap();

        let html = MarkupRenderer::default()
            .render_with_bootstrap(&counter(&functions), "app", &states)
            .unwrap();
        assert!(html.starts_with("<button>Count: 2</button><script type=\"application/trellis-bootstrap\">"));
        assert!(html.ends_with("</script>"));
    }

    #[tokio::test]
    async fn hydrated_tree_is_live() {
        let functions = FunctionRegistry::new();
        let server_states = StateRegistry::new();
        server_states.register("app", json!({ "count": 2 })).unwrap();
        let script = generate_bootstrap(&counter(&functions), "app", &server_states, &RenderConfig::server()).unwrap();
        let payload = Bootstrap::extract(&script, "application/trellis-bootstrap").unwrap();

        let page = Node::element("body");
        let placeholder = Node::element("button");
        placeholder.set_text("Count: 2");
        page.append_child(&placeholder).unwrap();
        let script_node = Node::element("script");
        script_node.set_text(payload.to_json().unwrap());
        page.append_child(&script_node).unwrap();

        let client_states = StateRegistry::new();
        let renderer = Renderer::new(RenderConfig::server());
        let live = hydrate_from_script(&script_node, &renderer, &functions, &client_states)
            .await
            .unwrap();

        assert!(page.children()[0].ptr_eq(&live));
        assert_eq!(live.to_html(), "<button>Count: 2</button>");

        live.dispatch(&Event::new("click"));
        renderer.scheduler().settle().await;
        assert_eq!(live.to_html(), "<button>Count: 3</button>");
        assert_eq!(client_states.get("app").unwrap().to_json(), json!({ "count": 3 }));
    }

    #[tokio::test]
    async fn detached_target_still_yields_a_live_tree() {
        let functions = FunctionRegistry::new();
        let states = StateRegistry::new();
        states.register("app", json!({ "count": 5 })).unwrap();
        let payload = Bootstrap::capture(&counter(&functions), "app", &states, &RenderConfig::server())
            .unwrap()
            .to_json()
            .unwrap();

        let renderer = Renderer::new(RenderConfig::server());
        let detached = Node::element("button");
        let live = hydrate(&payload, &detached, &renderer, &functions, &states)
            .await
            .unwrap();

        assert!(live.parent().is_none());
        assert_eq!(live.to_html(), "<button>Count: 5</button>");
        live.dispatch(&Event::new("click"));
        renderer.scheduler().settle().await;
        assert_eq!(live.to_html(), "<button>Count: 6</button>");
    }

    #[tokio::test]
    async fn missing_functions_and_targets_fail() {
        let server = FunctionRegistry::new();
        let states = StateRegistry::new();
        states.register("app", json!({ "count": 0 })).unwrap();
        let payload = Bootstrap::capture(&counter(&server), "app", &states, &RenderConfig::server())
            .unwrap()
            .to_json()
            .unwrap();

        let renderer = Renderer::new(RenderConfig::server());
        let target = Node::element("div");
        let result = hydrate(&payload, &target, &renderer, &FunctionRegistry::new(), &states).await;
        assert!(matches!(
            result,
            Err(Error::Hydration(HydrationError::UnknownFunction(name))) if name == "increment"
        ));

        let lonely = Node::element("script");
        let result = hydrate_from_script(&lonely, &renderer, &server, &states).await;
        assert!(matches!(result, Err(Error::Hydration(HydrationError::MissingTarget(id))) if id == lonely.id()));
    }
}

//! Integration Tests for the Rendering Engine
//!
//! These tests drive state, scheduling, templates and both renderers
//! together through the public API.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use trellis_core::dom::{Event, Node};
use trellis_core::hydrate::{hydrate, Bootstrap, FunctionRegistry};
use trellis_core::reactive::{Effect, Scheduler};
use trellis_core::dom::BindingKind;
use trellis_core::render::{
    element, ChildrenThunk, Descriptor, Handler, MarkupRenderer, Renderer, ValueThunk,
};
use trellis_core::state::{Reactive, StateRegistry};
use trellis_core::RenderConfig;

fn todo_view() -> Descriptor {
    element("ul")
        .attr("class", "todos")
        .children_fn(ChildrenThunk::new(|state| {
            state
                .get("items")
                .into_node()
                .map(|items| {
                    items
                        .items()
                        .into_iter()
                        .map(|item| element("li").child(item.to_string()).build())
                        .collect()
                })
                .unwrap_or_default()
        }))
        .build()
}

/// Clicking a bound button updates the text that reads the same state.
#[tokio::test]
async fn counter_updates_after_click() {
    let state = Reactive::wrap(json!({ "count": 0 })).unwrap();
    let view = element("button")
        .on(
            "onclick",
            Handler::new(|_, state| {
                let next = state.get("count").as_i64().unwrap_or(0) + 1;
                state.set("count", next).unwrap();
            }),
        )
        .child("Clicked ${count} times")
        .build();

    let renderer = Renderer::new(RenderConfig::interactive());
    let button = renderer.render(&view, &state).await.unwrap();
    assert_eq!(button.to_html(), "<button>Clicked 0 times</button>");

    button.dispatch(&Event::new("click"));
    button.dispatch(&Event::new("click"));
    renderer.scheduler().settle().await;

    assert_eq!(button.to_html(), "<button>Clicked 2 times</button>");
}

/// A style thunk re-runs alone when the state it reads changes.
#[tokio::test]
async fn style_thunk_updates_only_the_style() {
    let state = Reactive::wrap(json!({ "active": false, "label": "Save" })).unwrap();
    let view = element("button")
        .attr("class", "btn")
        .attr_fn(
            "style",
            ValueThunk::new(|state| {
                let color = if state.get("active").is_truthy() { "red" } else { "blue" };
                json!({ "color": color })
            }),
        )
        .attr("title", "${label}")
        .child("${label}")
        .build();

    let renderer = Renderer::new(RenderConfig::interactive());
    let button = renderer.render(&view, &state).await.unwrap();
    assert_eq!(button.style_property("color").as_deref(), Some("blue"));

    let bindings = button.bindings();
    assert_eq!(bindings[1].kind, BindingKind::Attribute("style".into()));
    let (class, style, title) = (&bindings[0].effect, &bindings[1].effect, &bindings[2].effect);

    state.set("active", true).unwrap();
    renderer.scheduler().settle().await;

    assert_eq!(button.style_property("color").as_deref(), Some("red"));
    assert_eq!(style.run_count(), 2);
    assert_eq!(class.run_count(), 1);
    assert_eq!(title.run_count(), 1);
    assert_eq!(button.attribute("class").as_deref(), Some("btn"));
    assert_eq!(button.attribute("title").as_deref(), Some("Save"));
}

/// Structural changes to an array rebuild the list that iterates it.
#[tokio::test]
async fn todo_list_follows_pushes_and_pops() {
    let state = Reactive::wrap(json!({ "items": ["milk"] })).unwrap();
    let renderer = Renderer::new(RenderConfig::interactive());
    let list = renderer.render(&todo_view(), &state).await.unwrap();
    assert_eq!(list.to_html(), r#"<ul class="todos"><li>milk</li></ul>"#);

    let items = state.get("items").into_node().unwrap();
    items.push("eggs").unwrap();
    items.push("bread").unwrap();
    renderer.scheduler().settle().await;
    assert_eq!(list.child_count(), 3);

    items.pop().unwrap();
    renderer.scheduler().settle().await;
    assert_eq!(
        list.to_html(),
        r#"<ul class="todos"><li>milk</li><li>eggs</li></ul>"#
    );
}

/// A thunk returning different elements swaps the subtree in place.
#[tokio::test]
async fn conditional_subtree_is_replaced_in_place() {
    let state = Reactive::wrap(json!({ "user": null })).unwrap();
    let view = element("header")
        .child(element("h1").child("Home"))
        .child(Descriptor::thunk(|state| {
            if state.get("user").is_truthy() {
                element("span").child("Hi ${user}").build()
            } else {
                element("a").attr("href", "/login").child("Log in").build()
            }
        }))
        .build();

    let renderer = Renderer::new(RenderConfig::interactive());
    let header = renderer.render(&view, &state).await.unwrap();
    assert_eq!(
        header.to_html(),
        r#"<header><h1>Home</h1><a href="/login">Log in</a></header>"#
    );

    state.set("user", "Ada").unwrap();
    renderer.scheduler().settle().await;
    assert_eq!(header.to_html(), "<header><h1>Home</h1><span>Hi Ada</span></header>");

    state.set("user", json!(null)).unwrap();
    renderer.scheduler().settle().await;
    assert_eq!(
        header.to_html(),
        r#"<header><h1>Home</h1><a href="/login">Log in</a></header>"#
    );
}

/// Writes in one window produce a single re-run of each affected effect.
#[tokio::test]
async fn writes_in_one_window_are_batched() {
    let scheduler = Scheduler::default();
    let state = Reactive::wrap(json!({ "a": 1, "b": 2 })).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let reader = state.clone();
    let log = seen.clone();
    let effect = Effect::new_sync(&scheduler, move || {
        let a = reader.get("a").as_i64().unwrap_or_default();
        let b = reader.get("b").as_i64().unwrap_or_default();
        log.lock().push(a + b);
        Ok(())
    });
    effect.run().await.unwrap();

    state.set("a", 10).unwrap();
    state.set("b", 20).unwrap();
    state.set("a", 100).unwrap();
    scheduler.settle().await;

    assert_eq!(effect.run_count(), 2);
    assert_eq!(*seen.lock(), vec![3, 120]);
}

/// Branches not taken on the latest run stop triggering the effect.
#[tokio::test]
async fn stale_dependencies_are_pruned() {
    let scheduler = Scheduler::default();
    let state = Reactive::wrap(json!({ "flag": true, "a": "x", "b": "y" })).unwrap();

    let reader = state.clone();
    let effect = Effect::new_sync(&scheduler, move || {
        let key = if reader.get("flag").is_truthy() { "a" } else { "b" };
        let _ = reader.get(key);
        Ok(())
    });
    effect.run().await.unwrap();
    assert_eq!(effect.dependency_count(), 2);

    state.set("flag", false).unwrap();
    scheduler.settle().await;
    assert_eq!(effect.run_count(), 2);

    state.set("a", "changed").unwrap();
    scheduler.settle().await;
    assert_eq!(effect.run_count(), 2);

    state.set("b", "changed").unwrap();
    scheduler.settle().await;
    assert_eq!(effect.run_count(), 3);
}

/// Writing an equal value neither notifies listeners nor re-runs effects.
#[tokio::test]
async fn equal_writes_are_suppressed() {
    let renderer = Renderer::new(RenderConfig::server());
    let state = Reactive::wrap(json!({ "name": "Ada", "tags": ["a"] })).unwrap();
    let changes = Arc::new(Mutex::new(0));
    let counter = changes.clone();
    state
        .add_listener("*", move |_| *counter.lock() += 1)
        .unwrap();

    let node = renderer
        .render(&element("p").child("${name}").build(), &state)
        .await
        .unwrap();
    let text = node.children()[0].clone();
    let effect = text.bindings()[0].effect.clone();

    assert!(!state.set("name", "Ada").unwrap());
    renderer.scheduler().settle().await;
    assert_eq!(effect.run_count(), 1);
    assert_eq!(*changes.lock(), 0);

    assert!(state.set("name", "Grace").unwrap());
    renderer.scheduler().settle().await;
    assert_eq!(effect.run_count(), 2);
    assert_eq!(*changes.lock(), 1);
}

/// Listeners see the full dotted path of nested writes, nearest first.
#[test]
fn nested_writes_reach_ancestor_listeners() {
    let state = Reactive::wrap(json!({ "settings": { "theme": { "dark": false } } })).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    for path in ["settings", "settings.theme.dark", "*"] {
        let log = log.clone();
        state
            .add_listener(path, move |change| {
                log.lock().push((path, change.path.clone(), change.new_value.clone()))
            })
            .unwrap();
    }

    let theme = state.get_path("settings.theme").into_node().unwrap();
    assert_eq!(theme.path(), "settings.theme");
    theme.set("dark", true).unwrap();

    let expected = Some(json!(true));
    assert_eq!(
        *log.lock(),
        vec![
            ("settings.theme.dark", "settings.theme.dark".to_string(), expected.clone()),
            ("settings", "settings.theme.dark".to_string(), expected.clone()),
            ("*", "settings.theme.dark".to_string(), expected),
        ]
    );
}

/// Broken or unresolvable templates render as their literal text.
#[tokio::test]
async fn templates_fall_back_to_literal_text() {
    let state = Reactive::wrap(json!({ "user": { "name": "Ada" } })).unwrap();
    let view = element("div")
        .child(element("p").child("${user.name}"))
        .child(element("p").child("${user.email}"))
        .child(element("p").child("${user.}"))
        .build();

    let markup = MarkupRenderer::default().render_to_string(&view, &state);
    assert_eq!(
        markup,
        "<div><p>Ada</p><p>${user.email}</p><p>${user.}</p></div>"
    );

    let live = Renderer::new(RenderConfig::server())
        .render(&view, &state)
        .await
        .unwrap();
    assert_eq!(live.to_html(), markup);
}

/// Server markup and bootstrap hand over to a live client tree.
#[tokio::test]
async fn server_render_hydrates_on_the_client() {
    let functions = FunctionRegistry::new();
    let view = element("section")
        .child(element("h2").child("${title}"))
        .child(element("ul").children_fn(functions.register_children("todo_items", |state| {
            state
                .get("items")
                .into_node()
                .map(|items| {
                    items
                        .items()
                        .into_iter()
                        .map(|item| element("li").child(item.to_string()).build())
                        .collect()
                })
                .unwrap_or_default()
        })))
        .build();

    let server_states = StateRegistry::new();
    server_states
        .register("todos", json!({ "title": "Today", "items": ["a", "b"] }))
        .unwrap();
    let html = MarkupRenderer::default()
        .render_with_bootstrap(&view, "todos", &server_states)
        .unwrap();
    assert!(html.starts_with("<section><h2>Today</h2><ul><li>a</li><li>b</li></ul></section><script"));

    let payload = Bootstrap::extract(&html, "application/trellis-bootstrap").unwrap();
    assert_eq!(payload.functions.len(), 1);

    // The client page: the static markup stands in for the server output.
    let body = Node::element("body");
    let stale = Node::element("section");
    body.append_child(&stale).unwrap();

    let client_states = StateRegistry::new();
    let renderer = Renderer::new(RenderConfig::interactive());
    let live = hydrate(
        &payload.to_json().unwrap(),
        &stale,
        &renderer,
        &functions,
        &client_states,
    )
    .await
    .unwrap();

    assert!(body.children()[0].ptr_eq(&live));
    assert_eq!(
        live.to_html(),
        "<section><h2>Today</h2><ul><li>a</li><li>b</li></ul></section>"
    );

    let items = client_states.get("todos").unwrap().get("items").into_node().unwrap();
    items.push("c").unwrap();
    renderer.scheduler().settle().await;
    assert_eq!(
        live.to_html(),
        "<section><h2>Today</h2><ul><li>a</li><li>b</li><li>c</li></ul></section>"
    );
}

/// Dropping a rendered tree stops its effects from running again.
#[tokio::test]
async fn dropped_trees_stop_updating() {
    let state = Reactive::wrap(json!({ "n": 0 })).unwrap();
    let renderer = Renderer::new(RenderConfig::server());
    let node = renderer
        .render(&element("b").child("${n}").build(), &state)
        .await
        .unwrap();
    let effect = Arc::downgrade(&node.children()[0].bindings()[0].effect);
    assert!(effect.upgrade().is_some());
    drop(node);
    assert!(effect.upgrade().is_none());

    state.set("n", 1).unwrap();
    renderer.scheduler().settle().await;
    assert!(renderer.scheduler().is_idle());
}

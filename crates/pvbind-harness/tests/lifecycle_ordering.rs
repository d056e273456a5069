#![forbid(unsafe_code)]

//! Integration tests: start/stop ordering across the widget tree.

use std::sync::Arc;

use proptest::prelude::*;
use pvbind_core::{Widget, kinds};
use pvbind_harness::{Fixture, probe, probe_group, text_update};
use pvbind_runtime::{RuntimeError, RuntimeState};

// ============================================================================
// Fixed Trees
// ============================================================================

#[test]
fn start_is_top_down_and_stop_is_bottom_up() {
    let fx = Fixture::new();
    let model = probe_group(
        "parent",
        vec![probe("child1"), probe_group("child2", vec![probe("grandchild")])],
    );
    let display = fx.display(model);

    display.start();
    assert_eq!(
        fx.journal.take(),
        vec!["parent-setup", "child1-setup", "child2-setup", "grandchild-setup"]
    );

    display.stop();
    assert_eq!(
        fx.journal.take(),
        vec![
            "grandchild-teardown",
            "child2-teardown",
            "child1-teardown",
            "parent-teardown"
        ]
    );
}

#[test]
fn tabs_start_every_page() {
    let fx = Fixture::new();
    let tabs = Widget::builder(kinds::TABS)
        .name("tabs")
        .tab("first", vec![probe("a")])
        .tab("second", vec![probe("b"), probe("c")])
        .build();
    let display = fx.display(probe_group("root", vec![tabs]));

    display.start();
    assert_eq!(fx.journal.take(), vec!["root-setup", "a-setup", "b-setup", "c-setup"]);
    display.stop();
    assert_eq!(
        fx.journal.take(),
        vec!["c-teardown", "b-teardown", "a-teardown", "root-teardown"]
    );
}

#[test]
fn children_added_while_running_are_started_and_stopped() {
    let fx = Fixture::new();
    let model = probe_group("root", vec![probe("first")]);
    let display = fx.display(model.clone());
    display.start();
    fx.journal.clear();

    let children = model.children().expect("container");
    let late = probe("late");
    children.insert(0, late.clone());
    assert_eq!(fx.journal.take(), vec!["late-setup"]);
    assert!(display.runtime_of(late.id()).is_some());

    display.stop();
    assert_eq!(
        fx.journal.take(),
        vec!["first-teardown", "late-teardown", "root-teardown"]
    );
}

#[test]
fn runtimes_reject_repeated_transitions() {
    let fx = Fixture::new();
    let widget = probe("solo");
    let runtime = fx.context.registry().create(&fx.context, widget.clone());
    runtime.initialize().expect("initialize");
    runtime.start().expect("start");
    assert!(matches!(
        runtime.start(),
        Err(RuntimeError::InvalidTransition { widget: id, state: "started", operation: "start" })
            if id == widget.id()
    ));
    runtime.stop().expect("stop");
    assert!(runtime.stop().is_err());
    assert_eq!(runtime.state(), RuntimeState::Stopped);
    assert_eq!(fx.journal.events(), vec!["solo-setup", "solo-teardown"]);
}

#[test]
fn connection_signals_follow_pvs() {
    let fx = Fixture::new();
    let readback = text_update("readback", "loc://temp(20)");
    let display = fx.display(probe_group("root", vec![readback.clone()]));
    display.start();

    let connected = readback
        .property(pvbind_core::keys::CONNECTED)
        .expect("connected");
    assert!(connected.get());
    let temp = fx.context.pool().local().get("loc://temp").expect("temp");
    temp.drop_connection();
    assert!(!connected.get());
    let view = display.runtime_of(readback.id()).expect("runtime").view();
    assert_eq!(view.disconnected_pvs, vec!["loc://temp".to_owned()]);
    temp.post(pvbind_core::PvValue::Double(21.0));
    assert!(connected.get());

    display.stop();
    assert!(fx.context.pool().is_empty());
}

// ============================================================================
// Random Trees
// ============================================================================

#[derive(Debug, Clone)]
enum Shape {
    Leaf,
    Group(Vec<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    Just(Shape::Leaf).prop_recursive(4, 24, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Shape::Group)
    })
}

fn build(shape: &Shape, next: &mut usize) -> Arc<Widget> {
    let name = format!("w{next}");
    *next += 1;
    match shape {
        Shape::Leaf => probe(&name),
        Shape::Group(children) => {
            let built = children.iter().map(|child| build(child, next)).collect();
            probe_group(&name, built)
        }
    }
}

proptest! {
    #[test]
    fn stop_order_mirrors_start_order(shape in shape()) {
        let fx = Fixture::new();
        let mut next = 0;
        let model = build(&shape, &mut next);
        let display = fx.display(model);

        display.start();
        let setups: Vec<String> = fx
            .journal
            .take()
            .into_iter()
            .map(|e| e.trim_end_matches("-setup").to_owned())
            .collect();
        display.stop();
        let mut teardowns: Vec<String> = fx
            .journal
            .take()
            .into_iter()
            .map(|e| e.trim_end_matches("-teardown").to_owned())
            .collect();
        teardowns.reverse();

        prop_assert_eq!(setups.len(), next);
        prop_assert_eq!(setups, teardowns);
        prop_assert_eq!(fx.context.live_count(), 0);
    }
}

#![forbid(unsafe_code)]

//! Integration tests: swapping embedded displays and whole models.

use std::sync::Arc;

use pvbind_core::keys::{EMBEDDED_MODEL, OPEN_FULL_VIEW};
use pvbind_core::{ModelRef, Widget, kinds};
use pvbind_harness::{Fixture, probe, probe_group};

fn embedded(model: Option<Arc<Widget>>) -> Arc<Widget> {
    Widget::builder(kinds::EMBEDDED)
        .name("frame")
        .with(EMBEDDED_MODEL, model.map(ModelRef))
        .with(OPEN_FULL_VIEW, 0)
        .build()
}

#[test]
fn old_display_is_torn_down_before_new_one_starts() {
    let fx = Fixture::new();
    let frame = embedded(Some(probe_group("old", vec![probe("old-child")])));
    let display = fx.display(probe_group("root", vec![frame.clone()]));
    display.start();
    assert_eq!(fx.journal.take(), vec!["root-setup", "old-setup", "old-child-setup"]);

    frame
        .property(EMBEDDED_MODEL)
        .expect("model")
        .set(Some(ModelRef(probe_group("new", vec![probe("new-child")]))));
    assert_eq!(
        fx.journal.take(),
        vec!["old-child-teardown", "old-teardown", "new-setup", "new-child-setup"]
    );

    display.stop();
    assert_eq!(
        fx.journal.take(),
        vec!["new-child-teardown", "new-teardown", "root-teardown"]
    );
}

#[test]
fn clearing_the_model_stops_the_embedded_display() {
    let fx = Fixture::new();
    let frame = embedded(Some(probe("inner")));
    let display = fx.display(frame.clone());
    display.start();

    frame.property(EMBEDDED_MODEL).expect("model").set(None);
    assert_eq!(fx.journal.take(), vec!["inner-setup", "inner-teardown"]);

    display.stop();
    assert!(fx.journal.events().is_empty());
}

#[test]
fn empty_frame_starts_later_model() {
    let fx = Fixture::new();
    let frame = embedded(None);
    let display = fx.display(frame.clone());
    display.start();
    assert!(fx.journal.events().is_empty());

    frame
        .property(EMBEDDED_MODEL)
        .expect("model")
        .set(Some(ModelRef(probe("late"))));
    assert_eq!(fx.journal.take(), vec!["late-setup"]);
    display.stop();
    assert_eq!(fx.journal.take(), vec!["late-teardown"]);
}

#[test]
fn open_full_view_action_pulses_trigger() {
    let fx = Fixture::new();
    let frame = embedded(None);
    let display = fx.display(frame.clone());
    display.start();

    let runtime = display.root_runtime().expect("root");
    let action = runtime
        .runtime_actions()
        .into_iter()
        .find(|a| a.label() == "Open Full View")
        .expect("action");
    action.invoke();
    action.invoke();
    assert_eq!(frame.property(OPEN_FULL_VIEW).expect("trigger").get(), 2);
}

#[test]
fn replacing_the_model_stops_the_old_tree_first() {
    let fx = Fixture::new();
    let display = fx.display(probe_group("first", vec![probe("a")]));
    display.start();
    display.replace_model(probe_group("second", vec![probe("b")]));
    assert_eq!(
        fx.journal.take(),
        vec![
            "first-setup",
            "a-setup",
            "a-teardown",
            "first-teardown",
            "second-setup",
            "b-setup"
        ]
    );
    display.stop();
}

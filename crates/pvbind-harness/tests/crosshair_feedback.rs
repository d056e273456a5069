#![forbid(unsafe_code)]

//! Integration tests: crosshair writes and their delayed echoes.

use std::sync::Arc;
use std::time::Duration;

use pvbind_core::keys::{CROSSHAIR, CURSOR_X_PV, CURSOR_Y_PV};
use pvbind_core::{Property, PvPool, PvValue, Widget, kinds};
use pvbind_harness::{Fixture, LatentConnector, LatentPv};
use pvbind_runtime::DisplayRuntime;

struct Scene {
    fx: Fixture,
    display: DisplayRuntime,
    crosshair: Property<Option<[f64; 2]>>,
    x: Arc<LatentPv>,
    y: Arc<LatentPv>,
}

/// Image widget on latent PVs, crosshair settled at (1, 2).
fn scene() -> Scene {
    let connector = LatentConnector::new();
    let x = connector.pv("sim:cursor:x");
    let y = connector.pv("sim:cursor:y");
    let fx = Fixture::with_pool(Arc::new(PvPool::new(connector)));

    let image = Widget::builder(kinds::IMAGE)
        .name("camera")
        .with(CURSOR_X_PV, "sim:cursor:x".to_owned())
        .with(CURSOR_Y_PV, "sim:cursor:y".to_owned())
        .with(CROSSHAIR, None)
        .build();
    let crosshair = image.property(CROSSHAIR).expect("crosshair");
    let display = fx.display(image);
    display.start();

    x.deliver(PvValue::Double(1.0));
    y.deliver(PvValue::Double(2.0));
    assert_eq!(crosshair.get(), Some([1.0, 2.0]));

    Scene {
        fx,
        display,
        crosshair,
        x,
        y,
    }
}

#[test]
fn stale_values_inside_the_window_are_ignored() {
    let s = scene();

    s.crosshair.set(Some([5.0, 2.0]));
    assert_eq!(s.x.pending(), vec![PvValue::Double(5.0)]);
    assert!(s.y.pending().is_empty(), "unchanged axis is not written");

    s.fx.clock.advance(Duration::from_millis(100));
    s.x.deliver(PvValue::Double(7.0));
    assert_eq!(s.crosshair.get(), Some([5.0, 2.0]));

    s.fx.clock.advance(Duration::from_millis(50));
    assert!(s.x.flush_one(), "echo of our write");
    assert_eq!(s.crosshair.get(), Some([5.0, 2.0]));
    assert!(s.x.pending().is_empty());

    // The echo closed the window early.
    s.fx.clock.advance(Duration::from_millis(50));
    s.x.deliver(PvValue::Double(8.0));
    assert_eq!(s.crosshair.get(), Some([8.0, 2.0]));

    s.display.stop();
    assert_eq!(s.x.listener_count(), 0);
}

#[test]
fn window_expires_without_an_echo() {
    let s = scene();

    s.crosshair.set(Some([5.0, 2.0]));
    s.fx.clock.advance(Duration::from_millis(1_100));
    s.x.deliver(PvValue::Double(7.0));
    assert_eq!(s.crosshair.get(), Some([7.0, 2.0]));
}

#[test]
fn updates_from_the_other_axis_are_not_suppressed() {
    let s = scene();

    s.crosshair.set(Some([5.0, 2.0]));
    s.fx.clock.advance(Duration::from_millis(10));
    s.y.deliver(PvValue::Double(3.0));
    assert_eq!(s.crosshair.get(), Some([1.0, 3.0]));
}

#[test]
fn refused_write_leaves_no_window() {
    let s = scene();
    s.x.set_readonly(true);

    s.crosshair.set(Some([5.0, 2.0]));
    assert!(s.x.pending().is_empty());
    s.fx.clock.advance(Duration::from_millis(10));
    s.x.deliver(PvValue::Double(6.0));
    assert_eq!(s.crosshair.get(), Some([6.0, 2.0]));
}

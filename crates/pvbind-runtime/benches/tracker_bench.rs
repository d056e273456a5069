//! Benchmarks for the connection tracker.
//!
//! Run with: `cargo bench --package pvbind-runtime --bench tracker_bench`
//!
//! # Performance Baselines
//!
//! - add/remove of N distinct PVs (first-add registers a listener)
//! - repeated add/remove of one shared PV (reference count only)
//! - notification fan-in: value updates across N tracked PVs

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pvbind_core::{LocalPv, Property, PvHandle, PvValue};
use pvbind_runtime::ConnectionTracker;

// ============================================================================
// Fixtures
// ============================================================================

fn local_pvs(count: usize) -> Vec<(Arc<LocalPv>, PvHandle)> {
    (0..count)
        .map(|i| {
            let pv = LocalPv::new(format!("loc://bench{i}"), PvValue::Double(0.0));
            let handle = PvHandle::new(pv.clone());
            (pv, handle)
        })
        .collect()
}

fn tracker() -> ConnectionTracker {
    ConnectionTracker::new(
        "bench",
        Some(Property::new("connected", false)),
        Some(Property::new("pv_writable", false)),
    )
}

// ============================================================================
// Add / Remove
// ============================================================================

fn bench_add_remove_distinct(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker/add_remove_distinct");
    for count in [10_usize, 100, 1_000] {
        let pvs = local_pvs(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &pvs, |b, pvs| {
            b.iter(|| {
                let tracker = tracker();
                for (_, handle) in pvs {
                    tracker.add_pv(handle, false);
                }
                for (_, handle) in pvs {
                    let _ = tracker.remove_pv(handle);
                }
                black_box(tracker.len())
            });
        });
    }
    group.finish();
}

fn bench_add_remove_shared(c: &mut Criterion) {
    let pvs = local_pvs(1);
    let handle = pvs[0].1.clone();
    let tracker = tracker();
    tracker.add_pv(&handle, true);
    c.bench_function("tracker/add_remove_shared", |b| {
        b.iter(|| {
            tracker.add_pv(black_box(&handle), true);
            let _ = tracker.remove_pv(black_box(&handle));
        });
    });
}

// ============================================================================
// Notification Fan-In
// ============================================================================

fn bench_value_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker/value_fan_in");
    for count in [10_usize, 100, 1_000] {
        let pvs = local_pvs(count);
        let tracker = tracker();
        for (_, handle) in &pvs {
            tracker.add_pv(handle, false);
        }
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &pvs, |b, pvs| {
            let mut value = 0.0;
            b.iter(|| {
                value += 1.0;
                for (pv, _) in pvs {
                    pv.post(PvValue::Double(value));
                }
                black_box(tracker.is_connected())
            });
        });
    }
    group.finish();
}

fn bench_disconnect_reconnect(c: &mut Criterion) {
    let pvs = local_pvs(100);
    let tracker = tracker();
    for (_, handle) in &pvs {
        tracker.add_pv(handle, false);
    }
    let (flapping, _) = &pvs[50];
    c.bench_function("tracker/disconnect_reconnect_100", |b| {
        b.iter(|| {
            flapping.drop_connection();
            flapping.post(PvValue::Double(1.0));
            black_box(tracker.is_connected())
        });
    });
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_add_remove_distinct,
    bench_add_remove_shared,
    bench_value_fan_in,
    bench_disconnect_reconnect,
);

criterion_main!(benches);

//! Crosshair binding with feedback-loop suppression.
//!
//! A crosshair position is both shown from and written to two PVs (X and
//! Y). When the widget writes a new position, the PVs echo it back after a
//! network round trip, possibly interleaved with older values still in
//! flight. Re-applying those stale values would make the crosshair jump
//! back and forth.
//!
//! After each successful write of an axis, incoming updates for that axis
//! are ignored until the [`IgnoreWindow`] expires, except that an update
//! equal to the crosshair's current coordinate closes the window early.
//!
//! ```text
//!  T        write X=5, window open until T+1000
//!  T+100    X=7 arrives  -> ignored
//!  T+150    X=5 arrives  -> matches, window closed
//!  T+1100   X=8 arrives  -> applied
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pvbind_core::{ListenerId, Property, PvHandle, PvListener, PvValue, Subscription};

use super::{ApplyingThreads, BindingContext};
use super::link::PvLink;

/// Soft deadline during which updates are ignored.
#[derive(Debug, Default)]
pub struct IgnoreWindow {
    deadline_ms: AtomicU64,
}

impl IgnoreWindow {
    /// Open the window until `now_ms + window`.
    pub fn arm(&self, now_ms: u64, window: Duration) {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.deadline_ms
            .store(now_ms.saturating_add(window_ms), Ordering::Release);
    }

    /// Close the window.
    pub fn clear(&self) {
        self.deadline_ms.store(0, Ordering::Release);
    }

    /// Whether the window is open at `now_ms`.
    #[must_use]
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.deadline_ms.load(Ordering::Acquire)
    }

    /// Deadline in clock milliseconds, zero when closed.
    #[must_use]
    pub fn deadline_ms(&self) -> u64 {
        self.deadline_ms.load(Ordering::Acquire)
    }
}

const AXES: [&str; 2] = ["x", "y"];

struct CrosshairShared {
    cx: BindingContext,
    crosshair: Property<Option<[f64; 2]>>,
    pvs: [Option<PvHandle>; 2],
    windows: [IgnoreWindow; 2],
    applying: ApplyingThreads,
}

impl CrosshairShared {
    fn read_axis(&self, axis: usize) -> Option<f64> {
        self.pvs[axis]
            .as_ref()
            .and_then(|pv| pv.read().as_f64())
            .filter(|v| !v.is_nan())
    }

    /// Property to PVs.
    fn write(&self, position: Option<[f64; 2]>) {
        if self.applying.is_current() {
            return;
        }
        let Some(position) = position else {
            return;
        };
        for (axis, pv) in self.pvs.iter().enumerate() {
            let Some(pv) = pv else {
                continue;
            };
            let wanted = position[axis];
            let current = pv.read().as_f64();
            if current.is_some_and(|c| c.to_bits() == wanted.to_bits()) {
                continue;
            }
            match pv.write(PvValue::Double(wanted)) {
                Ok(()) => {
                    let now = self.cx.clock.now_ms();
                    self.windows[axis].arm(now, self.cx.ignore_window());
                    tracing::trace!(owner = %self.cx.label, axis = AXES[axis], value = wanted, "crosshair written");
                }
                Err(err) => {
                    self.windows[axis].clear();
                    tracing::warn!(owner = %self.cx.label, pv = %pv, %err, "crosshair write failed");
                }
            }
        }
    }

    /// PV to property, for an update of `axis`.
    fn update(&self, axis: usize, value: &PvValue) {
        let (Some(x), Some(y)) = (self.read_axis(0), self.read_axis(1)) else {
            return;
        };
        let Some(incoming) = value.as_f64() else {
            return;
        };
        let current = self.crosshair.get();
        if current.is_some_and(|c| c[axis].to_bits() == incoming.to_bits()) {
            self.windows[axis].clear();
            return;
        }
        let now = self.cx.clock.now_ms();
        if self.windows[axis].is_active(now) {
            tracing::trace!(owner = %self.cx.label, axis = AXES[axis], value = incoming, "ignored echo inside window");
            return;
        }
        let _guard = self.applying.enter();
        self.crosshair.set(Some([x, y]));
    }
}

struct AxisListener {
    shared: std::sync::Weak<CrosshairShared>,
    axis: usize,
}

impl PvListener for AxisListener {
    fn value_changed(&self, value: &PvValue) {
        if value.is_disconnected() {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.update(self.axis, value);
        }
    }
}

/// Binds a crosshair position to independent X and Y PVs.
///
/// The PV names are read once at construction.
pub struct CrosshairBinding {
    shared: Arc<CrosshairShared>,
    links: Mutex<Vec<PvLink>>,
    listeners: Mutex<Vec<(PvHandle, ListenerId)>>,
    subscription: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl CrosshairBinding {
    /// Bind `crosshair` to the PVs named `x_name` and `y_name`.
    ///
    /// Empty names leave that axis unbound. Acquisition failures are logged.
    #[must_use]
    pub fn new(
        cx: BindingContext,
        x_name: &str,
        y_name: &str,
        crosshair: Property<Option<[f64; 2]>>,
    ) -> Self {
        let mut pvs: [Option<PvHandle>; 2] = [None, None];
        let mut links = Vec::with_capacity(2);
        for (axis, name) in [x_name, y_name].into_iter().enumerate() {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match PvLink::open(&cx, name, true, None) {
                Ok(link) => {
                    pvs[axis] = Some(link.handle().clone());
                    links.push(link);
                }
                Err(err) => {
                    tracing::warn!(owner = %cx.label, pv = name, %err, "cannot bind crosshair PV");
                }
            }
        }

        let shared = Arc::new(CrosshairShared {
            cx,
            crosshair: crosshair.clone(),
            pvs,
            windows: [IgnoreWindow::default(), IgnoreWindow::default()],
            applying: ApplyingThreads::default(),
        });

        let weak = Arc::downgrade(&shared);
        let subscription = crosshair.subscribe(move |position| {
            if let Some(shared) = weak.upgrade() {
                shared.write(*position);
            }
        });

        let mut listener_ids = Vec::with_capacity(2);
        for (axis, pv) in shared.pvs.iter().enumerate() {
            if let Some(pv) = pv {
                let listener = Arc::new(AxisListener {
                    shared: Arc::downgrade(&shared),
                    axis,
                });
                listener_ids.push((pv.clone(), pv.add_listener(listener)));
            }
        }

        Self {
            shared,
            links: Mutex::new(links),
            listeners: Mutex::new(listener_ids),
            subscription: Mutex::new(Some(subscription)),
            disposed: AtomicBool::new(false),
        }
    }

    /// Ignore window of an axis (0 = X, 1 = Y).
    #[must_use]
    pub fn window(&self, axis: usize) -> Option<&IgnoreWindow> {
        self.shared.windows.get(axis)
    }

    /// Bound PVs, X then Y.
    #[must_use]
    pub fn pvs(&self) -> [Option<PvHandle>; 2] {
        self.shared.pvs.clone()
    }

    /// Release both PVs. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscription.lock().take();
        for (pv, id) in self.listeners.lock().drain(..) {
            pv.remove_listener(id);
        }
        for link in self.links.lock().drain(..) {
            link.close(&self.shared.cx);
        }
    }
}

impl Drop for CrosshairBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

#![forbid(unsafe_code)]

//! Per-runtime PV connection tracking.
//!
//! A [`ConnectionTracker`] reference-counts every PV a widget runtime uses
//! and derives two widget-facing signals from them:
//!
//! - **connected**: `true` iff every tracked PV is connected.
//! - **writable**: `true` iff no tracked PV needs write access, or at least
//!   one PV that needs write access is currently writable.
//!
//! # Invariants
//!
//! 1. A record exists exactly while its reference count is at least one.
//! 2. The tracker registers one listener per PV on the first
//!    [`add_pv`](ConnectionTracker::add_pv) and removes it on the last
//!    [`remove_pv`](ConnectionTracker::remove_pv).
//! 3. A disconnect forces the connected signal to `false` immediately; a
//!    connect only sets it `true` after re-scanning every record.
//! 4. Property signals are never set while a map shard is locked, so
//!    property subscribers may call back into the tracker.
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | `remove_pv` for an untracked handle | [`RuntimeError::UntrackedPv`] |
//! | Notification after the last `remove_pv` | ignored |
//! | Connect racing a disconnect on another PV | the connect re-checks after publishing `true` and corrects to `false` |

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use pvbind_core::keys::{CONNECTED, PV_WRITABLE};
use pvbind_core::{ListenerId, Property, PvHandle, PvListener, PvValue, Widget};

use crate::error::RuntimeError;

struct Record {
    refs: AtomicUsize,
    connected: AtomicBool,
    needs_write: AtomicBool,
    retired: AtomicBool,
    listener: Mutex<Option<ListenerId>>,
}

impl Record {
    fn new() -> Self {
        Self {
            refs: AtomicUsize::new(1),
            connected: AtomicBool::new(false),
            needs_write: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }
}

struct TrackerInner {
    label: String,
    records: DashMap<PvHandle, Arc<Record>, ahash::RandomState>,
    connected: Option<Property<bool>>,
    writable: Option<Property<bool>>,
}

impl TrackerInner {
    fn scan_connected(&self) -> bool {
        self.records
            .iter()
            .all(|entry| entry.value().connected.load(Ordering::Acquire))
    }

    fn update_connections(&self) {
        let all_connected = self.scan_connected();
        if let Some(connected) = &self.connected {
            connected.set(all_connected);
            if all_connected && !self.scan_connected() {
                connected.set(false);
            }
        }
    }

    fn update_write_access(&self) {
        let mut need_write = false;
        let mut any_writable = false;
        for entry in &self.records {
            if entry.value().needs_write.load(Ordering::Acquire) {
                need_write = true;
                if !entry.key().is_readonly() {
                    any_writable = true;
                }
            }
        }
        let writable = !need_write || any_writable;
        tracing::trace!(tracker = %self.label, writable, "write access recomputed");
        if let Some(property) = &self.writable {
            property.set(writable);
        }
    }

    fn force_disconnected(&self) {
        if let Some(connected) = &self.connected {
            connected.set(false);
        }
    }
}

/// Reference-counted registry of the PVs one runtime uses.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    /// Create a tracker publishing to the given signals.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        connected: Option<Property<bool>>,
        writable: Option<Property<bool>>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                label: label.into(),
                records: DashMap::with_hasher(ahash::RandomState::new()),
                connected,
                writable,
            }),
        }
    }

    /// Tracker publishing to a widget's `connected` and `pv_writable`
    /// properties, when it has them.
    #[must_use]
    pub fn for_widget(widget: &Widget) -> Self {
        Self::new(
            widget.to_string(),
            widget.property(CONNECTED),
            widget.property(PV_WRITABLE),
        )
    }

    /// Start (or continue) tracking `handle`.
    pub fn add_pv(&self, handle: &PvHandle, needs_write_access: bool) {
        let (record, first) = match self.inner.records.entry(handle.clone()) {
            Entry::Occupied(entry) => {
                let record = Arc::clone(entry.get());
                record.refs.fetch_add(1, Ordering::AcqRel);
                (record, false)
            }
            Entry::Vacant(entry) => {
                let record = Arc::new(Record::new());
                entry.insert(Arc::clone(&record));
                (record, true)
            }
        };

        if first {
            tracing::debug!(tracker = %self.inner.label, pv = %handle, "tracking PV");
            self.inner.force_disconnected();
            let listener = Arc::new(TrackerListener {
                tracker: Arc::downgrade(&self.inner),
                record: Arc::clone(&record),
                pv: handle.name().to_owned(),
            });
            let id = handle.add_listener(listener);
            *record.listener.lock() = Some(id);
        }

        if needs_write_access {
            record.needs_write.store(true, Ordering::Release);
            self.inner.update_write_access();
        }
    }

    /// Drop one reference to `handle`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UntrackedPv`] if the handle is not tracked.
    pub fn remove_pv(&self, handle: &PvHandle) -> Result<(), RuntimeError> {
        let removed = match self.inner.records.entry(handle.clone()) {
            Entry::Vacant(_) => {
                return Err(RuntimeError::UntrackedPv {
                    name: handle.name().to_owned(),
                });
            }
            Entry::Occupied(entry) => {
                if entry.get().refs.fetch_sub(1, Ordering::AcqRel) == 1 {
                    Some(entry.remove())
                } else {
                    None
                }
            }
        };

        if let Some(record) = removed {
            record.retired.store(true, Ordering::Release);
            if let Some(id) = record.listener.lock().take() {
                handle.remove_listener(id);
            }
            tracing::debug!(tracker = %self.inner.label, pv = %handle, "untracked PV");
            self.inner.update_connections();
            if record.needs_write.load(Ordering::Acquire) {
                self.inner.update_write_access();
            }
        }
        Ok(())
    }

    /// Snapshot of all tracked PVs.
    #[must_use]
    pub fn pvs(&self) -> Vec<PvHandle> {
        self.inner
            .records
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Snapshot of tracked PVs that are not connected.
    #[must_use]
    pub fn disconnected_pvs(&self) -> Vec<PvHandle> {
        self.inner
            .records
            .iter()
            .filter(|entry| !entry.value().connected.load(Ordering::Acquire))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Reference count of `handle`, zero if untracked.
    #[must_use]
    pub fn ref_count(&self, handle: &PvHandle) -> usize {
        self.inner
            .records
            .get(handle)
            .map_or(0, |entry| entry.value().refs.load(Ordering::Acquire))
    }

    /// Whether every tracked PV is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.scan_connected()
    }

    /// Number of tracked PVs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }
}

impl fmt::Debug for ConnectionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTracker")
            .field("label", &self.inner.label)
            .field("pvs", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

struct TrackerListener {
    tracker: Weak<TrackerInner>,
    record: Arc<Record>,
    pv: String,
}

impl PvListener for TrackerListener {
    fn value_changed(&self, value: &PvValue) {
        if value.is_disconnected() {
            self.disconnected();
            return;
        }
        if self.record.retired.load(Ordering::Acquire) {
            return;
        }
        if self.record.connected.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tracker) = self.tracker.upgrade() {
            tracing::trace!(tracker = %tracker.label, pv = %self.pv, "PV connected");
            tracker.update_connections();
        }
    }

    fn disconnected(&self) {
        if self.record.retired.load(Ordering::Acquire) {
            return;
        }
        self.record.connected.store(false, Ordering::Release);
        if let Some(tracker) = self.tracker.upgrade() {
            tracing::trace!(tracker = %tracker.label, pv = %self.pv, "PV disconnected");
            tracker.force_disconnected();
        }
    }

    fn permission_changed(&self, _readonly: bool) {
        if self.record.retired.load(Ordering::Acquire)
            || !self.record.needs_write.load(Ordering::Acquire)
        {
            return;
        }
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.update_write_access();
        }
    }
}

#![forbid(unsafe_code)]

//! Value bindings between PVs and widget properties.
//!
//! Every binding here follows the same life cycle:
//!
//! 1. Construction reads the name property and acquires the PV
//!    synchronously; an empty name yields the value type's "no PV" sentinel
//!    instead of a handle.
//! 2. Changing the name property releases the old PV and acquires the new one.
//! 3. `dispose()` is idempotent and also runs on drop.
//!
//! | Binding | Direction | Notes |
//! |---------|-----------|-------|
//! | [`NameBinding<T>`] | configurable | rollback on failed write |
//! | [`CrosshairBinding`] | both | per-axis ignore window |
//! | [`HistoryBinding`] | PV to property | circular sample buffer |
//! | [`RoiBinding`] | both | four `NameBinding<f64>`, no rollback |
//!
//! # Threading
//!
//! PV callbacks run on the communication layer's threads and only touch
//! atomics, short mutex sections, and property sets.

mod feedback;
mod history;
mod link;
mod name;
mod plot;
mod roi;

use std::sync::Arc;
use std::time::Duration;

use pvbind_core::{Clock, PropertyValue, PvPool, PvValue};

use crate::config::RuntimeConfig;
use crate::tracker::ConnectionTracker;

pub use feedback::{CrosshairBinding, IgnoreWindow};
pub use history::{CircularBuffer, HistoryBinding};
pub use link::PvLink;
pub use name::NameBinding;
pub use plot::{MarkerBinding, TraceBinding};
pub use roi::RoiBinding;

/// Everything a binding needs from its runtime.
#[derive(Clone)]
pub struct BindingContext {
    pub pool: Arc<PvPool>,
    pub tracker: ConnectionTracker,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<RuntimeConfig>,
    /// Owner description used in log records.
    pub label: Arc<str>,
}

impl BindingContext {
    /// Feedback-suppression window from the configuration.
    #[must_use]
    pub fn ignore_window(&self) -> Duration {
        self.config.ignore_window()
    }
}

impl std::fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingContext")
            .field("label", &self.label)
            .field("tracker", &self.tracker)
            .finish()
    }
}

/// Threads currently setting a property on a binding's behalf.
///
/// Property subscribers run synchronously on the setting thread, so a
/// write triggered by the binding's own set is recognised by thread
/// identity. Edits made on other threads meanwhile are still written.
#[derive(Debug, Default)]
pub(crate) struct ApplyingThreads {
    threads: parking_lot::Mutex<Vec<std::thread::ThreadId>>,
}

impl ApplyingThreads {
    /// Mark the current thread as applying until the guard drops.
    pub(crate) fn enter(&self) -> ApplyingGuard<'_> {
        let id = std::thread::current().id();
        self.threads.lock().push(id);
        ApplyingGuard { owner: self, id }
    }

    /// Whether the current thread is inside [`enter`](Self::enter).
    pub(crate) fn is_current(&self) -> bool {
        let id = std::thread::current().id();
        self.threads.lock().contains(&id)
    }
}

pub(crate) struct ApplyingGuard<'a> {
    owner: &'a ApplyingThreads,
    id: std::thread::ThreadId,
}

impl Drop for ApplyingGuard<'_> {
    fn drop(&mut self) {
        let mut threads = self.owner.threads.lock();
        if let Some(pos) = threads.iter().position(|id| *id == self.id) {
            threads.swap_remove(pos);
        }
    }
}

/// Property value types that can be bound to a PV.
pub trait BindingValue: PropertyValue {
    /// Convert a PV value. `None` drops the update.
    fn from_pv(value: &PvValue) -> Option<Self>;

    /// Value to write to the PV.
    fn to_pv(&self) -> PvValue;

    /// Sentinel shown when there is no PV or no data.
    fn no_pv() -> Self;

    /// Bit-for-bit equality.
    fn same(&self, other: &Self) -> bool;

    /// Whether writing `self` would not change `pv`.
    fn matches(&self, pv: &PvValue) -> bool {
        self.to_pv().same_as(pv)
    }
}

impl BindingValue for PvValue {
    fn from_pv(value: &PvValue) -> Option<Self> {
        Some(value.clone())
    }

    fn to_pv(&self) -> PvValue {
        self.clone()
    }

    fn no_pv() -> Self {
        PvValue::Disconnected
    }

    fn same(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl BindingValue for f64 {
    fn from_pv(value: &PvValue) -> Option<Self> {
        value.as_f64()
    }

    fn to_pv(&self) -> PvValue {
        PvValue::Double(*self)
    }

    fn no_pv() -> Self {
        f64::NAN
    }

    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }

    fn matches(&self, pv: &PvValue) -> bool {
        pv.as_f64().is_some_and(|current| current.to_bits() == self.to_bits())
    }
}

impl BindingValue for String {
    fn from_pv(value: &PvValue) -> Option<Self> {
        Some(value.as_text())
    }

    fn to_pv(&self) -> PvValue {
        PvValue::Text(self.clone())
    }

    fn no_pv() -> Self {
        String::new()
    }

    fn same(&self, other: &Self) -> bool {
        self == other
    }

    fn matches(&self, pv: &PvValue) -> bool {
        !pv.is_disconnected() && pv.as_text() == *self
    }
}

/// Which way values flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// PV to property.
    Read,
    /// Property to PV, e.g. an appender of cursor positions.
    Write,
    /// Both ways.
    ReadWrite,
}

impl Direction {
    #[inline]
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[inline]
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Behavior of a [`NameBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingOptions {
    pub direction: Direction,
    /// Track the PV as needing write access.
    pub needs_write_access: bool,
    /// Restore the PV's value into the property when a write fails.
    pub rollback: bool,
}

impl BindingOptions {
    /// PV to property only.
    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            direction: Direction::Read,
            needs_write_access: false,
            rollback: false,
        }
    }

    /// Bidirectional with rollback.
    #[must_use]
    pub const fn read_write() -> Self {
        Self {
            direction: Direction::ReadWrite,
            needs_write_access: true,
            rollback: true,
        }
    }

    /// Property to PV, never rolled back.
    #[must_use]
    pub const fn write_only() -> Self {
        Self {
            direction: Direction::Write,
            needs_write_access: true,
            rollback: false,
        }
    }

    #[must_use]
    pub const fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    #[must_use]
    pub const fn with_write_access(mut self, needs_write_access: bool) -> Self {
        self.needs_write_access = needs_write_access;
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use pvbind_core::ManualClock;

    pub(crate) fn context() -> (BindingContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at(10_000));
        let cx = BindingContext {
            pool: Arc::new(PvPool::local_only()),
            tracker: ConnectionTracker::new("test", None, None),
            clock: clock.clone(),
            config: Arc::new(RuntimeConfig::default()),
            label: Arc::from("test"),
        };
        (cx, clock)
    }
}

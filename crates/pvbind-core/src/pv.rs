#![forbid(unsafe_code)]

//! PV handle abstraction consumed from the communication layer.
//!
//! A [`PvSource`] is implemented by whatever talks to the control system.
//! The runtime only ever sees it through a [`PvHandle`], a cheap clonable
//! reference whose equality and hash are by *identity*: two handles are
//! equal exactly when they point at the same source instance. The pool
//! guarantees one instance per name, so identity equality is name equality
//! for acquired handles.
//!
//! # Threading
//!
//! [`PvListener`] callbacks execute synchronously on whatever thread the
//! source delivers them on. They must not block.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PvError;
use crate::value::PvValue;

/// Global counter for listener registrations.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Token returned by [`PvSource::add_listener`], used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-unique listener id.
    #[must_use]
    pub fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Receiver of PV notifications.
pub trait PvListener: Send + Sync {
    /// A new value arrived. Never called with [`PvValue::Disconnected`] by
    /// well-behaved sources, but receivers treat that value as a disconnect.
    fn value_changed(&self, value: &PvValue);

    /// The connection was lost.
    fn disconnected(&self) {}

    /// Write access changed.
    fn permission_changed(&self, readonly: bool) {
        let _ = readonly;
    }
}

/// A live data point provided by the communication layer.
pub trait PvSource: Send + Sync {
    /// Full name the PV was resolved from.
    fn name(&self) -> &str;

    /// Last received value, [`PvValue::Disconnected`] if none.
    fn read(&self) -> PvValue;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns [`PvError`] when the PV is read-only, disconnected, or
    /// rejects the value.
    fn write(&self, value: PvValue) -> Result<(), PvError>;

    /// Whether writes are currently refused.
    fn is_readonly(&self) -> bool;

    /// Register a listener. Sources may deliver the current value to the new
    /// listener before returning.
    fn add_listener(&self, listener: Arc<dyn PvListener>) -> ListenerId;

    /// Remove a listener. Returns `false` if the id was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Shared reference to a [`PvSource`] with identity semantics.
#[derive(Clone)]
pub struct PvHandle {
    source: Arc<dyn PvSource>,
}

impl PvHandle {
    /// Wrap a source.
    #[must_use]
    pub fn new(source: Arc<dyn PvSource>) -> Self {
        Self { source }
    }

    /// PV name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Last received value.
    #[must_use]
    pub fn read(&self) -> PvValue {
        self.source.read()
    }

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Propagates the source's [`PvError`].
    pub fn write(&self, value: PvValue) -> Result<(), PvError> {
        self.source.write(value)
    }

    /// Whether writes are refused.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.source.is_readonly()
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn PvListener>) -> ListenerId {
        self.source.add_listener(listener)
    }

    /// Remove a listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.source.remove_listener(id)
    }

    /// Whether both handles refer to the same source instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &PvHandle) -> bool {
        self.identity() == other.identity()
    }

    /// The underlying source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn PvSource> {
        &self.source
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.source) as *const () as usize
    }
}

impl PartialEq for PvHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for PvHandle {}

impl Hash for PvHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for PvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PvHandle").field(&self.name()).finish()
    }
}

impl fmt::Display for PvHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalPv;
    use std::collections::HashSet;

    #[test]
    fn equality_is_identity() {
        let a = LocalPv::new("loc://a", PvValue::Double(1.0));
        let twin = LocalPv::new("loc://a", PvValue::Double(1.0));
        let h1 = PvHandle::new(a.clone());
        let h2 = PvHandle::new(a);
        let h3 = PvHandle::new(twin);
        assert_eq!(h1, h2);
        assert_ne!(h1, h3, "same name, different instance");

        let set: HashSet<PvHandle> = [h1, h2, h3].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn listener_ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }
}

#![forbid(unsafe_code)]

//! Reference-counted PV pool.
//!
//! The pool resolves names to shared [`PvHandle`]s. Acquiring the same name
//! twice yields the same instance and bumps a reference count; the PV is
//! disconnected when the last reference is released.
//!
//! # Invariants
//!
//! 1. One live instance per name: `acquire(n) == acquire(n)` by identity.
//! 2. Every successful `acquire` must be matched by exactly one `release`.
//! 3. `loc://` names are always served by the pool's own
//!    [`LocalConnector`], regardless of the injected connector.
//!
//! # Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | Empty name | [`PvError::Unresolvable`] |
//! | Acquire after [`PvPool::close`] | [`PvError::PoolClosed`] |
//! | Release of a handle the pool does not hold | [`PvError::NotAcquired`] |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::PvError;
use crate::local::{LOCAL_SCHEME, LocalConnector, local_base_name};
use crate::pv::{PvHandle, PvSource};

/// Resolves PV names for a specific control-system protocol.
pub trait PvConnector: Send + Sync {
    /// Connect to `name`.
    ///
    /// # Errors
    ///
    /// [`PvError::Unresolvable`] when the name is not served.
    fn connect(&self, name: &str) -> Result<Arc<dyn PvSource>, PvError>;

    /// Called once the last reference to `source` is released.
    fn disconnect(&self, source: &Arc<dyn PvSource>) {
        let _ = source;
    }
}

struct PoolEntry {
    handle: PvHandle,
    refs: usize,
    local: bool,
}

/// Shared, name de-duplicating PV pool.
pub struct PvPool {
    connector: Arc<dyn PvConnector>,
    local: Arc<LocalConnector>,
    entries: Mutex<AHashMap<String, PoolEntry>>,
    closed: AtomicBool,
}

impl PvPool {
    /// Create a pool delegating non-local names to `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn PvConnector>) -> Self {
        Self {
            connector,
            local: Arc::new(LocalConnector::new()),
            entries: Mutex::new(AHashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// A pool in which every name resolves to a local PV.
    #[must_use]
    pub fn local_only() -> Self {
        let local = Arc::new(LocalConnector::new());
        Self {
            connector: local.clone(),
            local,
            entries: Mutex::new(AHashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn key(name: &str) -> &str {
        local_base_name(name)
    }

    /// Acquire the PV for `name`.
    ///
    /// # Errors
    ///
    /// See the module-level failure table; connector errors propagate.
    pub fn acquire(&self, name: &str) -> Result<PvHandle, PvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PvError::PoolClosed);
        }
        let key = Self::key(name);
        if key.is_empty() {
            return Err(PvError::Unresolvable {
                name: name.to_owned(),
            });
        }
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs += 1;
            return Ok(entry.handle.clone());
        }
        let local = key.starts_with(LOCAL_SCHEME);
        let source = if local {
            PvConnector::connect(self.local.as_ref(), name)?
        } else {
            self.connector.connect(name)?
        };
        let handle = PvHandle::new(source);
        entries.insert(
            key.to_owned(),
            PoolEntry {
                handle: handle.clone(),
                refs: 1,
                local,
            },
        );
        tracing::trace!(pv = key, "acquired new PV");
        Ok(handle)
    }

    /// Release one reference to `handle`.
    ///
    /// # Errors
    ///
    /// [`PvError::NotAcquired`] if the pool does not hold the handle.
    pub fn release(&self, handle: &PvHandle) -> Result<(), PvError> {
        let removed = {
            let mut entries = self.entries.lock();
            let key = match entries.get(Self::key(handle.name())) {
                Some(entry) if entry.handle.ptr_eq(handle) => Self::key(handle.name()).to_owned(),
                _ => entries
                    .iter()
                    .find(|(_, entry)| entry.handle.ptr_eq(handle))
                    .map(|(key, _)| key.clone())
                    .ok_or_else(|| PvError::NotAcquired {
                        name: handle.name().to_owned(),
                    })?,
            };
            let Some(entry) = entries.get_mut(&key) else {
                return Err(PvError::NotAcquired {
                    name: handle.name().to_owned(),
                });
            };
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(&key)
            } else {
                None
            }
        };
        if let Some(entry) = removed {
            self.disconnect(&entry);
        }
        Ok(())
    }

    fn disconnect(&self, entry: &PoolEntry) {
        tracing::trace!(pv = entry.handle.name(), "disconnecting released PV");
        if entry.local {
            self.local.disconnect(entry.handle.source());
        } else {
            self.connector.disconnect(entry.handle.source());
        }
    }

    /// Current reference count for `name`, zero if not held.
    #[must_use]
    pub fn ref_count(&self, name: &str) -> usize {
        self.entries
            .lock()
            .get(Self::key(name))
            .map_or(0, |entry| entry.refs)
    }

    /// Names of all held PVs.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of distinct held PVs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the pool holds no PV.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// The pool's local PV connector.
    #[must_use]
    pub fn local(&self) -> &LocalConnector {
        &self.local
    }

    /// Refuse further acquisitions and drop every held PV.
    ///
    /// Returns the number of PVs that were still held, each of which is a
    /// leaked reference.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<PoolEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            tracing::warn!(pv = entry.handle.name(), refs = entry.refs, "PV still held when pool closed");
            self.disconnect(entry);
        }
        drained.len()
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PvPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PvPool")
            .field("held", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PvValue;

    struct Refusing;

    impl PvConnector for Refusing {
        fn connect(&self, name: &str) -> Result<Arc<dyn PvSource>, PvError> {
            Err(PvError::Unresolvable {
                name: name.to_owned(),
            })
        }
    }

    #[test]
    fn same_name_same_instance() {
        let pool = PvPool::local_only();
        let a = pool.acquire("sim://a").expect("acquire");
        let b = pool.acquire("sim://a").expect("acquire");
        assert_eq!(a, b);
        assert_eq!(pool.ref_count("sim://a"), 2);
        pool.release(&a).expect("release");
        assert_eq!(pool.ref_count("sim://a"), 1);
        pool.release(&b).expect("release");
        assert_eq!(pool.ref_count("sim://a"), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn over_release_is_reported() {
        let pool = PvPool::local_only();
        let a = pool.acquire("loc://x").expect("acquire");
        pool.release(&a).expect("release");
        assert!(matches!(pool.release(&a), Err(PvError::NotAcquired { .. })));
    }

    #[test]
    fn empty_name_is_unresolvable() {
        let pool = PvPool::local_only();
        assert!(matches!(pool.acquire("  "), Err(PvError::Unresolvable { .. })));
    }

    #[test]
    fn local_names_bypass_connector() {
        let pool = PvPool::new(Arc::new(Refusing));
        assert!(pool.acquire("ca://remote").is_err());
        let pv = pool.acquire("loc://x(4)").expect("local PV");
        assert_eq!(pv.read(), PvValue::Double(4.0));
        assert_eq!(pool.ref_count("loc://x"), 1);
    }

    #[test]
    fn released_local_pv_is_recreated_fresh() {
        let pool = PvPool::local_only();
        let a = pool.acquire("loc://x").expect("acquire");
        a.write(PvValue::Double(9.0)).expect("write");
        pool.release(&a).expect("release");
        let b = pool.acquire("loc://x").expect("acquire");
        assert_ne!(a, b);
        assert_eq!(b.read(), PvValue::Double(0.0));
    }

    #[test]
    fn close_reports_leaks_and_refuses() {
        let pool = PvPool::local_only();
        let _a = pool.acquire("loc://x").expect("acquire");
        let _b = pool.acquire("loc://y").expect("acquire");
        assert_eq!(pool.close(), 2);
        assert!(matches!(pool.acquire("loc://x"), Err(PvError::PoolClosed)));
    }

    mod refcount {
        use super::*;
        use proptest::prelude::*;

        const NAMES: [&str; 3] = ["loc://a", "loc://b(1)", "sim://c"];
        const KEYS: [&str; 3] = ["loc://a", "loc://b", "sim://c"];

        proptest! {
            #[test]
            fn counts_track_acquire_and_release(ops in prop::collection::vec((any::<bool>(), 0..3usize), 0..64)) {
                let pool = PvPool::local_only();
                let mut held: Vec<Vec<PvHandle>> = vec![Vec::new(); NAMES.len()];
                for (acquire, index) in ops {
                    if acquire {
                        held[index].push(pool.acquire(NAMES[index]).expect("acquire"));
                    } else if let Some(handle) = held[index].pop() {
                        prop_assert!(pool.release(&handle).is_ok());
                    }
                    for (key, handles) in KEYS.iter().zip(&held) {
                        prop_assert_eq!(pool.ref_count(key), handles.len());
                    }
                    prop_assert_eq!(pool.len(), held.iter().filter(|h| !h.is_empty()).count());
                }
                for handles in &held {
                    let mut unique = handles.clone();
                    unique.dedup();
                    prop_assert!(unique.len() <= 1, "one instance per name while held");
                }
            }
        }
    }
}

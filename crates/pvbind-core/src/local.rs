#![forbid(unsafe_code)]

//! Local PVs: in-memory data points served without a control system.
//!
//! Local PVs are named `loc://name`, optionally followed by a type hint and
//! an initializer:
//!
//! | Name | Initial value |
//! |------|---------------|
//! | `loc://x` | `Double(0.0)` |
//! | `loc://x(3.5)` | `Double(3.5)` |
//! | `loc://x<VLong>(3)` | `Long(3)` |
//! | `loc://x("idle")` | `Text("idle")` |
//! | `loc://x(1, 2, 3)` | `DoubleArray([1, 2, 3])` |
//!
//! The type hint and initializer are not part of the PV's identity:
//! `loc://x(1)` and `loc://x` resolve to the same PV.
//!
//! # Behavior
//!
//! - A new listener receives the current value before `add_listener`
//!   returns, unless the PV is disconnected.
//! - Writes and [`LocalPv::post`] notify every listener synchronously on the
//!   calling thread, outside of any internal lock.
//! - Writing [`PvValue::Disconnected`] disconnects the PV.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::PvError;
use crate::pool::PvConnector;
use crate::pv::{ListenerId, PvListener, PvSource};
use crate::value::PvValue;

/// Scheme prefix of local PV names.
pub const LOCAL_SCHEME: &str = "loc://";

/// Strip a local PV's type hint and initializer.
///
/// Names outside the local scheme are returned unchanged.
#[must_use]
pub fn local_base_name(name: &str) -> &str {
    let name = name.trim();
    if !name.starts_with(LOCAL_SCHEME) {
        return name;
    }
    match name.find(['<', '(']) {
        Some(sep) => name[..sep].trim_end(),
        None => name,
    }
}

/// Initial value encoded in a local PV name, if any.
fn initial_value(name: &str) -> Option<PvValue> {
    let name = name.trim();
    if !name.starts_with(LOCAL_SCHEME) {
        return None;
    }
    let type_hint = match (name.find('<'), name.find('>')) {
        (Some(start), Some(end)) if start < end => Some(&name[start + 1..end]),
        _ => None,
    };
    let open = name.find('(')?;
    let close = name.rfind(')')?;
    if close <= open {
        return None;
    }
    let init = name[open + 1..close].trim();
    if let Some(text) = init.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Some(PvValue::Text(text.to_owned()));
    }
    let numbers: Option<Vec<f64>> = init
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect();
    let numbers = numbers?;
    let first = numbers.first().copied()?;
    match (type_hint, numbers.len()) {
        (Some("VDoubleArray"), _) => Some(PvValue::doubles(numbers)),
        (_, len) if len > 1 => Some(PvValue::doubles(numbers)),
        (Some("VLong"), _) => Some(PvValue::Long(first as i64)),
        (Some("VEnum"), _) => Some(PvValue::Enum(first as i32)),
        _ => Some(PvValue::Double(first)),
    }
}

struct LocalState {
    value: PvValue,
    readonly: bool,
}

/// An in-memory PV.
pub struct LocalPv {
    name: String,
    state: Mutex<LocalState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn PvListener>)>>,
}

impl LocalPv {
    /// Create a PV holding `initial`.
    #[must_use]
    pub fn new(name: impl Into<String>, initial: PvValue) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(LocalState {
                value: initial,
                readonly: false,
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Deliver a value as if it came from the control system.
    ///
    /// Ignores the read-only flag. Posting [`PvValue::Disconnected`] is the
    /// same as [`drop_connection`](Self::drop_connection).
    pub fn post(&self, value: PvValue) {
        self.state.lock().value = value.clone();
        let listeners = self.snapshot();
        if value.is_disconnected() {
            for listener in listeners {
                listener.disconnected();
            }
        } else {
            for listener in listeners {
                listener.value_changed(&value);
            }
        }
    }

    /// Simulate loss of the connection.
    pub fn drop_connection(&self) {
        self.post(PvValue::Disconnected);
    }

    /// Change write access, notifying listeners when it actually changes.
    pub fn set_readonly(&self, readonly: bool) {
        {
            let mut state = self.state.lock();
            if state.readonly == readonly {
                return;
            }
            state.readonly = readonly;
        }
        for listener in self.snapshot() {
            listener.permission_changed(readonly);
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn PvListener>> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl PvSource for LocalPv {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> PvValue {
        self.state.lock().value.clone()
    }

    fn write(&self, value: PvValue) -> Result<(), PvError> {
        if self.state.lock().readonly {
            return Err(PvError::ReadOnly {
                name: self.name.clone(),
            });
        }
        self.post(value);
        Ok(())
    }

    fn is_readonly(&self) -> bool {
        self.state.lock().readonly
    }

    fn add_listener(&self, listener: Arc<dyn PvListener>) -> ListenerId {
        let id = ListenerId::next();
        self.listeners.lock().push((id, Arc::clone(&listener)));
        let current = self.read();
        if !current.is_disconnected() {
            listener.value_changed(&current);
        }
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

impl std::fmt::Debug for LocalPv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPv")
            .field("name", &self.name)
            .field("value", &self.read())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Connector that creates [`LocalPv`]s on demand.
///
/// Used by the pool for every `loc://` name. It also serves as a
/// stand-alone connector for simulations and tests, in which case any name
/// resolves to a local PV initialized to `Double(0.0)`.
#[derive(Default)]
pub struct LocalConnector {
    pvs: Mutex<AHashMap<String, Arc<LocalPv>>>,
}

impl LocalConnector {
    /// Create an empty connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live local PV by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<LocalPv>> {
        self.pvs.lock().get(local_base_name(name)).cloned()
    }

    /// Get or create the PV for `name`.
    ///
    /// # Errors
    ///
    /// [`PvError::Unresolvable`] for an empty name.
    pub fn open(&self, name: &str) -> Result<Arc<LocalPv>, PvError> {
        let base = local_base_name(name);
        if base.is_empty() || base == LOCAL_SCHEME {
            return Err(PvError::Unresolvable {
                name: name.to_owned(),
            });
        }
        let mut pvs = self.pvs.lock();
        if let Some(existing) = pvs.get(base) {
            return Ok(Arc::clone(existing));
        }
        let initial = initial_value(name).unwrap_or(PvValue::Double(0.0));
        let pv = LocalPv::new(base, initial);
        pvs.insert(base.to_owned(), Arc::clone(&pv));
        tracing::trace!(pv = base, "created local PV");
        Ok(pv)
    }

    /// Number of live local PVs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pvs.lock().len()
    }

    /// Whether no local PV is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pvs.lock().is_empty()
    }

    fn forget(&self, name: &str) {
        self.pvs.lock().remove(local_base_name(name));
    }
}

impl PvConnector for LocalConnector {
    fn connect(&self, name: &str) -> Result<Arc<dyn PvSource>, PvError> {
        let pv: Arc<dyn PvSource> = self.open(name)?;
        Ok(pv)
    }

    fn disconnect(&self, source: &Arc<dyn PvSource>) {
        self.forget(source.name());
    }
}

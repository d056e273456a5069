//! PVs with an explicit network round trip.
//!
//! A [`LatentPv`] queues writes instead of applying them. Tests decide when
//! the "server" answers: [`LatentPv::flush`] echoes queued writes in order,
//! [`LatentPv::deliver`] injects any value, e.g. a stale one still in
//! flight.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use pvbind_core::{ListenerId, PvConnector, PvError, PvListener, PvSource, PvValue};

struct LatentState {
    value: PvValue,
    readonly: bool,
    pending: VecDeque<PvValue>,
}

/// PV whose writes take effect only when flushed.
pub struct LatentPv {
    name: String,
    state: Mutex<LatentState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn PvListener>)>>,
}

impl LatentPv {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(LatentState {
                value: PvValue::Disconnected,
                readonly: false,
                pending: VecDeque::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn listeners(&self) -> Vec<Arc<dyn PvListener>> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Deliver `value` from the server.
    pub fn deliver(&self, value: PvValue) {
        self.state.lock().value = value.clone();
        for listener in self.listeners() {
            if value.is_disconnected() {
                listener.disconnected();
            } else {
                listener.value_changed(&value);
            }
        }
    }

    /// Echo the oldest queued write. Returns `false` when none is queued.
    pub fn flush_one(&self) -> bool {
        let next = self.state.lock().pending.pop_front();
        match next {
            Some(value) => {
                self.deliver(value);
                true
            }
            None => false,
        }
    }

    /// Echo every queued write, oldest first.
    pub fn flush(&self) -> usize {
        let mut count = 0;
        while self.flush_one() {
            count += 1;
        }
        count
    }

    /// Writes not yet echoed.
    #[must_use]
    pub fn pending(&self) -> Vec<PvValue> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn set_readonly(&self, readonly: bool) {
        {
            let mut state = self.state.lock();
            if state.readonly == readonly {
                return;
            }
            state.readonly = readonly;
        }
        for listener in self.listeners() {
            listener.permission_changed(readonly);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl PvSource for LatentPv {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> PvValue {
        self.state.lock().value.clone()
    }

    fn write(&self, value: PvValue) -> Result<(), PvError> {
        let mut state = self.state.lock();
        if state.value.is_disconnected() {
            return Err(PvError::Disconnected {
                name: self.name.clone(),
            });
        }
        if state.readonly {
            return Err(PvError::ReadOnly {
                name: self.name.clone(),
            });
        }
        state.pending.push_back(value);
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

/// Connector creating one [`LatentPv`] per name on demand.
#[derive(Default)]
pub struct LatentConnector {
    pvs: Mutex<Vec<Arc<LatentPv>>>,
}

impl LatentConnector {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The PV for `name`, created disconnected if needed.
    #[must_use]
    pub fn pv(&self, name: &str) -> Arc<LatentPv> {
        let mut pvs = self.pvs.lock();
        if let Some(pv) = pvs.iter().find(|pv| pv.name == name) {
            return Arc::clone(pv);
        }
        let pv = LatentPv::new(name);
        pvs.push(Arc::clone(&pv));
        pv
    }
}

impl PvConnector for LatentConnector {
    fn connect(&self, name: &str) -> Result<Arc<dyn PvSource>, PvError> {
        let pv: Arc<dyn PvSource> = self.pv(name);
        Ok(pv)
    }
}

#![forbid(unsafe_code)]

//! Array PV dispatcher.
//!
//! Splits an array PV into one local PV per element, named
//! `loc://{basename}{index}`, and keeps both sides in sync:
//!
//! - Array update with a new element count: fresh element PVs are acquired,
//!   the old ones released, and the listener receives the new list.
//! - Array update with the same count: element values are updated in place;
//!   the listener is not called.
//! - Array disconnect: every element PV is disconnected.
//! - Element write: the whole array is reassembled and written back. An
//!   array that arrived as a scalar is written back as a scalar.
//!
//! Writes made by the dispatcher itself are not echoed in either direction.
//!
//! # Invariants
//!
//! 1. Element PVs are acquired before the previous ones are released, so
//!    PVs present in both lists keep their identity and value.
//! 2. Every acquired element is released exactly once, by the next count
//!    change or by [`ArrayPvDispatcher::close`].
//! 3. `close` never calls the listener.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pvbind_core::{LOCAL_SCHEME, ListenerId, PvHandle, PvListener, PvPool, PvValue};

use crate::error::RuntimeError;

/// Receives the ordered element PVs whenever the element count changes.
pub type ElementListener = Arc<dyn Fn(&[PvHandle]) + Send + Sync>;

/// Name of element `index` for `basename`.
#[must_use]
pub fn element_name(basename: &str, index: usize) -> String {
    format!("{LOCAL_SCHEME}{basename}{index}")
}

struct Element {
    pv: PvHandle,
    listener: ListenerId,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    Unknown,
    Scalar,
    Array,
}

struct DispatchState {
    elements: Vec<Element>,
    text: bool,
    shape: Shape,
}

struct DispatchShared {
    pool: Arc<PvPool>,
    array_pv: PvHandle,
    basename: String,
    listener: ElementListener,
    state: Mutex<DispatchState>,
    /// Non-zero while the dispatcher writes to the array or its elements.
    ignore_updates: AtomicUsize,
    closed: AtomicBool,
}

struct IgnoreGuard<'a>(&'a AtomicUsize);

impl<'a> IgnoreGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for IgnoreGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn split(value: &PvValue) -> Option<(Vec<PvValue>, bool, Shape)> {
    match value {
        PvValue::Disconnected => None,
        PvValue::DoubleArray(values) => Some((
            values.iter().map(|v| PvValue::Double(*v)).collect(),
            false,
            Shape::Array,
        )),
        PvValue::TextArray(values) => Some((
            values.iter().map(|v| PvValue::Text(v.clone())).collect(),
            true,
            Shape::Array,
        )),
        PvValue::Text(_) => Some((vec![value.clone()], true, Shape::Scalar)),
        scalar => Some((vec![scalar.clone()], false, Shape::Scalar)),
    }
}

impl DispatchShared {
    fn ignoring(&self) -> bool {
        self.ignore_updates.load(Ordering::Acquire) > 0 || self.closed.load(Ordering::Acquire)
    }

    fn on_array_value(self: &Arc<Self>, value: &PvValue) {
        if self.ignoring() {
            return;
        }
        let Some((values, text, shape)) = split(value) else {
            self.on_array_disconnected();
            return;
        };

        let same_count = {
            let mut state = self.state.lock();
            state.shape = shape;
            state.text = text;
            state.elements.len() == values.len()
        };
        if same_count {
            self.update_in_place(&values);
        } else {
            self.rebuild(&values);
        }
    }

    fn on_array_disconnected(&self) {
        if self.ignoring() {
            return;
        }
        let pvs: Vec<PvHandle> = self.state.lock().elements.iter().map(|e| e.pv.clone()).collect();
        let _guard = IgnoreGuard::enter(&self.ignore_updates);
        for pv in pvs {
            if let Err(err) = pv.write(PvValue::Disconnected) {
                tracing::warn!(pv = %pv, %err, "cannot mark element disconnected");
            }
        }
    }

    fn update_in_place(&self, values: &[PvValue]) {
        let pvs: Vec<PvHandle> = self.state.lock().elements.iter().map(|e| e.pv.clone()).collect();
        let _guard = IgnoreGuard::enter(&self.ignore_updates);
        for (pv, value) in pvs.iter().zip(values) {
            if pv.read().same_as(value) {
                continue;
            }
            if let Err(err) = pv.write(value.clone()) {
                tracing::warn!(pv = %pv, %err, "cannot update element");
            }
        }
    }

    fn rebuild(self: &Arc<Self>, values: &[PvValue]) {
        let mut fresh = Vec::with_capacity(values.len());
        {
            let _guard = IgnoreGuard::enter(&self.ignore_updates);
            for (index, value) in values.iter().enumerate() {
                let name = element_name(&self.basename, index);
                let pv = match self.pool.acquire(&name) {
                    Ok(pv) => pv,
                    Err(err) => {
                        tracing::warn!(array = %self.array_pv, pv = name, %err, "cannot create element PV");
                        continue;
                    }
                };
                if let Err(err) = pv.write(value.clone()) {
                    tracing::warn!(pv = %pv, %err, "cannot initialize element");
                }
                let listener = pv.add_listener(Arc::new(ElementWatcher {
                    shared: Arc::downgrade(self),
                }));
                fresh.push(Element { pv, listener });
            }
        }

        let handles: Vec<PvHandle> = fresh.iter().map(|e| e.pv.clone()).collect();
        let stale = std::mem::replace(&mut self.state.lock().elements, fresh);
        self.release(stale);
        tracing::debug!(array = %self.array_pv, elements = handles.len(), "array element count changed");
        (self.listener)(&handles);
    }

    fn release(&self, elements: Vec<Element>) {
        for element in elements {
            element.pv.remove_listener(element.listener);
            if let Err(err) = self.pool.release(&element.pv) {
                tracing::error!(pv = %element.pv, %err, "cannot release element PV");
            }
        }
    }

    /// Reassemble the array from the elements and write it back.
    fn on_element_change(&self) {
        if self.ignoring() {
            return;
        }
        let (values, text, shape) = {
            let state = self.state.lock();
            let values: Vec<PvValue> = state.elements.iter().map(|e| e.pv.read()).collect();
            (values, state.text, state.shape)
        };
        let assembled = match (text, shape, values.as_slice()) {
            (true, Shape::Scalar, [single]) => PvValue::Text(single.as_text()),
            (false, Shape::Scalar, [single]) => PvValue::Double(single.as_f64().unwrap_or(f64::NAN)),
            (true, _, _) => PvValue::texts(values.iter().map(PvValue::as_text)),
            (false, _, _) => PvValue::doubles(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(f64::NAN))
                    .collect::<Vec<f64>>(),
            ),
        };
        let _guard = IgnoreGuard::enter(&self.ignore_updates);
        if let Err(err) = self.array_pv.write(assembled) {
            tracing::warn!(array = %self.array_pv, %err, "cannot write array");
        }
    }
}

struct ArrayWatcher {
    shared: Weak<DispatchShared>,
}

impl PvListener for ArrayWatcher {
    fn value_changed(&self, value: &PvValue) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_array_value(value);
        }
    }

    fn disconnected(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_array_disconnected();
        }
    }
}

struct ElementWatcher {
    shared: Weak<DispatchShared>,
}

impl PvListener for ElementWatcher {
    fn value_changed(&self, value: &PvValue) {
        if value.is_disconnected() {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.on_element_change();
        }
    }
}

/// Dispatches an array PV to per-element local PVs.
pub struct ArrayPvDispatcher {
    shared: Arc<DispatchShared>,
    array_listener: Mutex<Option<ListenerId>>,
}

impl ArrayPvDispatcher {
    /// Start dispatching `array_pv`.
    ///
    /// `basename` must be unique among live dispatchers; the array widget
    /// derives it from its widget id.
    #[must_use]
    pub fn new(
        pool: Arc<PvPool>,
        array_pv: PvHandle,
        basename: impl Into<String>,
        listener: impl Fn(&[PvHandle]) + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new(DispatchShared {
            pool,
            array_pv: array_pv.clone(),
            basename: basename.into(),
            listener: Arc::new(listener),
            state: Mutex::new(DispatchState {
                elements: Vec::new(),
                text: false,
                shape: Shape::Unknown,
            }),
            ignore_updates: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        let id = array_pv.add_listener(Arc::new(ArrayWatcher {
            shared: Arc::downgrade(&shared),
        }));
        Self {
            shared,
            array_listener: Mutex::new(Some(id)),
        }
    }

    /// The dispatched array PV.
    #[must_use]
    pub fn array_pv(&self) -> &PvHandle {
        &self.shared.array_pv
    }

    /// Current element PVs, in order.
    #[must_use]
    pub fn element_pvs(&self) -> Vec<PvHandle> {
        self.shared
            .state
            .lock()
            .elements
            .iter()
            .map(|e| e.pv.clone())
            .collect()
    }

    /// Stop dispatching and release all element PVs. Idempotent.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature leaves room for connector errors.
    pub fn close(&self) -> Result<(), RuntimeError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(id) = self.array_listener.lock().take() {
            self.shared.array_pv.remove_listener(id);
        }
        let elements = std::mem::take(&mut self.shared.state.lock().elements);
        self.shared.release(elements);
        Ok(())
    }
}

impl Drop for ArrayPvDispatcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for ArrayPvDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayPvDispatcher")
            .field("array", &self.shared.array_pv)
            .field("basename", &self.shared.basename)
            .field("elements", &self.element_pvs().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Calls = Arc<Mutex<Vec<Vec<String>>>>;

    fn dispatcher(pool: &Arc<PvPool>, array: &str) -> (PvHandle, ArrayPvDispatcher, Calls) {
        let array_pv = pool.acquire(array).expect("array");
        let calls: Calls = Arc::default();
        let sink = calls.clone();
        let dispatcher = ArrayPvDispatcher::new(pool.clone(), array_pv.clone(), "w7_elem", move |pvs| {
            sink.lock()
                .push(pvs.iter().map(|pv| pv.name().to_owned()).collect());
        });
        (array_pv, dispatcher, calls)
    }

    #[test]
    fn initial_value_creates_elements() {
        let pool = Arc::new(PvPool::local_only());
        let (_, dispatcher, calls) = dispatcher(&pool, "loc://wave(1, 2, 3)");
        assert_eq!(
            calls.lock().as_slice(),
            &[vec![
                "loc://w7_elem0".to_owned(),
                "loc://w7_elem1".to_owned(),
                "loc://w7_elem2".to_owned()
            ]]
        );
        let values: Vec<PvValue> = dispatcher.element_pvs().iter().map(PvHandle::read).collect();
        assert_eq!(
            values,
            vec![PvValue::Double(1.0), PvValue::Double(2.0), PvValue::Double(3.0)]
        );
    }

    #[test]
    fn same_count_updates_in_place() {
        let pool = Arc::new(PvPool::local_only());
        let (array, dispatcher, calls) = dispatcher(&pool, "loc://wave(1, 2)");
        let before = dispatcher.element_pvs();
        array.write(PvValue::doubles(vec![5.0, 6.0])).expect("write");
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(dispatcher.element_pvs(), before);
        assert_eq!(before[1].read(), PvValue::Double(6.0));
    }

    #[test]
    fn count_change_notifies_and_releases() {
        let pool = Arc::new(PvPool::local_only());
        let (array, dispatcher, calls) = dispatcher(&pool, "loc://wave(1, 2, 3)");
        array.write(PvValue::doubles(vec![1.0, 2.0])).expect("write");
        assert_eq!(calls.lock().len(), 2);
        assert_eq!(dispatcher.element_pvs().len(), 2);
        assert_eq!(pool.ref_count("loc://w7_elem2"), 0);
        assert_eq!(pool.ref_count("loc://w7_elem0"), 1);
    }

    #[test]
    fn scalar_is_one_element_and_written_back_as_scalar() {
        let pool = Arc::new(PvPool::local_only());
        let (array, dispatcher, _) = dispatcher(&pool, "loc://scalar(4)");
        let elements = dispatcher.element_pvs();
        assert_eq!(elements.len(), 1);
        elements[0].write(PvValue::Double(9.0)).expect("write");
        assert_eq!(array.read(), PvValue::Double(9.0));
    }

    #[test]
    fn element_write_reassembles_array() {
        let pool = Arc::new(PvPool::local_only());
        let (array, dispatcher, calls) = dispatcher(&pool, "loc://wave(1, 2, 3)");
        dispatcher.element_pvs()[1].write(PvValue::Double(7.0)).expect("write");
        assert_eq!(array.read(), PvValue::doubles(vec![1.0, 7.0, 3.0]));
        assert_eq!(calls.lock().len(), 1, "write-back is not echoed");
    }

    #[test]
    fn text_arrays_dispatch_text() {
        let pool = Arc::new(PvPool::local_only());
        let array = pool.acquire("loc://names").expect("array");
        array.write(PvValue::texts(["a", "b"])).expect("write");
        let dispatcher = ArrayPvDispatcher::new(pool.clone(), array.clone(), "t_", |_| {});
        let elements = dispatcher.element_pvs();
        assert_eq!(elements[1].read(), PvValue::Text("b".into()));
        elements[0].write(PvValue::Text("z".into())).expect("write");
        assert_eq!(array.read(), PvValue::texts(["z", "b"]));
    }

    #[test]
    fn disconnect_propagates_to_elements() {
        let pool = Arc::new(PvPool::local_only());
        let (_, dispatcher, calls) = dispatcher(&pool, "loc://wave(1, 2)");
        pool.local().get("loc://wave").expect("array").drop_connection();
        assert!(dispatcher.element_pvs().iter().all(|pv| pv.read().is_disconnected()));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn close_releases_without_notifying() {
        let pool = Arc::new(PvPool::local_only());
        let (array, dispatcher, calls) = dispatcher(&pool, "loc://wave(1, 2)");
        dispatcher.close().expect("close");
        dispatcher.close().expect("close twice");
        assert_eq!(calls.lock().len(), 1);
        assert!(dispatcher.element_pvs().is_empty());
        assert_eq!(pool.names(), vec!["loc://wave".to_owned()]);
        array.write(PvValue::doubles(vec![1.0])).expect("write");
        assert_eq!(calls.lock().len(), 1);
    }
}

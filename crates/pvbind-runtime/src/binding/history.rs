//! History binding: PV samples accumulated in a circular buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pvbind_core::{Property, PvHandle, PvListener, PvValue, Subscription};

use super::BindingContext;
use super::link::{LinkSlot, PvLink};

/// Fixed-capacity FIFO that drops the oldest element when full.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> CircularBuffer<T> {
    /// Buffer holding at most `capacity` items (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest item when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Items oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

struct HistoryShared {
    cx: BindingContext,
    value: Property<PvValue>,
    buffer: Mutex<CircularBuffer<f64>>,
    link: LinkSlot,
    disposed: AtomicBool,
}

impl HistoryShared {
    fn append(&self, value: &PvValue) {
        let Some(sample) = value.as_f64() else {
            return;
        };
        let samples = {
            let mut buffer = self.buffer.lock();
            buffer.push(sample);
            buffer.to_vec()
        };
        self.value.set(PvValue::doubles(samples));
    }

    fn connect(self: &Arc<Self>, name: &str) {
        self.link.clear(&self.cx);
        self.buffer.lock().clear();
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let name = name.trim();
        if name.is_empty() {
            self.value.set(PvValue::Disconnected);
            return;
        }
        let listener = Arc::new(HistoryListener {
            shared: Arc::downgrade(self),
        });
        match PvLink::open(&self.cx, name, false, Some(listener)) {
            Ok(link) => {
                self.link.replace(&self.cx, Some(link));
                if self.disposed.load(Ordering::Acquire) {
                    self.link.clear(&self.cx);
                }
            }
            Err(err) => {
                tracing::warn!(owner = %self.cx.label, pv = name, %err, "cannot bind history PV");
                self.value.set(PvValue::Disconnected);
            }
        }
    }
}

struct HistoryListener {
    shared: Weak<HistoryShared>,
}

impl PvListener for HistoryListener {
    fn value_changed(&self, value: &PvValue) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if value.is_disconnected() {
            shared.value.set(PvValue::Disconnected);
        } else {
            shared.append(value);
        }
    }

    fn disconnected(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.value.set(PvValue::Disconnected);
        }
    }
}

/// Appends every numeric PV update to a circular buffer and publishes the
/// buffer as a [`PvValue::DoubleArray`].
///
/// A disconnect publishes [`PvValue::Disconnected`] but keeps the samples;
/// the next update republishes them plus the new sample. Changing the name
/// starts a fresh history.
pub struct HistoryBinding {
    shared: Arc<HistoryShared>,
    subscription: Mutex<Option<Subscription>>,
}

impl HistoryBinding {
    #[must_use]
    pub fn new(
        cx: BindingContext,
        name: Property<String>,
        value: Property<PvValue>,
        capacity: usize,
    ) -> Self {
        let shared = Arc::new(HistoryShared {
            cx,
            value,
            buffer: Mutex::new(CircularBuffer::new(capacity)),
            link: LinkSlot::default(),
            disposed: AtomicBool::new(false),
        });
        let weak = Arc::downgrade(&shared);
        let subscription = name.subscribe(move |new_name: &String| {
            if let Some(shared) = weak.upgrade() {
                shared.connect(new_name);
            }
        });
        shared.connect(&name.get());
        Self {
            shared,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Currently bound PV.
    #[must_use]
    pub fn pv(&self) -> Option<PvHandle> {
        self.shared.link.handle()
    }

    /// Buffered samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<f64> {
        self.shared.buffer.lock().to_vec()
    }

    /// Release the PV. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscription.lock().take();
        self.shared.link.clear(&self.shared.cx);
    }
}

impl Drop for HistoryBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

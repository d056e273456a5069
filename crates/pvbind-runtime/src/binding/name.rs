//! Generic name-property to value-property binding.
//!
//! # Invariants
//!
//! 1. PV updates equal (bit for bit) to the property's value are dropped.
//! 2. Property changes equal to the PV's last value are never written.
//! 3. Property sets made by the binding itself are not written back.
//! 4. A failed write with rollback restores the PV's last known value.
//!
//! # Failure Modes
//!
//! - **Acquisition failure**: logged at `warn`; the value property shows the
//!   "no PV" sentinel; no retry until the name changes.
//! - **Write failure**: logged at `warn`; rolled back when enabled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pvbind_core::{Property, PvHandle, PvListener, PvValue, Subscription};

use super::link::{LinkSlot, PvLink};
use super::{ApplyingThreads, BindingContext, BindingOptions, BindingValue};

struct Shared<T: BindingValue> {
    cx: BindingContext,
    name: Property<String>,
    value: Property<T>,
    options: BindingOptions,
    link: LinkSlot,
    /// Threads on which the binding itself is setting `value`.
    applying: ApplyingThreads,
    disposed: AtomicBool,
}

impl<T: BindingValue> Shared<T> {
    fn apply(&self, new: T) {
        if self.value.with(|current| current.same(&new)) {
            tracing::trace!(owner = %self.cx.label, property = self.value.name(), "dropped equal value");
            return;
        }
        let _guard = self.applying.enter();
        self.value.set(new);
    }

    fn connect(self: &Arc<Self>, name: &str) {
        self.link.clear(&self.cx);
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let name = name.trim();
        if name.is_empty() {
            if self.options.direction.reads() {
                self.apply(T::no_pv());
            }
            return;
        }
        let listener: Option<Arc<dyn PvListener>> = self.options.direction.reads().then(|| {
            Arc::new(ValueListener {
                shared: Arc::downgrade(self),
            }) as Arc<dyn PvListener>
        });
        match PvLink::open(&self.cx, name, self.options.needs_write_access, listener) {
            Ok(link) => {
                self.link.replace(&self.cx, Some(link));
                if self.disposed.load(Ordering::Acquire) {
                    self.link.clear(&self.cx);
                }
            }
            Err(err) => {
                tracing::warn!(owner = %self.cx.label, pv = name, %err, "cannot bind PV");
                if self.options.direction.reads() {
                    self.apply(T::no_pv());
                }
            }
        }
    }

    fn write(&self, new: &T) {
        if !self.options.direction.writes()
            || self.applying.is_current()
            || self.disposed.load(Ordering::Acquire)
        {
            return;
        }
        let Some(handle) = self.link.handle() else {
            return;
        };
        if new.matches(&handle.read()) {
            return;
        }
        if let Err(err) = handle.write(new.to_pv()) {
            tracing::warn!(owner = %self.cx.label, pv = %handle, %err, "write failed");
            if self.options.rollback {
                let restored = T::from_pv(&handle.read()).unwrap_or_else(T::no_pv);
                self.apply(restored);
            }
        }
    }
}

struct ValueListener<T: BindingValue> {
    shared: Weak<Shared<T>>,
}

impl<T: BindingValue> PvListener for ValueListener<T> {
    fn value_changed(&self, value: &PvValue) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if value.is_disconnected() {
            shared.apply(T::no_pv());
        } else if let Some(new) = T::from_pv(value) {
            shared.apply(new);
        }
    }

    fn disconnected(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.apply(T::no_pv());
        }
    }
}

/// Couples a PV-name property to a value property.
///
/// # Example
///
/// ```ignore
/// let binding = NameBinding::new(cx, pv_name, pv_value, BindingOptions::read_only());
/// pv_name.set("loc://other".into()); // rebinds
/// binding.dispose();
/// ```
pub struct NameBinding<T: BindingValue> {
    shared: Arc<Shared<T>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl<T: BindingValue> NameBinding<T> {
    /// Bind `value` to the PV named by `name`, connecting immediately.
    #[must_use]
    pub fn new(
        cx: BindingContext,
        name: Property<String>,
        value: Property<T>,
        options: BindingOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            cx,
            name: name.clone(),
            value: value.clone(),
            options,
            link: LinkSlot::default(),
            applying: ApplyingThreads::default(),
            disposed: AtomicBool::new(false),
        });

        let mut subscriptions = Vec::with_capacity(2);
        if options.direction.writes() {
            let weak = Arc::downgrade(&shared);
            subscriptions.push(value.subscribe(move |new: &T| {
                if let Some(shared) = weak.upgrade() {
                    shared.write(new);
                }
            }));
        }
        let weak = Arc::downgrade(&shared);
        subscriptions.push(name.subscribe(move |new_name: &String| {
            if let Some(shared) = weak.upgrade() {
                shared.connect(new_name);
            }
        }));

        shared.connect(&name.get());
        Self {
            shared,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Currently bound PV.
    #[must_use]
    pub fn pv(&self) -> Option<PvHandle> {
        self.shared.link.handle()
    }

    /// The bound name property.
    #[must_use]
    pub fn name_property(&self) -> &Property<String> {
        &self.shared.name
    }

    /// The bound value property.
    #[must_use]
    pub fn value_property(&self) -> &Property<T> {
        &self.shared.value
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Stop observing both properties and release the PV. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscriptions.lock().clear();
        self.shared.link.clear(&self.shared.cx);
    }
}

impl<T: BindingValue> Drop for NameBinding<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: BindingValue> std::fmt::Debug for NameBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameBinding")
            .field("property", &self.shared.value.name())
            .field("pv", &self.pv())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

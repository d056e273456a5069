#![forbid(unsafe_code)]

//! Typed observable widget properties.
//!
//! A [`Property<T>`] is a shared, thread-safe cell that notifies
//! subscribers when its value changes. Widgets hold their properties in a
//! [`PropertyBag`] addressed by typed [`PropertyKey`]s.
//!
//! # Invariants
//!
//! 1. Setting a value equal to the current one is a no-op: no version bump,
//!    no notification.
//! 2. Subscribers run synchronously on the thread that called
//!    [`Property::set`], after the internal lock has been released. A
//!    subscriber may therefore read or set the same property.
//! 3. Dropping a [`Subscription`] unsubscribes. A callback that is
//!    running concurrently may still complete once.
//!
//! # Failure Modes
//!
//! - **Recursive set from a subscriber**: each nested set notifies again.
//!   Feedback loops must be guarded by the caller (see the binding engine's
//!   feedback guards).

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Bound for values stored in a [`Property`].
pub trait PropertyValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> PropertyValue for T {}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct PropertyInner<T> {
    name: &'static str,
    value: Mutex<T>,
    version: AtomicU64,
    next_subscriber: AtomicU64,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
}

/// A shared observable value.
///
/// Cloning yields another handle to the same cell.
pub struct Property<T> {
    inner: Arc<PropertyInner<T>>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: PropertyValue> Property<T> {
    /// Create a property.
    #[must_use]
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            inner: Arc::new(PropertyInner {
                name,
                value: Mutex::new(value),
                version: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Property name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// Access the value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.lock())
    }

    /// Set the value, notifying subscribers if it changed.
    ///
    /// Returns `true` when the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.inner.value.lock();
            if *current == value {
                return false;
            }
            *current = value.clone();
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
        let callbacks: Vec<Callback<T>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&value);
        }
        true
    }

    /// Change counter, bumped once per effective [`set`](Self::set).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Subscribe to changes.
    ///
    /// The callback is not invoked with the current value.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .push((id, Arc::new(callback)));
        let weak: Weak<PropertyInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(existing, _)| *existing != id);
            }
        })
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: PropertyValue + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

/// RAII guard that unsubscribes on drop.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an unsubscribe action.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Keys and bags
// ---------------------------------------------------------------------------

/// Typed name of a widget property.
pub struct PropertyKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> PropertyKey<T> {
    /// Declare a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    /// Property name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for PropertyKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PropertyKey<T> {}

impl<T> fmt::Debug for PropertyKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyKey({})", self.name)
    }
}

/// Type-erased property, as stored in a [`PropertyBag`].
pub trait AnyProperty: Send + Sync {
    /// Property name.
    fn name(&self) -> &'static str;
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
    /// Independent copy holding the current value, without subscribers.
    fn duplicate(&self) -> Box<dyn AnyProperty>;
    /// Name of the value type.
    fn type_name(&self) -> &'static str;
}

impl<T: PropertyValue> AnyProperty for Property<T> {
    fn name(&self) -> &'static str {
        self.inner.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn duplicate(&self) -> Box<dyn AnyProperty> {
        Box::new(Property::new(self.inner.name, self.get()))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Ordered set of properties owned by one widget.
#[derive(Default)]
pub struct PropertyBag {
    properties: Vec<Box<dyn AnyProperty>>,
}

impl PropertyBag {
    /// Empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a property, returning its handle.
    pub fn insert<T: PropertyValue>(&mut self, key: PropertyKey<T>, value: T) -> Property<T> {
        let property = Property::new(key.name(), value);
        let boxed: Box<dyn AnyProperty> = Box::new(property.clone());
        match self.properties.iter_mut().find(|p| p.name() == key.name()) {
            Some(slot) => *slot = boxed,
            None => self.properties.push(boxed),
        }
        property
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with<T: PropertyValue>(mut self, key: PropertyKey<T>, value: T) -> Self {
        let _ = self.insert(key, value);
        self
    }

    /// Look up a property. `None` when absent or of a different type.
    #[must_use]
    pub fn get<T: PropertyValue>(&self, key: PropertyKey<T>) -> Option<Property<T>> {
        self.properties
            .iter()
            .find(|p| p.name() == key.name())
            .and_then(|p| p.as_any().downcast_ref::<Property<T>>())
            .cloned()
    }

    /// Whether a property of that name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name() == name)
    }

    /// Property names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|p| p.name()).collect()
    }

    /// Independent copy of every property.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            properties: self.properties.iter().map(|p| p.duplicate()).collect(),
        }
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const COUNT: PropertyKey<i32> = PropertyKey::new("count");
    const LABEL: PropertyKey<String> = PropertyKey::new("label");

    #[test]
    fn equal_set_is_noop() {
        let p = Property::new("count", 1);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = p.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!p.set(1));
        assert_eq!(p.version(), 0);
        assert!(p.set(2));
        assert_eq!(p.version(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let p = Property::new("count", 0);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = p.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(p.subscriber_count(), 1);
        drop(sub);
        assert_eq!(p.subscriber_count(), 0);
        p.set(5);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscriber_can_read_property() {
        let p = Property::new("count", 0);
        let seen = Arc::new(AtomicUsize::new(0));
        let (reader, s) = (p.clone(), seen.clone());
        let _sub = p.subscribe(move |v| {
            assert_eq!(reader.get(), *v);
            s.store(*v as usize, Ordering::SeqCst);
        });
        p.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn bag_lookup_is_typed() {
        let bag = PropertyBag::new()
            .with(COUNT, 3)
            .with(LABEL, "x".to_owned());
        assert_eq!(bag.get(COUNT).map(|p| p.get()), Some(3));
        let wrong: PropertyKey<bool> = PropertyKey::new("count");
        assert!(bag.get(wrong).is_none());
        assert_eq!(bag.names(), vec!["count", "label"]);
    }

    #[test]
    fn duplicate_is_independent() {
        let bag = PropertyBag::new().with(COUNT, 3);
        let copy = bag.duplicate();
        if let Some(p) = copy.get(COUNT) {
            p.set(9);
        }
        assert_eq!(bag.get(COUNT).map(|p| p.get()), Some(3));
        assert_eq!(copy.get(COUNT).map(|p| p.get()), Some(9));
    }
}

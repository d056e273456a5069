#![forbid(unsafe_code)]

//! Hierarchical widget model.
//!
//! A [`Widget`] is an immutable-identity node with typed properties, optional
//! structured property lists (ROIs, traces, markers), and, for containers, an
//! observable ordered [`Children`] list. Tab containers hold one child list
//! per [`Tab`].
//!
//! Widgets are shared as `Arc<Widget>`; every mutable part (property values,
//! child lists) is internally synchronized.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::property::{Property, PropertyBag, PropertyKey, PropertyValue, Subscription};

/// Widget kind identifiers understood by the default runtime registry.
pub mod kinds {
    pub const DISPLAY: &str = "display";
    pub const GROUP: &str = "group";
    pub const TABS: &str = "tabs";
    pub const ARRAY: &str = "array";
    pub const EMBEDDED: &str = "embedded";
    pub const IMAGE: &str = "image";
    pub const XY_PLOT: &str = "xyplot";
    pub const STRIP_CHART: &str = "stripchart";
}

/// Global counter for widget ids.
static WIDGET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(u64);

impl WidgetId {
    fn next() -> Self {
        Self(WIDGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

/// Change to a [`Children`] list.
#[derive(Debug, Clone)]
pub enum ChildrenEvent {
    Added { index: usize, widget: Arc<Widget> },
    Removed { index: usize, widget: Arc<Widget> },
}

type ChildrenCallback = Arc<dyn Fn(&ChildrenEvent) + Send + Sync>;

#[derive(Default)]
struct ChildrenInner {
    widgets: Mutex<Vec<Arc<Widget>>>,
    next_subscriber: AtomicU64,
    subscribers: Mutex<Vec<(u64, ChildrenCallback)>>,
}

/// Observable ordered child list. Cloning shares the list.
#[derive(Clone, Default)]
pub struct Children {
    inner: Arc<ChildrenInner>,
}

impl Children {
    /// Empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_vec(widgets: Vec<Arc<Widget>>) -> Self {
        let children = Self::new();
        *children.inner.widgets.lock() = widgets;
        children
    }

    /// Append a child.
    pub fn add(&self, widget: Arc<Widget>) {
        let index = {
            let mut widgets = self.inner.widgets.lock();
            widgets.push(Arc::clone(&widget));
            widgets.len() - 1
        };
        self.notify(&ChildrenEvent::Added { index, widget });
    }

    /// Insert a child at `index`, clamped to the list length.
    pub fn insert(&self, index: usize, widget: Arc<Widget>) {
        let index = {
            let mut widgets = self.inner.widgets.lock();
            let index = index.min(widgets.len());
            widgets.insert(index, Arc::clone(&widget));
            index
        };
        self.notify(&ChildrenEvent::Added { index, widget });
    }

    /// Remove the child with `id`.
    pub fn remove(&self, id: WidgetId) -> Option<Arc<Widget>> {
        let removed = {
            let mut widgets = self.inner.widgets.lock();
            let index = widgets.iter().position(|w| w.id() == id)?;
            (index, widgets.remove(index))
        };
        self.notify(&ChildrenEvent::Removed {
            index: removed.0,
            widget: Arc::clone(&removed.1),
        });
        Some(removed.1)
    }

    /// Remove the child at `index`.
    pub fn remove_at(&self, index: usize) -> Option<Arc<Widget>> {
        let widget = {
            let mut widgets = self.inner.widgets.lock();
            if index >= widgets.len() {
                return None;
            }
            widgets.remove(index)
        };
        self.notify(&ChildrenEvent::Removed {
            index,
            widget: Arc::clone(&widget),
        });
        Some(widget)
    }

    /// Copy of the current list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Widget>> {
        self.inner.widgets.lock().clone()
    }

    /// Child at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<Widget>> {
        self.inner.widgets.lock().get(index).cloned()
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.widgets.lock().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.widgets.lock().is_empty()
    }

    /// Observe additions and removals.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ChildrenEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .push((id, Arc::new(callback)));
        let weak: Weak<ChildrenInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(existing, _)| *existing != id);
            }
        })
    }

    fn notify(&self, event: &ChildrenEvent) {
        let callbacks: Vec<ChildrenCallback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    fn duplicate(&self) -> Self {
        Self::from_vec(self.snapshot().iter().map(|w| w.duplicate()).collect())
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.snapshot().iter().map(|w| w.to_string()))
            .finish()
    }
}

/// One page of a tab container.
#[derive(Debug, Clone)]
pub struct Tab {
    pub name: String,
    pub children: Children,
}

// ---------------------------------------------------------------------------
// Widget
// ---------------------------------------------------------------------------

/// A node of the widget model.
pub struct Widget {
    id: WidgetId,
    kind: String,
    name: String,
    properties: PropertyBag,
    structures: Vec<(String, Vec<PropertyBag>)>,
    children: Option<Children>,
    tabs: Vec<Tab>,
}

impl Widget {
    /// Start building a widget of `kind`.
    #[must_use]
    pub fn builder(kind: impl Into<String>) -> WidgetBuilder {
        WidgetBuilder {
            kind: kind.into(),
            name: String::new(),
            properties: PropertyBag::new(),
            structures: Vec::new(),
            children: None,
            tabs: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> WidgetId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Typed property lookup.
    #[must_use]
    pub fn property<T: PropertyValue>(&self, key: PropertyKey<T>) -> Option<Property<T>> {
        self.properties.get(key)
    }

    /// All properties.
    #[must_use]
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Elements of a structured property list; empty when absent.
    #[must_use]
    pub fn structure(&self, name: &str) -> &[PropertyBag] {
        self.structures
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, items)| items.as_slice())
            .unwrap_or_default()
    }

    /// Child list of a container.
    #[must_use]
    pub fn children(&self) -> Option<&Children> {
        self.children.as_ref()
    }

    /// Pages of a tab container.
    #[must_use]
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    /// Whether the widget holds children directly or in tabs.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.children.is_some() || !self.tabs.is_empty()
    }

    /// Every child list: the direct one, then each tab's, in tab order.
    #[must_use]
    pub fn child_lists(&self) -> Vec<Children> {
        self.children
            .iter()
            .cloned()
            .chain(self.tabs.iter().map(|tab| tab.children.clone()))
            .collect()
    }

    /// Deep copy with fresh ids and current property values.
    #[must_use]
    pub fn duplicate(&self) -> Arc<Widget> {
        Arc::new(Widget {
            id: WidgetId::next(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            properties: self.properties.duplicate(),
            structures: self
                .structures
                .iter()
                .map(|(name, items)| (name.clone(), items.iter().map(PropertyBag::duplicate).collect()))
                .collect(),
            children: self.children.as_ref().map(Children::duplicate),
            tabs: self
                .tabs
                .iter()
                .map(|tab| Tab {
                    name: tab.name.clone(),
                    children: tab.children.duplicate(),
                })
                .collect(),
        })
    }

    /// Properties for `key` on every leaf at or below this widget.
    ///
    /// Containers are descended into, never matched themselves.
    #[must_use]
    pub fn leaf_descendants_with<T: PropertyValue>(&self, key: PropertyKey<T>) -> Vec<Property<T>> {
        let mut found = Vec::new();
        self.collect_leaves(key, &mut found);
        found
    }

    fn collect_leaves<T: PropertyValue>(&self, key: PropertyKey<T>, found: &mut Vec<Property<T>>) {
        if self.is_container() {
            for list in self.child_lists() {
                for child in list.snapshot() {
                    child.collect_leaves(key, found);
                }
            }
        } else if let Some(property) = self.property(key) {
            found.push(property);
        }
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' {}", self.kind, self.name, self.id)
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("children", &self.children)
            .field("tabs", &self.tabs)
            .finish()
    }
}

/// Builder for [`Widget`].
#[must_use]
pub struct WidgetBuilder {
    kind: String,
    name: String,
    properties: PropertyBag,
    structures: Vec<(String, Vec<PropertyBag>)>,
    children: Option<Vec<Arc<Widget>>>,
    tabs: Vec<Tab>,
}

impl WidgetBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a property.
    pub fn with<T: PropertyValue>(mut self, key: PropertyKey<T>, value: T) -> Self {
        let _ = self.properties.insert(key, value);
        self
    }

    /// Make the widget a container, even with no children yet.
    pub fn container(mut self) -> Self {
        self.children.get_or_insert_with(Vec::new);
        self
    }

    /// Append a child, making the widget a container.
    pub fn child(mut self, child: Arc<Widget>) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    /// Append a tab page.
    pub fn tab(mut self, name: impl Into<String>, children: Vec<Arc<Widget>>) -> Self {
        self.tabs.push(Tab {
            name: name.into(),
            children: Children::from_vec(children),
        });
        self
    }

    /// Add a structured property list.
    pub fn structure(mut self, name: impl Into<String>, items: Vec<PropertyBag>) -> Self {
        self.structures.push((name.into(), items));
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Widget> {
        Arc::new(Widget {
            id: WidgetId::next(),
            kind: self.kind,
            name: self.name,
            properties: self.properties,
            structures: self.structures,
            children: self.children.map(Children::from_vec),
            tabs: self.tabs,
        })
    }
}

/// Reference to a display model, comparable by identity.
#[derive(Clone)]
pub struct ModelRef(pub Arc<Widget>);

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelRef({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PV_NAME;
    use std::sync::atomic::AtomicUsize;

    fn leaf(name: &str) -> Arc<Widget> {
        Widget::builder("label")
            .name(name)
            .with(PV_NAME, String::new())
            .build()
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(leaf("a").id(), leaf("b").id());
    }

    #[test]
    fn leaf_descendants_skip_containers() {
        let group = Widget::builder(kinds::GROUP)
            .with(PV_NAME, String::new())
            .child(leaf("a"))
            .child(Widget::builder(kinds::GROUP).child(leaf("b")).build())
            .build();
        let found = group.leaf_descendants_with(PV_NAME);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn tabs_contribute_child_lists() {
        let tabs = Widget::builder(kinds::TABS)
            .tab("one", vec![leaf("a")])
            .tab("two", vec![leaf("b"), leaf("c")])
            .build();
        assert!(tabs.is_container());
        assert!(tabs.children().is_none());
        assert_eq!(tabs.leaf_descendants_with(PV_NAME).len(), 3);
    }

    #[test]
    fn duplicate_gets_fresh_ids_and_values() {
        let original = Widget::builder(kinds::GROUP).child(leaf("a")).build();
        let copy = original.duplicate();
        assert_ne!(copy.id(), original.id());
        let orig_child = original.children().and_then(|c| c.get(0)).expect("child");
        let copy_child = copy.children().and_then(|c| c.get(0)).expect("child");
        assert_ne!(orig_child.id(), copy_child.id());
        copy_child.property(PV_NAME).expect("pv_name").set("x".into());
        assert_eq!(orig_child.property(PV_NAME).expect("pv_name").get(), "");
    }

    #[test]
    fn children_events_are_delivered() {
        let children = Children::new();
        let events = Arc::new(AtomicUsize::new(0));
        let e = events.clone();
        let _sub = children.subscribe(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
        let a = leaf("a");
        children.add(a.clone());
        children.insert(0, leaf("b"));
        assert_eq!(children.remove(a.id()).map(|w| w.id()), Some(a.id()));
        assert!(children.remove_at(5).is_none());
        assert_eq!(children.len(), 1);
        assert_eq!(events.load(Ordering::SeqCst), 3);
    }
}

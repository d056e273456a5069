//! Child runtimes of container widgets.
//!
//! Starts one runtime per child, in list order, and follows additions and
//! removals while started. Tab containers contribute one list per tab; all
//! tabs are started, not only the visible one. Stopping runs in exact
//! reverse: last tab first, last child first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pvbind_core::{Children, ChildrenEvent, Subscription, Widget, WidgetId};

use crate::context::RuntimeContext;
use crate::error::Result;
use crate::isolate::contain;
use crate::widget_runtime::{RuntimeCapability, RuntimeScope, WidgetRuntime};

struct ChildSlot {
    widget: WidgetId,
    runtime: Arc<WidgetRuntime>,
}

struct ChildList {
    context: RuntimeContext,
    slots: Mutex<Vec<ChildSlot>>,
    subscription: Mutex<Option<Subscription>>,
    stopped: AtomicBool,
}

impl ChildList {
    fn contains(&self, widget: WidgetId) -> bool {
        self.slots.lock().iter().any(|slot| slot.widget == widget)
    }

    /// Create, initialize, and start a runtime for `widget`, then place it
    /// at `index` (clamped).
    fn start_child(&self, index: usize, widget: Arc<Widget>) {
        if self.stopped.load(Ordering::Acquire) || self.contains(widget.id()) {
            return;
        }
        let id = widget.id();
        let runtime = self.context.registry().create(&self.context, widget);
        if !contain(id, "initialize", || runtime.initialize()) {
            return;
        }
        contain(id, "start", || runtime.start());
        let mut slots = self.slots.lock();
        let index = index.min(slots.len());
        slots.insert(index, ChildSlot { widget: id, runtime });
    }

    fn stop_child(&self, widget: WidgetId) {
        let slot = {
            let mut slots = self.slots.lock();
            let Some(position) = slots.iter().position(|slot| slot.widget == widget) else {
                return;
            };
            slots.remove(position)
        };
        contain(widget, "stop", || slot.runtime.stop());
    }

    fn on_event(&self, event: &ChildrenEvent) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        match event {
            ChildrenEvent::Added { index, widget } => {
                tracing::debug!(child = %widget, index, "child added at runtime");
                self.start_child(*index, Arc::clone(widget));
            }
            ChildrenEvent::Removed { widget, .. } => {
                tracing::debug!(child = %widget, "child removed at runtime");
                self.stop_child(widget.id());
            }
        }
    }

    fn stop_all(&self) {
        self.stopped.store(true, Ordering::Release);
        self.subscription.lock().take();
        let slots = std::mem::take(&mut *self.slots.lock());
        for slot in slots.into_iter().rev() {
            contain(slot.widget, "stop", || slot.runtime.stop());
        }
    }
}

/// Runs the runtimes of a container's children.
#[derive(Default)]
pub struct ChildrenCapability {
    lists: Mutex<Vec<Arc<ChildList>>>,
}

impl ChildrenCapability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtimes of the started children, in list order.
    #[must_use]
    pub fn child_runtimes(&self) -> Vec<Arc<WidgetRuntime>> {
        self.lists
            .lock()
            .iter()
            .flat_map(|list| {
                list.slots
                    .lock()
                    .iter()
                    .map(|slot| Arc::clone(&slot.runtime))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn watch(list: &Arc<ChildList>, children: &Children) {
        let weak: Weak<ChildList> = Arc::downgrade(list);
        let subscription = children.subscribe(move |event| {
            if let Some(list) = weak.upgrade() {
                list.on_event(event);
            }
        });
        *list.subscription.lock() = Some(subscription);
    }
}

impl RuntimeCapability for ChildrenCapability {
    fn name(&self) -> &'static str {
        "children"
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        for children in scope.widget().child_lists() {
            let list = Arc::new(ChildList {
                context: scope.context().clone(),
                slots: Mutex::new(Vec::new()),
                subscription: Mutex::new(None),
                stopped: AtomicBool::new(false),
            });
            Self::watch(&list, &children);
            for (index, child) in children.snapshot().into_iter().enumerate() {
                list.start_child(index, child);
            }
            self.lists.lock().push(list);
        }
        Ok(())
    }

    fn stop(&self, _scope: &RuntimeScope) {
        let lists = std::mem::take(&mut *self.lists.lock());
        for list in lists.into_iter().rev() {
            list.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget_runtime::RuntimeState;
    use pvbind_core::keys::{PV_NAME, PV_VALUE};
    use pvbind_core::{PvValue, kinds};

    fn leaf(pv: &str) -> Arc<Widget> {
        Widget::builder("textupdate")
            .with(PV_NAME, pv.to_owned())
            .with(PV_VALUE, PvValue::Disconnected)
            .build()
    }

    fn run(cx: &RuntimeContext, widget: &Arc<Widget>) -> Arc<WidgetRuntime> {
        let runtime = cx.registry().create(cx, widget.clone());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        runtime
    }

    #[test]
    fn every_tab_is_started() {
        let cx = RuntimeContext::default();
        let tabs = Widget::builder(kinds::TABS)
            .tab("one", vec![leaf("loc://a")])
            .tab("two", vec![leaf("loc://b")])
            .build();
        let runtime = run(&cx, &tabs);
        assert_eq!(cx.pool().names(), vec!["loc://a".to_owned(), "loc://b".to_owned()]);
        runtime.stop().expect("stop");
        assert!(cx.pool().is_empty());
    }

    #[test]
    fn added_and_removed_children_follow_the_list() {
        let cx = RuntimeContext::default();
        let group = Widget::builder(kinds::GROUP).container().build();
        let runtime = run(&cx, &group);
        let children = group.children().expect("container").clone();

        let child = leaf("loc://late");
        children.add(child.clone());
        let child_runtime = cx.runtime_of(child.id()).expect("started");
        assert_eq!(child_runtime.state(), RuntimeState::Started);

        children.remove(child.id());
        assert_eq!(child_runtime.state(), RuntimeState::Stopped);
        assert!(cx.pool().is_empty());

        runtime.stop().expect("stop");
        children.add(leaf("loc://after"));
        assert!(cx.pool().is_empty(), "no starts after stop");
    }
}

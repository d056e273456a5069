//! Array container: one child per element of an array PV.
//!
//! The first child is the template. More elements duplicate it; fewer
//! elements remove children from the end, never the template. Each child's
//! leaf `pv_name` properties are set to its element PV, so a nested group
//! routes the same element to every leaf inside it.
//!
//! Removed children get an empty PV name before removal, which unbinds
//! them; the children capability then stops their runtimes.

use std::sync::Arc;

use parking_lot::Mutex;
use pvbind_core::keys::PV_NAME;
use pvbind_core::{Children, PvHandle, Widget};

use crate::binding::PvLink;
use crate::dispatcher::ArrayPvDispatcher;
use crate::error::Result;
use crate::widget_runtime::{RuntimeCapability, RuntimeScope};

fn assign_name(widget: &Widget, name: &str) {
    for property in widget.leaf_descendants_with(PV_NAME) {
        property.set(name.to_owned());
    }
}

/// Match `children` to `elements`, growing from `template` as needed.
fn apply_elements(children: &Children, template: &Arc<Widget>, elements: &[PvHandle]) {
    let wanted = elements.len().max(1);

    while children.len() > wanted {
        let last = children.len() - 1;
        if let Some(child) = children.get(last) {
            assign_name(&child, "");
        }
        children.remove_at(last);
    }
    while children.len() < wanted {
        let child = template.duplicate();
        if let Some(pv) = elements.get(children.len()) {
            assign_name(&child, pv.name());
        }
        children.add(child);
    }
    for (index, child) in children.snapshot().iter().enumerate() {
        let name = elements.get(index).map(PvHandle::name).unwrap_or_default();
        assign_name(child, name);
    }
}

struct ArrayState {
    link: PvLink,
    dispatcher: ArrayPvDispatcher,
    children: Children,
}

/// Drives an array widget's children from its `pv_name` PV.
#[derive(Default)]
pub struct ArrayCapability {
    state: Mutex<Option<ArrayState>>,
}

impl ArrayCapability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Element PVs currently dispatched.
    #[must_use]
    pub fn element_pvs(&self) -> Vec<PvHandle> {
        self.state
            .lock()
            .as_ref()
            .map(|state| state.dispatcher.element_pvs())
            .unwrap_or_default()
    }
}

impl RuntimeCapability for ArrayCapability {
    fn name(&self) -> &'static str {
        "array"
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        let widget = scope.widget();
        let Some(children) = widget.children().cloned() else {
            tracing::warn!(widget = %widget, "array widget is not a container");
            return Ok(());
        };
        let Some(template) = children.get(0) else {
            tracing::warn!(widget = %widget, "array widget has no template child");
            return Ok(());
        };
        let name = widget
            .property(PV_NAME)
            .map(|p| p.get())
            .unwrap_or_default();
        if name.trim().is_empty() {
            tracing::debug!(widget = %widget, "array widget has no PV");
            return Ok(());
        }

        let cx = scope.binding();
        let link = PvLink::open(cx, &name, false, None)?;
        let basename = format!("array{}_{}", widget.id().id(), cx.config.array_element_prefix);
        let target = children.clone();
        let dispatcher = ArrayPvDispatcher::new(
            cx.pool.clone(),
            link.handle().clone(),
            basename,
            move |elements| apply_elements(&target, &template, elements),
        );
        *self.state.lock() = Some(ArrayState {
            link,
            dispatcher,
            children,
        });
        Ok(())
    }

    fn stop(&self, scope: &RuntimeScope) {
        let Some(state) = self.state.lock().take() else {
            return;
        };
        if let Err(err) = state.dispatcher.close() {
            tracing::warn!(widget = %scope.widget(), %err, "cannot close array dispatcher");
        }
        state.link.close(scope.binding());

        // Back to the template alone, unbound.
        while state.children.len() > 1 {
            state.children.remove_at(state.children.len() - 1);
        }
        for child in state.children.snapshot() {
            assign_name(&child, "");
        }
    }
}

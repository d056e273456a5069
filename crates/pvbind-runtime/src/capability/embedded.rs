//! Embedded sub-display.
//!
//! Runs the display referenced by the widget's `embedded_model` property.
//! When the property changes, the old display is stopped completely before
//! the new one starts.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pvbind_core::keys::{EMBEDDED_MODEL, OPEN_FULL_VIEW};
use pvbind_core::{ModelRef, Subscription, WidgetId};

use crate::action::{RuntimeAction, icons};
use crate::context::RuntimeContext;
use crate::error::Result;
use crate::isolate::contain;
use crate::widget_runtime::{RuntimeCapability, RuntimeScope, WidgetRuntime};

struct EmbeddedState {
    owner: WidgetId,
    context: RuntimeContext,
    current: Mutex<Option<Arc<WidgetRuntime>>>,
}

impl EmbeddedState {
    fn swap(&self, model: Option<&ModelRef>) {
        if let Some(old) = self.current.lock().take() {
            contain(old.widget().id(), "stop", || old.stop());
        }
        let Some(ModelRef(root)) = model else {
            return;
        };
        tracing::debug!(owner = %self.owner, model = %root, "starting embedded display");
        let runtime = self.context.registry().create(&self.context, Arc::clone(root));
        if !contain(root.id(), "initialize", || runtime.initialize()) {
            return;
        }
        contain(root.id(), "start", || runtime.start());
        *self.current.lock() = Some(runtime);
    }
}

/// Runs an embedded display and swaps it when the model changes.
#[derive(Default)]
pub struct EmbeddedCapability {
    state: Mutex<Option<Arc<EmbeddedState>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl EmbeddedCapability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime of the embedded display's root.
    #[must_use]
    pub fn current(&self) -> Option<Arc<WidgetRuntime>> {
        self.state
            .lock()
            .as_ref()
            .and_then(|state| state.current.lock().clone())
    }
}

impl RuntimeCapability for EmbeddedCapability {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn actions(&self, scope: &RuntimeScope) -> Vec<RuntimeAction> {
        scope
            .widget()
            .property(OPEN_FULL_VIEW)
            .map(|trigger| RuntimeAction::pulse("Open Full View", icons::OPEN_FULL_VIEW, trigger))
            .into_iter()
            .collect()
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        let Some(model) = scope.widget().property(EMBEDDED_MODEL) else {
            return Ok(());
        };
        let state = Arc::new(EmbeddedState {
            owner: scope.widget().id(),
            context: scope.context().clone(),
            current: Mutex::new(None),
        });
        let weak: Weak<EmbeddedState> = Arc::downgrade(&state);
        let subscription = model.subscribe(move |new_model| {
            if let Some(state) = weak.upgrade() {
                state.swap(new_model.as_ref());
            }
        });
        state.swap(model.get().as_ref());
        *self.state.lock() = Some(state);
        *self.subscription.lock() = Some(subscription);
        Ok(())
    }

    fn stop(&self, _scope: &RuntimeScope) {
        self.subscription.lock().take();
        if let Some(state) = self.state.lock().take() {
            state.swap(None);
        }
    }
}

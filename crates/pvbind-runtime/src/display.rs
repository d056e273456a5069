#![forbid(unsafe_code)]

//! Display orchestrator.
//!
//! A [`DisplayRuntime`] owns the runtime tree of one display model. It
//! creates the root runtime through the registry and lets container
//! capabilities recurse depth first.
//!
//! # Invariants
//!
//! 1. At most one runtime tree exists per `DisplayRuntime`.
//! 2. `replace_model` stops the old tree completely before the new one
//!    starts.
//! 3. Lifecycle failures of any widget, including the root, are logged and
//!    never escape `start` or `stop`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use pvbind_core::{Widget, WidgetId};
use web_time::Instant;

use crate::context::RuntimeContext;
use crate::isolate::contain;
use crate::widget_runtime::WidgetRuntime;

/// Runs the widget runtimes of one display model.
pub struct DisplayRuntime {
    context: RuntimeContext,
    model: Mutex<Arc<Widget>>,
    root: Mutex<Option<Arc<WidgetRuntime>>>,
}

impl DisplayRuntime {
    #[must_use]
    pub fn new(context: RuntimeContext, model: Arc<Widget>) -> Self {
        Self {
            context,
            model: Mutex::new(model),
            root: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    #[must_use]
    pub fn model(&self) -> Arc<Widget> {
        Arc::clone(&self.model.lock())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.root.lock().is_some()
    }

    /// Start every runtime of the model. No-op when already running.
    pub fn start(&self) {
        let mut root = self.root.lock();
        if root.is_some() {
            tracing::debug!("display already running");
            return;
        }
        let model = self.model();
        let _span = tracing::debug_span!("pvbind.display.start", root = %model.id()).entered();
        let started = Instant::now();

        let runtime = self.context.registry().create(&self.context, Arc::clone(&model));
        if contain(model.id(), "initialize", || runtime.initialize()) {
            contain(model.id(), "start", || runtime.start());
            *root = Some(runtime);
        }

        tracing::info!(
            display = %model,
            runtimes = self.context.live_count(),
            pvs = self.context.pool().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "display started"
        );
    }

    /// Stop every runtime, children before parents. No-op when stopped.
    pub fn stop(&self) {
        let Some(runtime) = self.root.lock().take() else {
            return;
        };
        let root = runtime.widget().id();
        let _span = tracing::debug_span!("pvbind.display.stop", root = %root).entered();
        let started = Instant::now();

        contain(root, "stop", || runtime.stop());

        tracing::info!(
            root = %root,
            remaining_runtimes = self.context.live_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "display stopped"
        );
    }

    /// Swap in a new model, restarting if the display was running.
    pub fn replace_model(&self, model: Arc<Widget>) {
        let running = self.is_running();
        if running {
            self.stop();
        }
        tracing::debug!(model = %model, "display model replaced");
        *self.model.lock() = model;
        if running {
            self.start();
        }
    }

    /// Runtime of the root widget.
    #[must_use]
    pub fn root_runtime(&self) -> Option<Arc<WidgetRuntime>> {
        self.root.lock().clone()
    }

    /// Live runtime of any widget in the tree.
    #[must_use]
    pub fn runtime_of(&self, widget: WidgetId) -> Option<Arc<WidgetRuntime>> {
        self.context.runtime_of(widget)
    }
}

impl Drop for DisplayRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DisplayRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayRuntime")
            .field("model", &self.model().to_string())
            .field("running", &self.is_running())
            .finish()
    }
}

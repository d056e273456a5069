//! Services shared by every runtime of a display.

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use pvbind_core::{Clock, PvPool, SystemClock, WidgetId};

use crate::config::RuntimeConfig;
use crate::registry::RuntimeRegistry;
use crate::widget_runtime::{RuntimeState, WidgetRuntime};

/// Pool, clock, configuration, registry, and the index of live runtimes.
///
/// Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct RuntimeContext {
    pool: Arc<PvPool>,
    clock: Arc<dyn Clock>,
    config: Arc<RuntimeConfig>,
    registry: Arc<RuntimeRegistry>,
    live: Arc<DashMap<WidgetId, Weak<WidgetRuntime>, ahash::RandomState>>,
}

impl RuntimeContext {
    #[must_use]
    pub fn builder() -> RuntimeContextBuilder {
        RuntimeContextBuilder::default()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<PvPool> {
        &self.pool
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        &self.registry
    }

    /// Live runtime of a widget, if it is started.
    #[must_use]
    pub fn runtime_of(&self, widget: WidgetId) -> Option<Arc<WidgetRuntime>> {
        self.live.get(&widget).and_then(|entry| entry.upgrade())
    }

    /// Snapshots of every started runtime, ordered by widget id.
    #[must_use]
    pub fn views(&self) -> Vec<RuntimeView> {
        let mut views: Vec<RuntimeView> = self
            .live
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .map(|runtime| runtime.view())
            .collect();
        views.sort_by_key(|view| view.widget);
        views
    }

    /// Number of started runtimes.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn register_live(&self, runtime: &Arc<WidgetRuntime>) {
        self.live
            .insert(runtime.widget().id(), Arc::downgrade(runtime));
    }

    pub(crate) fn unregister_live(&self, widget: WidgetId) {
        self.live.remove(&widget);
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("pvs", &self.pool.len())
            .field("config", &self.config)
            .field("live", &self.live.len())
            .finish()
    }
}

/// Builder for [`RuntimeContext`]. Unset parts get defaults: a local-only
/// pool, the system clock, the default configuration, and the default
/// registry.
#[derive(Default)]
pub struct RuntimeContextBuilder {
    pool: Option<Arc<PvPool>>,
    clock: Option<Arc<dyn Clock>>,
    config: Option<RuntimeConfig>,
    registry: Option<Arc<RuntimeRegistry>>,
}

impl RuntimeContextBuilder {
    #[must_use]
    pub fn pool(mut self, pool: Arc<PvPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: Arc<RuntimeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn build(self) -> RuntimeContext {
        RuntimeContext {
            pool: self
                .pool
                .unwrap_or_else(|| Arc::new(PvPool::local_only())),
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock::new())),
            config: Arc::new(self.config.unwrap_or_default()),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(RuntimeRegistry::with_defaults())),
            live: Arc::new(DashMap::with_hasher(ahash::RandomState::new())),
        }
    }
}

/// Point-in-time description of a widget runtime, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeView {
    pub widget: WidgetId,
    pub kind: String,
    pub name: String,
    pub state: RuntimeState,
    /// Names of tracked PVs, sorted.
    pub pvs: Vec<String>,
    /// Names of tracked PVs that are not connected, sorted.
    pub disconnected_pvs: Vec<String>,
    /// Labels of the runtime actions.
    pub actions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvbind_core::{Widget, kinds};

    #[test]
    fn defaults_are_usable() {
        let cx = RuntimeContext::default();
        assert!(cx.pool().is_empty());
        assert_eq!(cx.config().ignore_window_ms, 1000);
        assert_eq!(cx.live_count(), 0);
        assert!(cx.registry().is_registered(kinds::GROUP));
    }

    #[test]
    fn live_index_tracks_started_runtimes() {
        let cx = RuntimeContext::default();
        let widget = Widget::builder("label").build();
        let runtime = cx.registry().create(&cx, widget.clone());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        assert!(cx.runtime_of(widget.id()).is_some());
        assert_eq!(cx.views()[0].state, RuntimeState::Started);
        runtime.stop().expect("stop");
        assert!(cx.runtime_of(widget.id()).is_none());
    }
}

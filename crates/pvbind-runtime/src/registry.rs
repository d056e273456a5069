//! Widget kind to runtime capabilities.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use pvbind_core::{Widget, kinds};

use crate::capability::{
    ArrayCapability, ChildrenCapability, EmbeddedCapability, ImageCapability, PlotCapability,
    PlotMode,
};
use crate::context::RuntimeContext;
use crate::widget_runtime::{RuntimeCapability, WidgetRuntime};

/// Builds the capabilities of a runtime for one widget.
pub type CapabilityFactory =
    Arc<dyn Fn(&Widget) -> Vec<Box<dyn RuntimeCapability>> + Send + Sync>;

/// Box a capability for a factory's result.
#[must_use]
pub fn boxed(capability: impl RuntimeCapability + 'static) -> Box<dyn RuntimeCapability> {
    Box::new(capability)
}

/// Maps widget kinds to capability factories.
///
/// Kinds without a factory get a [`ChildrenCapability`] when they are
/// containers and nothing otherwise; every runtime still binds its primary
/// PV and write actions.
pub struct RuntimeRegistry {
    factories: RwLock<AHashMap<String, CapabilityFactory>>,
}

impl RuntimeRegistry {
    /// Registry with no kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(AHashMap::new()),
        }
    }

    /// Registry knowing the built-in kinds of [`pvbind_core::kinds`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for kind in [kinds::DISPLAY, kinds::GROUP, kinds::TABS] {
            registry.register(kind, |_| vec![boxed(ChildrenCapability::new())]);
        }
        registry.register(kinds::ARRAY, |_| {
            vec![boxed(ArrayCapability::new()), boxed(ChildrenCapability::new())]
        });
        registry.register(kinds::EMBEDDED, |_| vec![boxed(EmbeddedCapability::new())]);
        registry.register(kinds::IMAGE, |_| vec![boxed(ImageCapability::new())]);
        registry.register(kinds::XY_PLOT, |_| {
            vec![boxed(PlotCapability::new(PlotMode::Sampled))]
        });
        registry.register(kinds::STRIP_CHART, |_| {
            vec![boxed(PlotCapability::new(PlotMode::History))]
        });
        registry
    }

    /// Register or replace the factory for `kind`.
    pub fn register(
        &self,
        kind: impl Into<String>,
        factory: impl Fn(&Widget) -> Vec<Box<dyn RuntimeCapability>> + Send + Sync + 'static,
    ) {
        let kind = kind.into();
        tracing::debug!(kind = kind, "registered runtime kind");
        self.factories.write().insert(kind, Arc::new(factory));
    }

    #[must_use]
    pub fn is_registered(&self, kind: &str) -> bool {
        self.factories.read().contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Runtime for `widget`, in the `Created` state.
    #[must_use]
    pub fn create(&self, context: &RuntimeContext, widget: Arc<Widget>) -> Arc<WidgetRuntime> {
        let factory = self.factories.read().get(widget.kind()).cloned();
        let capabilities = match factory {
            Some(factory) => factory(&widget),
            None if widget.is_container() => vec![boxed(ChildrenCapability::new())],
            None => Vec::new(),
        };
        WidgetRuntime::new(context, widget, capabilities)
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

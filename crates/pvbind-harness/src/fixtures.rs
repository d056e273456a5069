//! Runtime fixtures and widget builders.

use std::sync::Arc;

use pvbind_core::keys::{CONNECTED, PV_NAME, PV_VALUE, PV_WRITABLE};
use pvbind_core::{ManualClock, PvPool, PvValue, Widget, kinds};
use pvbind_runtime::{DisplayRuntime, RuntimeConfig, RuntimeContext};

use crate::journal::Journal;
use crate::logging::init_test_logging;
use crate::probe::{FAILING, FAULTY, PROBE, PROBE_GROUP, probe_registry};

/// Start of every fixture clock, in milliseconds.
pub const START_MS: u64 = 10_000;

/// A runtime context with a manual clock and the probe kinds registered.
pub struct Fixture {
    pub context: RuntimeContext,
    pub clock: Arc<ManualClock>,
    pub journal: Journal,
}

impl Fixture {
    /// Local-only pool, default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(Arc::new(PvPool::local_only()))
    }

    #[must_use]
    pub fn with_pool(pool: Arc<PvPool>) -> Self {
        Self::build(pool, RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::build(Arc::new(PvPool::local_only()), config)
    }

    fn build(pool: Arc<PvPool>, config: RuntimeConfig) -> Self {
        init_test_logging();
        let journal = Journal::new();
        let clock = Arc::new(ManualClock::starting_at(START_MS));
        let context = RuntimeContext::builder()
            .pool(pool)
            .clock(clock.clone())
            .config(config)
            .registry(Arc::new(probe_registry(&journal)))
            .build();
        Self {
            context,
            clock,
            journal,
        }
    }

    /// Display runtime over `model`, not yet started.
    #[must_use]
    pub fn display(&self, model: Arc<Widget>) -> DisplayRuntime {
        DisplayRuntime::new(self.context.clone(), model)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Leaf that journals its setup and teardown.
#[must_use]
pub fn probe(name: &str) -> Arc<Widget> {
    Widget::builder(PROBE).name(name).build()
}

/// Container that journals its own setup and teardown around its children.
#[must_use]
pub fn probe_group(name: &str, children: Vec<Arc<Widget>>) -> Arc<Widget> {
    children
        .into_iter()
        .fold(Widget::builder(PROBE_GROUP).name(name).container(), |b, c| b.child(c))
        .build()
}

/// Leaf whose runtime panics on start and stop.
#[must_use]
pub fn faulty(name: &str) -> Arc<Widget> {
    Widget::builder(FAULTY).name(name).build()
}

/// Leaf whose runtime reports an error from start.
#[must_use]
pub fn failing(name: &str) -> Arc<Widget> {
    Widget::builder(FAILING).name(name).build()
}

/// Plain group container.
#[must_use]
pub fn group(name: &str, children: Vec<Arc<Widget>>) -> Arc<Widget> {
    children
        .into_iter()
        .fold(Widget::builder(kinds::GROUP).name(name).container(), |b, c| b.child(c))
        .build()
}

/// Text update bound to `pv`, with connection signals.
#[must_use]
pub fn text_update(name: &str, pv: &str) -> Arc<Widget> {
    Widget::builder("textupdate")
        .name(name)
        .with(PV_NAME, pv.to_owned())
        .with(PV_VALUE, PvValue::Disconnected)
        .with(CONNECTED, false)
        .with(PV_WRITABLE, false)
        .build()
}

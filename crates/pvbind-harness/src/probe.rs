//! Runtime kinds for lifecycle tests.
//!
//! | Kind | Capabilities | Journal entries |
//! |------|--------------|-----------------|
//! | `probe` | [`ProbeCapability`] | `{name}-setup`, `{name}-teardown` |
//! | `probe-group` | probe, then children | as `probe` |
//! | `faulty` | [`FaultyCapability`] panicking on start and stop | `{name}-start-attempt`, `{name}-stop-attempt` |
//! | `failing` | [`FaultyCapability`] returning an error from start | `{name}-start-attempt`, `{name}-teardown` |

use pvbind_core::Widget;
use pvbind_runtime::{
    ChildrenCapability, Result, RuntimeCapability, RuntimeError, RuntimeRegistry, RuntimeScope,
    boxed,
};

use crate::journal::Journal;

pub const PROBE: &str = "probe";
pub const PROBE_GROUP: &str = "probe-group";
pub const FAULTY: &str = "faulty";
pub const FAILING: &str = "failing";

/// Records setup and teardown of its widget.
pub struct ProbeCapability {
    journal: Journal,
}

impl ProbeCapability {
    #[must_use]
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl RuntimeCapability for ProbeCapability {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        self.journal.record(format!("{}-setup", scope.widget().name()));
        Ok(())
    }

    fn stop(&self, scope: &RuntimeScope) {
        self.journal.record(format!("{}-teardown", scope.widget().name()));
    }
}

/// How a [`FaultyCapability`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// Panic in both `start` and `stop`.
    Panic,
    /// Return an error from `start`; stop cleanly.
    Error,
}

/// A capability that fails on purpose.
pub struct FaultyCapability {
    journal: Journal,
    mode: FaultMode,
}

impl FaultyCapability {
    #[must_use]
    pub fn new(journal: Journal, mode: FaultMode) -> Self {
        Self { journal, mode }
    }
}

impl RuntimeCapability for FaultyCapability {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        let widget = scope.widget();
        self.journal.record(format!("{}-start-attempt", widget.name()));
        match self.mode {
            FaultMode::Panic => panic!("{} refuses to start", widget.name()),
            FaultMode::Error => Err(RuntimeError::Config(format!("{} is misconfigured", widget.name()))),
        }
    }

    fn stop(&self, scope: &RuntimeScope) {
        let widget = scope.widget();
        match self.mode {
            FaultMode::Panic => {
                self.journal.record(format!("{}-stop-attempt", widget.name()));
                panic!("{} refuses to stop", widget.name());
            }
            FaultMode::Error => self.journal.record(format!("{}-teardown", widget.name())),
        }
    }
}

/// Default registry plus the probe kinds, all writing to `journal`.
#[must_use]
pub fn probe_registry(journal: &Journal) -> RuntimeRegistry {
    let registry = RuntimeRegistry::with_defaults();
    let j = journal.clone();
    registry.register(PROBE, move |_: &Widget| vec![boxed(ProbeCapability::new(j.clone()))]);
    let j = journal.clone();
    registry.register(PROBE_GROUP, move |_: &Widget| {
        vec![
            boxed(ProbeCapability::new(j.clone())),
            boxed(ChildrenCapability::new()),
        ]
    });
    let j = journal.clone();
    registry.register(FAULTY, move |_: &Widget| {
        vec![boxed(FaultyCapability::new(j.clone(), FaultMode::Panic))]
    });
    let j = journal.clone();
    registry.register(FAILING, move |_: &Widget| {
        vec![boxed(FaultyCapability::new(j.clone(), FaultMode::Error))]
    });
    registry
}

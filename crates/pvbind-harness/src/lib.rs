#![forbid(unsafe_code)]

//! Test harness for pvbind.
//!
//! - [`Journal`]: ordered record of lifecycle events.
//! - [`probe`](mod@probe): runtime kinds that write to a journal (`probe`,
//!   `probe-group`) or fail on purpose (`faulty`, `failing`).
//! - [`LatentPv`] / [`LatentConnector`]: PVs whose writes only come back
//!   when flushed, to reproduce network round trips.
//! - [`Fixture`]: a runtime context with a manual clock and the probe kinds
//!   registered, plus widget builders.
//! - [`init_test_logging`]: `tracing` output routed to the test writer.

pub mod fixtures;
pub mod journal;
pub mod latent;
pub mod logging;
pub mod probe;

pub use fixtures::{Fixture, failing, faulty, group, probe, probe_group, text_update};
pub use journal::Journal;
pub use latent::{LatentConnector, LatentPv};
pub use logging::init_test_logging;
pub use probe::{FaultMode, FaultyCapability, ProbeCapability, probe_registry};

#![forbid(unsafe_code)]

//! pvbind public facade.
//!
//! Re-exports the widget model and PV layer from `pvbind-core` and, with the
//! default `runtime` feature, the binding engine from `pvbind-runtime`.
//!
//! ```ignore
//! use pvbind::prelude::*;
//!
//! let model = Widget::builder(kinds::DISPLAY)
//!     .child(
//!         Widget::builder("textupdate")
//!             .with(keys::PV_NAME, "loc://setpoint(1.5)".to_owned())
//!             .with(keys::PV_VALUE, PvValue::Disconnected)
//!             .build(),
//!     )
//!     .build();
//! let display = DisplayRuntime::new(RuntimeContext::default(), model);
//! display.start();
//! ```
//!
//! | Feature | Effect |
//! |---------|--------|
//! | `runtime` (default) | [`DisplayRuntime`] and everything it drives |
//! | `config` (default) | `RuntimeConfig::load` from TOML |
//! | `test-helpers` | `ManualClock` for deterministic timing |

pub use pvbind_core as core;
#[cfg(feature = "runtime")]
pub use pvbind_runtime as runtime;

pub use pvbind_core::{
    ActionInfo, Clock, ModelRef, Property, PropertyKey, PvConnector, PvError, PvHandle, PvPool,
    PvValue, SystemClock, Widget, WidgetId, keys, kinds,
};

#[cfg(feature = "runtime")]
pub use pvbind_runtime::{
    ArrayPvDispatcher, ConnectionTracker, DisplayRuntime, RuntimeAction, RuntimeCapability,
    RuntimeConfig, RuntimeContext, RuntimeError, RuntimeRegistry, RuntimeScope, RuntimeState,
    RuntimeView, WidgetRuntime,
};

/// Everything needed to build a model and run it.
pub mod prelude {
    pub use pvbind_core::{
        ModelRef, Property, PvHandle, PvPool, PvValue, Widget, WidgetId, keys, kinds,
    };

    #[cfg(feature = "runtime")]
    pub use pvbind_runtime::{
        DisplayRuntime, RuntimeCapability, RuntimeConfig, RuntimeContext, RuntimeRegistry,
        RuntimeScope, RuntimeState, WidgetRuntime,
    };
}

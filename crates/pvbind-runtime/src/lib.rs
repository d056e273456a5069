#![forbid(unsafe_code)]

//! Runtime binding engine for control-room displays.
//!
//! Walks a widget tree, starts one [`WidgetRuntime`] per widget, and keeps
//! widget properties synchronized with live process variables (PVs).
//!
//! # Architecture
//!
//! ```text
//! DisplayRuntime ── RuntimeRegistry ──> WidgetRuntime (per widget)
//!                                          ├─ ConnectionTracker
//!                                          ├─ primary NameBinding, write-action PVs
//!                                          └─ capabilities: children, array,
//!                                             embedded, image, plot
//! ```
//!
//! - [`ConnectionTracker`]: reference-counted PVs of one runtime and the
//!   widget's aggregate `connected` / `pv_writable` signals.
//! - [`binding`]: name-to-value bindings, including the crosshair binding
//!   with its feedback-suppression window and circular history buffers.
//! - [`ArrayPvDispatcher`]: splits an array PV into per-element local PVs.
//!
//! # Threading
//!
//! Nothing here spawns threads. PV callbacks run synchronously on the
//! communication layer's threads; they touch atomics, short mutex sections,
//! and property sets, and never block.
//!
//! # Example
//!
//! ```ignore
//! let context = RuntimeContext::builder().pool(pool).build();
//! let display = DisplayRuntime::new(context, model);
//! display.start();
//! // ...
//! display.stop();
//! ```

pub mod action;
pub mod binding;
pub mod capability;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod display;
pub mod error;
mod isolate;
pub mod registry;
pub mod tracker;
pub mod widget_runtime;

pub use action::RuntimeAction;
pub use binding::{
    BindingContext, BindingOptions, BindingValue, CircularBuffer, CrosshairBinding, Direction,
    HistoryBinding, IgnoreWindow, MarkerBinding, NameBinding, PvLink, RoiBinding, TraceBinding,
};
pub use capability::{
    ArrayCapability, ChildrenCapability, EmbeddedCapability, ImageCapability, PlotCapability,
    PlotMode,
};
pub use config::RuntimeConfig;
pub use context::{RuntimeContext, RuntimeContextBuilder, RuntimeView};
pub use dispatcher::{ArrayPvDispatcher, element_name};
pub use display::DisplayRuntime;
pub use error::{Result, RuntimeError};
pub use registry::{CapabilityFactory, RuntimeRegistry, boxed};
pub use tracker::ConnectionTracker;
pub use widget_runtime::{RuntimeCapability, RuntimeScope, RuntimeState, WidgetRuntime};

#![forbid(unsafe_code)]

//! Data model consumed by the pvbind runtime.
//!
//! This crate holds everything the binding engine treats as an external
//! collaborator, expressed as small Rust interfaces:
//!
//! - [`PvValue`]: the value a process variable (PV) delivers, including the
//!   [`PvValue::Disconnected`] marker.
//! - [`PvSource`] / [`PvHandle`] / [`PvListener`]: the handle abstraction of
//!   the communication layer.
//! - [`PvPool`]: an injectable, name de-duplicating pool with explicit
//!   acquire/release, plus built-in local (`loc://`) PVs.
//! - [`Property`] / [`PropertyBag`]: typed, thread-safe observable widget
//!   properties.
//! - [`Widget`] / [`Children`] / [`Tab`]: the hierarchical widget model.
//! - [`Clock`]: time source for soft deadlines.
//!
//! # Threading
//!
//! PV notifications arrive on threads owned by the communication layer.
//! Every type here is `Send + Sync`, and every listener callback runs
//! synchronously on the thread that triggered it. Callbacks must be short
//! and must not block.

pub mod action;
pub mod clock;
pub mod error;
pub mod keys;
pub mod local;
pub mod pool;
pub mod property;
pub mod pv;
pub mod value;
pub mod widget;

pub use action::ActionInfo;
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use error::PvError;
pub use local::{LOCAL_SCHEME, LocalConnector, LocalPv, local_base_name};
pub use pool::{PvConnector, PvPool};
pub use property::{AnyProperty, Property, PropertyBag, PropertyKey, PropertyValue, Subscription};
pub use pv::{ListenerId, PvHandle, PvListener, PvSource};
pub use value::PvValue;
pub use widget::{Children, ChildrenEvent, ModelRef, Tab, Widget, WidgetBuilder, WidgetId, kinds};

//! Well-known property keys.
//!
//! Widgets only carry the properties their kind declares; the runtime looks
//! them up by key and skips features whose properties are absent.

use crate::action::ActionInfo;
use crate::property::PropertyKey;
use crate::value::PvValue;
use crate::widget::ModelRef;

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

/// Name of the widget's primary PV.
pub const PV_NAME: PropertyKey<String> = PropertyKey::new("pv_name");
/// Runtime value of the primary PV.
pub const PV_VALUE: PropertyKey<PvValue> = PropertyKey::new("pv_value");
/// Aggregate: every tracked PV is connected.
pub const CONNECTED: PropertyKey<bool> = PropertyKey::new("connected");
/// Aggregate: PVs that need write access can be written.
pub const PV_WRITABLE: PropertyKey<bool> = PropertyKey::new("pv_writable");
/// Model actions.
pub const ACTIONS: PropertyKey<Vec<ActionInfo>> = PropertyKey::new("actions");
/// Whether a widget's toolbar is shown.
pub const SHOW_TOOLBAR: PropertyKey<bool> = PropertyKey::new("show_toolbar");

// ---------------------------------------------------------------------------
// Embedded display
// ---------------------------------------------------------------------------

/// Display model shown by an embedded widget.
pub const EMBEDDED_MODEL: PropertyKey<Option<ModelRef>> = PropertyKey::new("embedded_model");
/// Trigger counter bumped by the "Open Full View" action.
pub const OPEN_FULL_VIEW: PropertyKey<u64> = PropertyKey::new("open_full_view");

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// PV receiving cursor information.
pub const CURSOR_INFO_PV: PropertyKey<String> = PropertyKey::new("cursor_info_pv");
/// Cursor information produced by the widget.
pub const CURSOR_INFO: PropertyKey<PvValue> = PropertyKey::new("cursor_info");
/// PV holding the crosshair X position.
pub const CURSOR_X_PV: PropertyKey<String> = PropertyKey::new("x_pv");
/// PV holding the crosshair Y position.
pub const CURSOR_Y_PV: PropertyKey<String> = PropertyKey::new("y_pv");
/// Crosshair position, `None` while hidden.
pub const CROSSHAIR: PropertyKey<Option<[f64; 2]>> = PropertyKey::new("crosshair");
/// Trigger counter bumped by the "Configure" action.
pub const CONFIGURE: PropertyKey<u64> = PropertyKey::new("configure");

/// Structure holding regions of interest.
pub const ROIS: &str = "rois";
pub const ROI_X_PV: PropertyKey<String> = PropertyKey::new("x_pv");
pub const ROI_Y_PV: PropertyKey<String> = PropertyKey::new("y_pv");
pub const ROI_WIDTH_PV: PropertyKey<String> = PropertyKey::new("width_pv");
pub const ROI_HEIGHT_PV: PropertyKey<String> = PropertyKey::new("height_pv");
pub const ROI_X_VALUE: PropertyKey<f64> = PropertyKey::new("x_value");
pub const ROI_Y_VALUE: PropertyKey<f64> = PropertyKey::new("y_value");
pub const ROI_WIDTH_VALUE: PropertyKey<f64> = PropertyKey::new("width_value");
pub const ROI_HEIGHT_VALUE: PropertyKey<f64> = PropertyKey::new("height_value");

// ---------------------------------------------------------------------------
// Plots
// ---------------------------------------------------------------------------

/// Structure holding plot traces.
pub const TRACES: &str = "traces";
pub const TRACE_X_PV: PropertyKey<String> = PropertyKey::new("x_pv");
pub const TRACE_Y_PV: PropertyKey<String> = PropertyKey::new("y_pv");
pub const TRACE_X_VALUE: PropertyKey<PvValue> = PropertyKey::new("x_value");
pub const TRACE_Y_VALUE: PropertyKey<PvValue> = PropertyKey::new("y_value");
/// Samples kept by a history trace.
pub const BUFFER_SIZE: PropertyKey<usize> = PropertyKey::new("buffer_size");

/// Structure holding plot markers.
pub const MARKERS: &str = "markers";
pub const MARKER_PV: PropertyKey<String> = PropertyKey::new("pv_name");
pub const MARKER_VALUE: PropertyKey<f64> = PropertyKey::new("value");

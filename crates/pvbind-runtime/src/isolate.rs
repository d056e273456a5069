//! Per-widget fault isolation.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use pvbind_core::WidgetId;

use crate::error::{Result, RuntimeError};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Run `f`, turning a panic into [`RuntimeError::Panicked`].
pub(crate) fn isolate(
    widget: WidgetId,
    operation: &'static str,
    f: impl FnOnce() -> Result<()>,
) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(RuntimeError::Panicked {
            widget,
            operation,
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Like [`isolate`], but logs the failure at `warn` instead of returning it.
///
/// Returns whether `f` succeeded.
pub(crate) fn contain(widget: WidgetId, operation: &'static str, f: impl FnOnce() -> Result<()>) -> bool {
    match isolate(widget, operation, f) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%widget, operation, %err, "widget failure contained");
            false
        }
    }
}

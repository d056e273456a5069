//! One acquired, tracked, and listened-to PV.

use std::sync::Arc;

use parking_lot::Mutex;
use pvbind_core::{ListenerId, PvHandle, PvListener};

use super::BindingContext;
use crate::error::RuntimeError;

/// A PV acquired from the pool, registered with the runtime's tracker, and
/// optionally observed by a listener.
///
/// [`close`](Self::close) undoes all three in reverse order.
#[derive(Debug)]
pub struct PvLink {
    handle: PvHandle,
    listener: Option<ListenerId>,
}

impl PvLink {
    /// Acquire `name` and wire it up.
    ///
    /// # Errors
    ///
    /// Propagates the pool's acquisition error; nothing is held afterwards.
    pub fn open(
        cx: &BindingContext,
        name: &str,
        needs_write_access: bool,
        listener: Option<Arc<dyn PvListener>>,
    ) -> Result<Self, RuntimeError> {
        let handle = cx.pool.acquire(name)?;
        cx.tracker.add_pv(&handle, needs_write_access);
        let listener = listener.map(|listener| handle.add_listener(listener));
        tracing::debug!(owner = %cx.label, pv = %handle, "bound PV");
        Ok(Self { handle, listener })
    }

    /// The acquired handle.
    #[must_use]
    pub fn handle(&self) -> &PvHandle {
        &self.handle
    }

    /// Remove the listener, untrack, and release.
    pub fn close(self, cx: &BindingContext) {
        if let Some(id) = self.listener {
            self.handle.remove_listener(id);
        }
        if let Err(err) = cx.tracker.remove_pv(&self.handle) {
            tracing::error!(owner = %cx.label, pv = %self.handle, %err, "tracker lost PV");
        }
        if let Err(err) = cx.pool.release(&self.handle) {
            tracing::error!(owner = %cx.label, pv = %self.handle, %err, "pool release failed");
        }
        tracing::debug!(owner = %cx.label, pv = %self.handle, "unbound PV");
    }
}

/// Slot holding at most one [`PvLink`], swapped as a name property changes.
#[derive(Debug, Default)]
pub(crate) struct LinkSlot {
    link: Mutex<Option<PvLink>>,
}

impl LinkSlot {
    /// Store `link`, closing the one it replaces.
    pub(crate) fn replace(&self, cx: &BindingContext, link: Option<PvLink>) {
        let old = std::mem::replace(&mut *self.link.lock(), link);
        if let Some(old) = old {
            old.close(cx);
        }
    }

    /// Close the current link, if any.
    pub(crate) fn clear(&self, cx: &BindingContext) {
        self.replace(cx, None);
    }

    /// Handle of the current link.
    pub(crate) fn handle(&self) -> Option<PvHandle> {
        self.link.lock().as_ref().map(|link| link.handle.clone())
    }
}

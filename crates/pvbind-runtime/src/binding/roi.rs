//! Region-of-interest bindings.

use pvbind_core::PropertyBag;
use pvbind_core::keys::{
    ROI_HEIGHT_PV, ROI_HEIGHT_VALUE, ROI_WIDTH_PV, ROI_WIDTH_VALUE, ROI_X_PV, ROI_X_VALUE,
    ROI_Y_PV, ROI_Y_VALUE,
};

use super::{BindingContext, BindingOptions, NameBinding};

/// Binds the x, y, width, and height of one region of interest.
///
/// Each coordinate is a bidirectional `NameBinding<f64>`. Failed writes are
/// not rolled back: the region stays where the user dragged it.
pub struct RoiBinding {
    bindings: Vec<NameBinding<f64>>,
}

impl RoiBinding {
    /// Bind every coordinate of `roi` that has both a name and a value
    /// property and a non-empty PV name. Other coordinates keep their
    /// static value.
    #[must_use]
    pub fn new(cx: &BindingContext, roi: &PropertyBag) -> Self {
        let options = BindingOptions::read_write().with_rollback(false);
        let bindings = [
            (ROI_X_PV, ROI_X_VALUE),
            (ROI_Y_PV, ROI_Y_VALUE),
            (ROI_WIDTH_PV, ROI_WIDTH_VALUE),
            (ROI_HEIGHT_PV, ROI_HEIGHT_VALUE),
        ]
        .into_iter()
        .filter_map(|(name_key, value_key)| {
            let name = roi.get(name_key)?;
            if name.with(|n| n.trim().is_empty()) {
                return None;
            }
            let value = roi.get(value_key)?;
            Some(NameBinding::new(cx.clone(), name, value, options))
        })
        .collect();
        Self { bindings }
    }

    /// Number of bound coordinates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Dispose every coordinate binding. Idempotent.
    pub fn dispose(&self) {
        for binding in &self.bindings {
            binding.dispose();
        }
    }
}

//! Image-like widgets: cursor info, crosshair, and regions of interest.

use parking_lot::Mutex;
use pvbind_core::PvValue;
use pvbind_core::keys::{
    CONFIGURE, CROSSHAIR, CURSOR_INFO, CURSOR_INFO_PV, CURSOR_X_PV, CURSOR_Y_PV, ROIS, SHOW_TOOLBAR,
};

use crate::action::{RuntimeAction, icons};
use crate::binding::{BindingOptions, CrosshairBinding, NameBinding, RoiBinding};
use crate::error::Result;
use crate::widget_runtime::{RuntimeCapability, RuntimeScope};

#[derive(Default)]
struct ImageBindings {
    cursor_info: Option<NameBinding<PvValue>>,
    crosshair: Option<CrosshairBinding>,
    rois: Vec<RoiBinding>,
}

/// Bindings of an image widget.
///
/// - `cursor_info_pv`: cursor readouts written as they change, never read
///   back or rolled back.
/// - `x_pv`/`y_pv`: crosshair position, both ways, with feedback
///   suppression.
/// - `rois`: four bidirectional bindings per region.
#[derive(Default)]
pub struct ImageCapability {
    bindings: Mutex<Option<ImageBindings>>,
}

impl ImageCapability {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of regions of interest bound.
    #[must_use]
    pub fn roi_count(&self) -> usize {
        self.bindings.lock().as_ref().map_or(0, |b| b.rois.len())
    }
}

impl RuntimeCapability for ImageCapability {
    fn name(&self) -> &'static str {
        "image"
    }

    fn actions(&self, scope: &RuntimeScope) -> Vec<RuntimeAction> {
        let widget = scope.widget();
        let mut actions = Vec::with_capacity(2);
        if let Some(trigger) = widget.property(CONFIGURE) {
            actions.push(RuntimeAction::pulse("Configure", icons::CONFIGURE, trigger));
        }
        if let Some(toolbar) = widget.property(SHOW_TOOLBAR) {
            actions.push(RuntimeAction::toggle("Toggle Toolbar", icons::TOOLBAR, toolbar));
        }
        actions
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        let widget = scope.widget();
        let cx = scope.binding();
        let mut bindings = ImageBindings::default();

        if let (Some(name), Some(value)) = (widget.property(CURSOR_INFO_PV), widget.property(CURSOR_INFO)) {
            bindings.cursor_info = Some(NameBinding::new(
                cx.clone(),
                name,
                value,
                BindingOptions::write_only(),
            ));
        }

        if let Some(crosshair) = widget.property(CROSSHAIR) {
            let x = widget.property(CURSOR_X_PV).map(|p| p.get()).unwrap_or_default();
            let y = widget.property(CURSOR_Y_PV).map(|p| p.get()).unwrap_or_default();
            if !x.trim().is_empty() || !y.trim().is_empty() {
                bindings.crosshair = Some(CrosshairBinding::new(cx.clone(), &x, &y, crosshair));
            }
        }

        bindings.rois = widget
            .structure(ROIS)
            .iter()
            .map(|roi| RoiBinding::new(cx, roi))
            .collect();

        *self.bindings.lock() = Some(bindings);
        Ok(())
    }

    fn stop(&self, _scope: &RuntimeScope) {
        let Some(bindings) = self.bindings.lock().take() else {
            return;
        };
        for roi in &bindings.rois {
            roi.dispose();
        }
        if let Some(crosshair) = &bindings.crosshair {
            crosshair.dispose();
        }
        if let Some(cursor_info) = &bindings.cursor_info {
            cursor_info.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use pvbind_core::keys::{ROI_HEIGHT_PV, ROI_HEIGHT_VALUE, ROI_X_PV, ROI_X_VALUE};
    use pvbind_core::{PropertyBag, PvSource, Widget, kinds};

    #[test]
    fn image_binds_everything_and_releases_on_stop() {
        let cx = RuntimeContext::default();
        let roi = PropertyBag::new()
            .with(ROI_X_PV, "loc://roi_x(10)".to_owned())
            .with(ROI_X_VALUE, f64::NAN)
            .with(ROI_HEIGHT_PV, "loc://roi_h(20)".to_owned())
            .with(ROI_HEIGHT_VALUE, f64::NAN);
        let widget = Widget::builder(kinds::IMAGE)
            .with(CURSOR_INFO_PV, "loc://cursor".to_owned())
            .with(CURSOR_INFO, PvValue::Disconnected)
            .with(CURSOR_X_PV, "loc://cx(1)".to_owned())
            .with(CURSOR_Y_PV, "loc://cy(2)".to_owned())
            .with(CROSSHAIR, None)
            .with(CONFIGURE, 0)
            .with(SHOW_TOOLBAR, true)
            .structure(ROIS, vec![roi])
            .build();
        let runtime = cx.registry().create(&cx, widget.clone());
        runtime.initialize().expect("initialize");
        let labels: Vec<String> = runtime.runtime_actions().iter().map(|a| a.label().to_owned()).collect();
        assert_eq!(labels, vec!["Configure".to_owned(), "Toggle Toolbar".to_owned()]);
        runtime.start().expect("start");

        assert_eq!(widget.structure(ROIS)[0].get(ROI_X_VALUE).expect("x").get(), 10.0);
        assert_eq!(widget.property(CROSSHAIR).expect("crosshair").get(), Some([1.0, 2.0]));

        widget
            .property(CURSOR_INFO)
            .expect("cursor info")
            .set(PvValue::doubles(vec![3.0, 4.0, 99.0]));
        let cursor = cx.pool().local().get("loc://cursor").expect("cursor");
        assert_eq!(cursor.read(), PvValue::doubles(vec![3.0, 4.0, 99.0]));

        assert_eq!(cx.pool().len(), 5);
        runtime.stop().expect("stop");
        assert!(cx.pool().is_empty());
    }
}

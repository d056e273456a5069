//! Plot widgets: traces and markers.

use parking_lot::Mutex;
use pvbind_core::keys::{MARKERS, SHOW_TOOLBAR, TRACES};

use crate::action::{RuntimeAction, icons};
use crate::binding::{MarkerBinding, TraceBinding};
use crate::error::Result;
use crate::widget_runtime::{RuntimeCapability, RuntimeScope};

/// How trace Y data is gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMode {
    /// Latest waveform of each PV (X/Y plots).
    Sampled,
    /// Scalar samples accumulated over time (strip charts).
    History,
}

#[derive(Default)]
struct PlotBindings {
    traces: Vec<TraceBinding>,
    markers: Vec<MarkerBinding>,
}

/// Binds every trace and marker of a plot.
pub struct PlotCapability {
    mode: PlotMode,
    bindings: Mutex<PlotBindings>,
}

impl PlotCapability {
    #[must_use]
    pub fn new(mode: PlotMode) -> Self {
        Self {
            mode,
            bindings: Mutex::new(PlotBindings::default()),
        }
    }

    #[must_use]
    pub fn mode(&self) -> PlotMode {
        self.mode
    }
}

impl RuntimeCapability for PlotCapability {
    fn name(&self) -> &'static str {
        match self.mode {
            PlotMode::Sampled => "plot",
            PlotMode::History => "history-plot",
        }
    }

    fn actions(&self, scope: &RuntimeScope) -> Vec<RuntimeAction> {
        scope
            .widget()
            .property(SHOW_TOOLBAR)
            .map(|toolbar| RuntimeAction::toggle("Toggle Toolbar", icons::TOOLBAR, toolbar))
            .into_iter()
            .collect()
    }

    fn start(&self, scope: &RuntimeScope) -> Result<()> {
        let widget = scope.widget();
        let cx = scope.binding();
        let traces = widget
            .structure(TRACES)
            .iter()
            .map(|trace| match self.mode {
                PlotMode::Sampled => TraceBinding::sampled(cx, trace),
                PlotMode::History => TraceBinding::history(cx, trace),
            })
            .collect();
        let markers = widget
            .structure(MARKERS)
            .iter()
            .filter_map(|marker| MarkerBinding::new(cx, marker))
            .collect();
        *self.bindings.lock() = PlotBindings { traces, markers };
        Ok(())
    }

    fn stop(&self, _scope: &RuntimeScope) {
        let bindings = std::mem::take(&mut *self.bindings.lock());
        for marker in &bindings.markers {
            marker.dispose();
        }
        for trace in &bindings.traces {
            trace.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use pvbind_core::keys::{BUFFER_SIZE, MARKER_PV, MARKER_VALUE, TRACE_Y_PV, TRACE_Y_VALUE};
    use pvbind_core::{PropertyBag, PvSource, PvValue, Widget, kinds};

    fn trace(pv: &str) -> PropertyBag {
        PropertyBag::new()
            .with(TRACE_Y_PV, pv.to_owned())
            .with(TRACE_Y_VALUE, PvValue::Disconnected)
            .with(BUFFER_SIZE, 2)
    }

    #[test]
    fn strip_chart_accumulates_history() {
        let cx = RuntimeContext::default();
        let trace = trace("loc://level(1)");
        let widget = Widget::builder(kinds::STRIP_CHART)
            .structure(TRACES, vec![trace])
            .build();
        let runtime = cx.registry().create(&cx, widget.clone());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        let level = cx.pool().local().get("loc://level").expect("level");
        level.post(PvValue::Double(2.0));
        level.post(PvValue::Double(3.0));
        assert_eq!(
            widget.structure(TRACES)[0].get(TRACE_Y_VALUE).expect("y").get(),
            PvValue::doubles(vec![2.0, 3.0])
        );
        runtime.stop().expect("stop");
        assert!(cx.pool().is_empty());
    }

    #[test]
    fn xy_plot_binds_markers_both_ways() {
        let cx = RuntimeContext::default();
        let marker = PropertyBag::new()
            .with(MARKER_PV, "loc://mark(5)".to_owned())
            .with(MARKER_VALUE, 0.0);
        let widget = Widget::builder(kinds::XY_PLOT)
            .with(SHOW_TOOLBAR, false)
            .structure(TRACES, vec![trace("loc://wave(1, 2)")])
            .structure(MARKERS, vec![marker])
            .build();
        let runtime = cx.registry().create(&cx, widget.clone());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        assert_eq!(runtime.runtime_actions().len(), 1);

        let value = widget.structure(MARKERS)[0].get(MARKER_VALUE).expect("value");
        assert_eq!(value.get(), 5.0);
        value.set(6.5);
        let mark = cx.pool().local().get("loc://mark").expect("mark");
        assert_eq!(mark.read(), PvValue::Double(6.5));
        runtime.stop().expect("stop");
    }
}

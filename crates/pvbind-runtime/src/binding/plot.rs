//! Plot trace and marker bindings.

use pvbind_core::keys::{
    BUFFER_SIZE, MARKER_PV, MARKER_VALUE, TRACE_X_PV, TRACE_X_VALUE, TRACE_Y_PV, TRACE_Y_VALUE,
};
use pvbind_core::{PropertyBag, PvHandle, PvValue};

use super::{BindingContext, BindingOptions, HistoryBinding, NameBinding};

enum Axis {
    Sampled(NameBinding<PvValue>),
    History(HistoryBinding),
}

impl Axis {
    fn pv(&self) -> Option<PvHandle> {
        match self {
            Self::Sampled(binding) => binding.pv(),
            Self::History(binding) => binding.pv(),
        }
    }

    fn dispose(&self) {
        match self {
            Self::Sampled(binding) => binding.dispose(),
            Self::History(binding) => binding.dispose(),
        }
    }
}

/// X and Y data of one plot trace.
///
/// A sampled trace shows the PVs' latest waveforms; a history trace
/// accumulates scalar samples, sized by the trace's `buffer_size` property
/// or the configured default.
pub struct TraceBinding {
    axes: Vec<Axis>,
}

impl TraceBinding {
    /// Read-only bindings of the latest X and Y values.
    #[must_use]
    pub fn sampled(cx: &BindingContext, trace: &PropertyBag) -> Self {
        let axes = [(TRACE_X_PV, TRACE_X_VALUE), (TRACE_Y_PV, TRACE_Y_VALUE)]
            .into_iter()
            .filter_map(|(name_key, value_key)| {
                let name = trace.get(name_key)?;
                let value = trace.get(value_key)?;
                Some(Axis::Sampled(NameBinding::new(
                    cx.clone(),
                    name,
                    value,
                    BindingOptions::read_only(),
                )))
            })
            .collect();
        Self { axes }
    }

    /// History of the Y PV.
    #[must_use]
    pub fn history(cx: &BindingContext, trace: &PropertyBag) -> Self {
        let capacity = trace
            .get(BUFFER_SIZE)
            .map_or_else(|| cx.config.history_capacity(), |size| size.get());
        let axes = match (trace.get(TRACE_Y_PV), trace.get(TRACE_Y_VALUE)) {
            (Some(name), Some(value)) => vec![Axis::History(HistoryBinding::new(
                cx.clone(),
                name,
                value,
                capacity,
            ))],
            _ => Vec::new(),
        };
        Self { axes }
    }

    /// Bound PVs.
    #[must_use]
    pub fn pvs(&self) -> Vec<PvHandle> {
        self.axes.iter().filter_map(Axis::pv).collect()
    }

    /// Idempotent.
    pub fn dispose(&self) {
        for axis in &self.axes {
            axis.dispose();
        }
    }
}

/// A plot marker whose position is bound to a PV in both directions.
pub struct MarkerBinding {
    binding: NameBinding<f64>,
}

impl MarkerBinding {
    /// `None` when the marker lacks a name or value property.
    #[must_use]
    pub fn new(cx: &BindingContext, marker: &PropertyBag) -> Option<Self> {
        let name = marker.get(MARKER_PV)?;
        let value = marker.get(MARKER_VALUE)?;
        Some(Self {
            binding: NameBinding::new(cx.clone(), name, value, BindingOptions::read_write()),
        })
    }

    #[must_use]
    pub fn pv(&self) -> Option<PvHandle> {
        self.binding.pv()
    }

    /// Idempotent.
    pub fn dispose(&self) {
        self.binding.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::test_support::context;

    fn trace(y: &str) -> PropertyBag {
        PropertyBag::new()
            .with(TRACE_X_PV, String::new())
            .with(TRACE_X_VALUE, PvValue::Disconnected)
            .with(TRACE_Y_PV, y.to_owned())
            .with(TRACE_Y_VALUE, PvValue::Disconnected)
    }

    #[test]
    fn sampled_trace_shows_latest_waveform() {
        let (cx, _) = context();
        let trace = trace("loc://wave(1, 2, 3)");
        let binding = TraceBinding::sampled(&cx, &trace);
        assert_eq!(binding.pvs().len(), 1);
        assert_eq!(
            trace.get(TRACE_Y_VALUE).expect("y").get(),
            PvValue::doubles(vec![1.0, 2.0, 3.0])
        );
        assert!(trace.get(TRACE_X_VALUE).expect("x").get().is_disconnected());
    }

    #[test]
    fn history_trace_uses_buffer_size() {
        let (cx, _) = context();
        let trace = trace("loc://scalar(1)").with(BUFFER_SIZE, 2);
        let _binding = TraceBinding::history(&cx, &trace);
        let pv = cx.pool.local().get("loc://scalar").expect("pv");
        pv.post(PvValue::Double(2.0));
        pv.post(PvValue::Double(3.0));
        assert_eq!(
            trace.get(TRACE_Y_VALUE).expect("y").get(),
            PvValue::doubles(vec![2.0, 3.0])
        );
    }

    #[test]
    fn marker_rolls_back_failed_move() {
        let (cx, _) = context();
        let marker = PropertyBag::new()
            .with(MARKER_PV, "loc://marker(4)".to_owned())
            .with(MARKER_VALUE, 0.0);
        let binding = MarkerBinding::new(&cx, &marker).expect("marker");
        let value = marker.get(MARKER_VALUE).expect("value");
        assert_eq!(value.get(), 4.0);
        cx.pool.local().get("loc://marker").expect("pv").set_readonly(true);
        value.set(8.0);
        assert_eq!(value.get(), 4.0);
        binding.dispose();
        assert!(cx.pool.is_empty());
    }
}

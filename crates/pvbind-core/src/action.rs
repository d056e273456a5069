//! Actions declared in the widget model.

/// A model-level action attached to a widget.
///
/// The runtime only cares about actions that touch PVs; the rest of the
/// action catalogue belongs to the editor and the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActionInfo {
    /// Write `value` to `pv_name` when triggered.
    WritePv {
        pv_name: String,
        value: String,
        description: String,
    },
    /// Open another display. Ignored by the runtime.
    OpenDisplay { file: String, description: String },
}

impl ActionInfo {
    /// Convenience constructor for a write action.
    #[must_use]
    pub fn write_pv(pv_name: impl Into<String>, value: impl Into<String>) -> Self {
        let pv_name = pv_name.into();
        let value = value.into();
        let description = format!("Write {pv_name} = {value}");
        Self::WritePv {
            pv_name,
            value,
            description,
        }
    }

    /// PV written by this action, if any.
    #[must_use]
    pub fn pv_name(&self) -> Option<&str> {
        match self {
            Self::WritePv { pv_name, .. } => Some(pv_name),
            Self::OpenDisplay { .. } => None,
        }
    }

    /// Text shown in menus.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::WritePv { description, .. } | Self::OpenDisplay { description, .. } => {
                description
            }
        }
    }
}

//! Runtime actions: commands a live widget offers to the UI layer.

use std::fmt;
use std::sync::Arc;

use pvbind_core::Property;

/// Icon identifiers understood by the host's menu renderer.
pub mod icons {
    pub const TOOLBAR: &str = "toolbar";
    pub const CONFIGURE: &str = "configure";
    pub const OPEN_FULL_VIEW: &str = "open_full_view";
    pub const WRITE_PV: &str = "write_pv";
}

type Command = Arc<dyn Fn() + Send + Sync>;

/// A named, iconified, invocable command.
#[derive(Clone)]
pub struct RuntimeAction {
    label: String,
    icon: &'static str,
    command: Command,
}

impl RuntimeAction {
    #[must_use]
    pub fn new(label: impl Into<String>, icon: &'static str, command: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            icon,
            command: Arc::new(command),
        }
    }

    /// Flip a boolean property, e.g. "Toggle Toolbar".
    #[must_use]
    pub fn toggle(label: impl Into<String>, icon: &'static str, property: Property<bool>) -> Self {
        Self::new(label, icon, move || {
            let current = property.get();
            property.set(!current);
        })
    }

    /// Bump a trigger counter observed by the host, e.g. "Open Full View".
    #[must_use]
    pub fn pulse(label: impl Into<String>, icon: &'static str, trigger: Property<u64>) -> Self {
        Self::new(label, icon, move || {
            let next = trigger.get().wrapping_add(1);
            trigger.set(next);
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn icon(&self) -> &'static str {
        self.icon
    }

    pub fn invoke(&self) {
        tracing::debug!(action = self.label, "runtime action invoked");
        (self.command)();
    }
}

impl fmt::Debug for RuntimeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeAction")
            .field("label", &self.label)
            .field("icon", &self.icon)
            .finish_non_exhaustive()
    }
}

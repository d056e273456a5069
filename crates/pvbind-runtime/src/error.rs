//! Runtime errors.

use pvbind_core::{PvError, WidgetId};

/// Errors raised by widget runtimes and the connection tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A PV operation failed.
    Pv(PvError),
    /// `write_pv` named a PV the widget does not use.
    UnknownPv { widget: WidgetId, name: String },
    /// Lifecycle method called in the wrong state.
    InvalidTransition {
        widget: WidgetId,
        state: &'static str,
        operation: &'static str,
    },
    /// `remove_pv` for a handle the tracker does not hold.
    UntrackedPv { name: String },
    /// The widget has no primary PV to write.
    NoPrimaryPv { widget: WidgetId },
    /// A runtime panicked inside a lifecycle method.
    Panicked {
        widget: WidgetId,
        operation: &'static str,
        message: String,
    },
    /// Configuration could not be loaded.
    Config(String),
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pv(err) => write!(f, "{err}"),
            Self::UnknownPv { widget, name } => {
                write!(f, "widget {widget} does not use PV '{name}'")
            }
            Self::InvalidTransition {
                widget,
                state,
                operation,
            } => write!(f, "cannot {operation} widget {widget} while {state}"),
            Self::UntrackedPv { name } => write!(f, "PV '{name}' is not tracked"),
            Self::NoPrimaryPv { widget } => write!(f, "widget {widget} has no primary PV"),
            Self::Panicked {
                widget,
                operation,
                message,
            } => write!(f, "widget {widget} panicked during {operation}: {message}"),
            Self::Config(msg) => write!(f, "invalid runtime configuration: {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PvError> for RuntimeError {
    fn from(err: PvError) -> Self {
        Self::Pv(err)
    }
}

/// Result alias for runtime operations.
pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;

//! Errors reported by the PV layer.

/// Errors from PV acquisition, release, and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PvError {
    /// The name is empty or cannot be resolved by any connector.
    Unresolvable { name: String },
    /// The PV refuses writes.
    ReadOnly { name: String },
    /// The PV accepted the request but rejected the value.
    WriteRejected { name: String, reason: String },
    /// The PV is not connected.
    Disconnected { name: String },
    /// The value does not fit the PV's type.
    TypeMismatch { name: String, expected: &'static str },
    /// The handle was released more often than it was acquired.
    NotAcquired { name: String },
    /// The pool was drained and accepts no more requests.
    PoolClosed,
}

impl std::fmt::Display for PvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolvable { name } => write!(f, "cannot resolve PV '{name}'"),
            Self::ReadOnly { name } => write!(f, "PV '{name}' is read-only"),
            Self::WriteRejected { name, reason } => {
                write!(f, "PV '{name}' rejected write: {reason}")
            }
            Self::Disconnected { name } => write!(f, "PV '{name}' is disconnected"),
            Self::TypeMismatch { name, expected } => {
                write!(f, "PV '{name}' expects {expected}")
            }
            Self::NotAcquired { name } => write!(f, "PV '{name}' is not held by the pool"),
            Self::PoolClosed => write!(f, "PV pool is closed"),
        }
    }
}

impl std::error::Error for PvError {}

impl PvError {
    /// Name of the PV involved, if any.
    #[must_use]
    pub fn pv_name(&self) -> Option<&str> {
        match self {
            Self::Unresolvable { name }
            | Self::ReadOnly { name }
            | Self::WriteRejected { name, .. }
            | Self::Disconnected { name }
            | Self::TypeMismatch { name, .. }
            | Self::NotAcquired { name } => Some(name),
            Self::PoolClosed => None,
        }
    }
}

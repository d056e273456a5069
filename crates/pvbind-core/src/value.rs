//! Values delivered by process variables.
//!
//! # Invariants
//!
//! 1. [`PvValue::Disconnected`] is the one "no data" marker. It is never
//!    produced by a connected PV.
//! 2. [`PvValue::same_as`] compares floating point data by bit pattern, so
//!    `NaN` equals an identical `NaN` and `0.0` differs from `-0.0`. This is
//!    the equality bindings use to decide whether a write is needed.
//! 3. Scalars count as one-element arrays for [`PvValue::element_count`].

use std::fmt;
use std::sync::Arc;

/// A value read from or written to a PV.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PvValue {
    /// No value: the PV is disconnected or was never connected.
    #[default]
    Disconnected,
    /// Floating point scalar.
    Double(f64),
    /// Integer scalar.
    Long(i64),
    /// Index into a set of enumerated labels.
    Enum(i32),
    /// Text scalar.
    Text(String),
    /// Waveform of numbers.
    DoubleArray(Arc<[f64]>),
    /// Waveform of strings.
    TextArray(Arc<[String]>),
}

impl PvValue {
    /// Build a numeric waveform.
    #[must_use]
    pub fn doubles(values: impl Into<Arc<[f64]>>) -> Self {
        Self::DoubleArray(values.into())
    }

    /// Build a text waveform.
    #[must_use]
    pub fn texts<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::TextArray(values.into_iter().map(Into::into).collect())
    }

    /// Whether this is the disconnected marker.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Whether this value is a scalar (not an array, not disconnected).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Double(_) | Self::Long(_) | Self::Enum(_) | Self::Text(_)
        )
    }

    /// Numeric interpretation of the value.
    ///
    /// Arrays yield their first element. Text is parsed when it holds a
    /// number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Long(v) => Some(*v as f64),
            Self::Enum(v) => Some(f64::from(*v)),
            Self::Text(s) => s.trim().parse().ok(),
            Self::DoubleArray(values) => values.first().copied(),
            Self::TextArray(values) => values.first().and_then(|s| s.trim().parse().ok()),
            Self::Disconnected => None,
        }
    }

    /// Text interpretation of the value, as shown by a text-update widget.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Disconnected => String::new(),
            other => other.to_string(),
        }
    }

    /// Number of elements; scalars have one, disconnected values none.
    #[must_use]
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Self::Disconnected => None,
            Self::DoubleArray(values) => Some(values.len()),
            Self::TextArray(values) => Some(values.len()),
            _ => Some(1),
        }
    }

    /// Bit-for-bit / numeric equality.
    ///
    /// Numeric scalars of different representation compare by value
    /// (`Long(3)` is the same as `Double(3.0)`).
    #[must_use]
    pub fn same_as(&self, other: &PvValue) -> bool {
        match (self, other) {
            (Self::Disconnected, Self::Disconnected) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::TextArray(a), Self::TextArray(b)) => a == b,
            (Self::DoubleArray(a), Self::DoubleArray(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (a, b) if a.is_numeric_scalar() && b.is_numeric_scalar() => {
                match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.to_bits() == y.to_bits(),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn is_numeric_scalar(&self) -> bool {
        matches!(self, Self::Double(_) | Self::Long(_) | Self::Enum(_))
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "<disconnected>"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Enum(v) => write!(f, "enum[{v}]"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::DoubleArray(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Self::TextArray(values) => write!(f, "{values:?}"),
        }
    }
}

impl From<f64> for PvValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i64> for PvValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<&str> for PvValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for PvValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<f64>> for PvValue {
    fn from(values: Vec<f64>) -> Self {
        Self::DoubleArray(values.into())
    }
}

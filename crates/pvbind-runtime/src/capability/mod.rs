//! Building blocks of widget runtimes.
//!
//! | Capability | Widget kinds |
//! |------------|--------------|
//! | [`ChildrenCapability`] | display, group, tabs, array, any other container |
//! | [`ArrayCapability`] | array |
//! | [`EmbeddedCapability`] | embedded |
//! | [`ImageCapability`] | image |
//! | [`PlotCapability`] | xyplot ([`PlotMode::Sampled`]), stripchart ([`PlotMode::History`]) |

mod array;
mod children;
mod embedded;
mod image;
mod plot;

pub use array::ArrayCapability;
pub use children::ChildrenCapability;
pub use embedded::EmbeddedCapability;
pub use image::ImageCapability;
pub use plot::{PlotCapability, PlotMode};

//! Utility types shared by the builder and the cache.
//!
//! - [`BBox`] - Axis-aligned bounding box
//! - [`Error`] / [`Result`] - Error handling
//! - Math type re-exports from glam

mod error;
mod math;

pub use error::*;
pub use math::*;

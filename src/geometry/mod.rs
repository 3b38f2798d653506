//! Geometry primitives for support generation.
//!
//! All planar geometry uses scaled integer coordinates (micrometers) to avoid
//! floating-point robustness issues in the Boolean operations.

mod bounding_box;
mod expolygon;
mod point;
mod polygon;
pub mod polygon_utils;

pub use bounding_box::BoundingBox;
pub use expolygon::{ExPolygon, ExPolygons};
pub use point::Point;
pub use polygon::Polygon;

//! Tree-shaped support structure generation for fused-filament 3D printing.
//!
//! Given the sliced layer outlines of one or more models, this crate grows a
//! branching scaffold underneath every overhanging feature. Branches descend
//! layer by layer, drift towards each other and merge, avoid the model, and
//! land either on the build plate or on the model itself. The output is a set
//! of 2D support polygons per layer, ready for infill and tool-path
//! generation downstream.
//!
//! The pipeline has three stages:
//!
//! 1. [`support::ModelVolumes`] — cached collision / avoidance / internal
//!    keep-out fields per (branch radius, layer).
//! 2. Contact seeding — initial support points on overhang regions.
//! 3. The dropper — layer-by-layer downward propagation of the node forest,
//!    followed by rasterization of the surviving branches into polygons.
//!
//! Entry point: [`support::TreeSupport::generate_support_areas`].

pub mod clipper;
pub mod config;
pub mod geometry;
pub mod storage;
pub mod support;

/// Scaled integer coordinate. One unit is one micrometer.
pub type Coord = i64;

/// Floating-point coordinate in millimeters.
pub type CoordF = f64;

/// Number of scaled units per millimeter.
pub const SCALING_FACTOR: CoordF = 1000.0;

/// Convert millimeters to scaled integer units.
#[inline]
pub fn scale(mm: CoordF) -> Coord {
    (mm * SCALING_FACTOR).round() as Coord
}

/// Convert scaled integer units back to millimeters.
#[inline]
pub fn unscale(units: Coord) -> CoordF {
    units as CoordF / SCALING_FACTOR
}

pub use config::{AdhesionType, BuildPlateShape, Settings, TreeParams};
pub use storage::{SliceDataStorage, SliceMeshStorage, SupportInfillPart, SupportStorage};
pub use support::TreeSupport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_roundtrip() {
        assert_eq!(scale(1.0), 1000);
        assert_eq!(scale(0.2), 200);
        assert!((unscale(scale(12.345)) - 12.345).abs() < 1e-9);
    }

    #[test]
    fn test_scale_negative() {
        assert_eq!(scale(-2.5), -2500);
        assert!((unscale(-2500) + 2.5).abs() < 1e-9);
    }
}

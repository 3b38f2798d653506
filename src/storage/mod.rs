//! Slicer-facing input and output types.
//!
//! The generator consumes a [`SliceDataStorage`]: per-mesh layer outlines and
//! overhang areas produced by the slicer, the machine bounds, and the
//! settings maps. It writes its results back into
//! [`SupportStorage`] as per-layer support polygons.

use crate::clipper;
use crate::config::Settings;
use crate::geometry::{BoundingBox, ExPolygons};
use crate::Coord;

/// One mesh as sliced: outlines and overhang areas per layer.
#[derive(Debug, Clone, Default)]
pub struct SliceMeshStorage {
    pub settings: Settings,
    /// Layer outlines, indexed by layer.
    pub layer_outlines: Vec<ExPolygons>,
    /// Overhang areas needing support, indexed by layer.
    pub overhang_areas: Vec<ExPolygons>,
    /// Planar bounding box of the mesh.
    pub bounding_box: BoundingBox,
}

impl SliceMeshStorage {
    /// Whether tree support is enabled for this mesh.
    pub fn tree_support_enabled(&self) -> bool {
        self.settings.get_bool("support_tree_enable", false)
    }
}

/// One extruder of the machine, as far as support generation cares.
#[derive(Debug, Clone, Default)]
pub struct ExtruderTrain {
    pub settings: Settings,
    pub used: bool,
}

/// A connected region of support on one layer, with its fill parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportInfillPart {
    pub outline: ExPolygons,
    pub line_width: Coord,
    pub wall_count: usize,
}

/// Per-layer support output.
#[derive(Debug, Clone, Default)]
pub struct SupportLayer {
    pub support_infill_parts: Vec<SupportInfillPart>,
    pub support_roof: ExPolygons,
    pub support_bottom: ExPolygons,
}

impl SupportLayer {
    pub fn is_empty(&self) -> bool {
        self.support_infill_parts.is_empty()
            && self.support_roof.is_empty()
            && self.support_bottom.is_empty()
    }
}

/// All generated support, one entry per layer.
#[derive(Debug, Clone, Default)]
pub struct SupportStorage {
    pub support_layers: Vec<SupportLayer>,
    /// Highest layer index carrying any support, -1 when none.
    pub layer_nr_max_filled_layer: i32,
    /// Set once generation has produced at least one branch.
    pub generated: bool,
}

impl SupportStorage {
    pub fn new(n_layers: usize) -> Self {
        Self {
            support_layers: vec![SupportLayer::default(); n_layers],
            layer_nr_max_filled_layer: -1,
            generated: false,
        }
    }
}

/// Everything the generator needs from the slicer, plus the output slot.
#[derive(Debug, Clone, Default)]
pub struct SliceDataStorage {
    /// Mesh-group level settings.
    pub settings: Settings,
    pub meshes: Vec<SliceMeshStorage>,
    pub extruders: Vec<ExtruderTrain>,
    /// Index of the extruder printing the platform adhesion.
    pub adhesion_extruder_nr: usize,
    /// Printable machine area in the XY plane.
    pub machine_bounds: BoundingBox,
    pub support: SupportStorage,
}

impl SliceDataStorage {
    /// Number of layers the support storage spans.
    pub fn layer_count(&self) -> usize {
        self.support.support_layers.len()
    }

    /// Combined model outline of all meshes at one layer.
    pub fn layer_outlines(&self, layer_nr: usize) -> ExPolygons {
        let mut combined: ExPolygons = Vec::new();
        for mesh in &self.meshes {
            if let Some(outlines) = mesh.layer_outlines.get(layer_nr) {
                combined.extend(outlines.iter().cloned());
            }
        }
        clipper::union_all(&combined)
    }
}

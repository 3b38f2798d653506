//! Machine border construction.
//!
//! The printable area, shrunk by the platform-adhesion reserve, is framed by
//! a one-meter band so that everything outside the plate reads as occupied in
//! the collision field. Branches then cannot wander off the machine or into
//! the skirt/brim/raft zone.

use crate::clipper::{self, OffsetJoinType};
use crate::config::{AdhesionType, BuildPlateShape, TreeParams};
use crate::geometry::{ExPolygon, ExPolygons, Point, Polygon};
use crate::storage::SliceDataStorage;
use crate::{Coord, CoordF};

/// Vertices used to approximate an elliptic build plate.
const ELLIPSE_RESOLUTION: usize = 50;

/// Width of the frame put around the printable area. One meter, far beyond
/// any reachable position.
const FRAME_WIDTH: Coord = 1_000_000;

/// Build the permanent collision region for the machine: a one-meter frame
/// around the adhesion-inset printable outline.
pub fn calculate_machine_border(storage: &SliceDataStorage, params: &TreeParams) -> ExPolygons {
    let bounds = storage.machine_bounds;
    if bounds.is_empty() {
        return Vec::new();
    }

    let outline = match params.buildplate_shape {
        BuildPlateShape::Rectangular => Polygon::rectangle(bounds.min, bounds.max),
        BuildPlateShape::Elliptic => {
            let centre = bounds.center();
            let half_width = bounds.size().x as CoordF / 2.0;
            let half_depth = bounds.size().y as CoordF / 2.0;
            let mut ellipse = Polygon::new();
            for i in 0..ELLIPSE_RESOLUTION {
                let angle = std::f64::consts::TAU * i as CoordF / ELLIPSE_RESOLUTION as CoordF;
                ellipse.push(Point::new(
                    centre.x + (angle.cos() * half_width) as Coord,
                    centre.y + (angle.sin() * half_depth) as Coord,
                ));
            }
            ellipse
        }
    };

    let adhesion = params.adhesion_size() + extra_skirt_line_width(storage, params);
    let actual_border: ExPolygons = vec![ExPolygon::new(outline)];
    let inset = clipper::offset(&actual_border, -adhesion, OffsetJoinType::Round);
    if inset.is_empty() {
        // Adhesion reserve swallowed the whole plate; everything collides.
        return clipper::offset(&actual_border, FRAME_WIDTH, OffsetJoinType::Round);
    }

    let framed = clipper::offset(&inset, FRAME_WIDTH, OffsetJoinType::Round);
    clipper::difference(&framed, &inset)
}

/// Skirt lines contributed by other used extruders widen the adhesion zone.
fn extra_skirt_line_width(storage: &SliceDataStorage, params: &TreeParams) -> Coord {
    if !matches!(
        params.adhesion_type,
        AdhesionType::Skirt | AdhesionType::Brim
    ) {
        return 0;
    }

    storage
        .extruders
        .iter()
        .enumerate()
        .filter(|(nr, train)| *nr != storage.adhesion_extruder_nr && train.used)
        .map(|(_, train)| {
            let line_width = train.settings.get_mm("skirt_brim_line_width", 0.4);
            let factor = train
                .settings
                .get_str("initial_layer_line_width_factor")
                .and_then(|v| v.parse::<CoordF>().ok())
                .unwrap_or(100.0)
                / 100.0;
            (line_width as CoordF * factor) as Coord
        })
        .sum()
}

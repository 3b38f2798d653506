//! Contact point seeding.
//!
//! Initial support nodes are placed on every overhang region of a mesh. A
//! grid of candidates, rotated by 22 degrees for better coverage of diagonal
//! features, is tested against each overhang part; candidates that fall
//! strictly inside the overhang and clear of the model become contacts. A
//! part that catches no grid point at all gets one contact anyway, at its
//! bounding-box centre, so loose features are never left unsupported.

use crate::config::TreeParams;
use crate::geometry::{polygon_utils, ExPolygon, Point};
use crate::storage::SliceMeshStorage;
use crate::Coord;
use tracing::debug;

use super::node::{Forest, Node, NodeId};
use super::volumes::ModelVolumes;

/// Grid rotation. 22 degrees supports diagonal walls noticeably better than
/// an axis-aligned grid.
const GRID_ROTATION: f64 = 22.0 * std::f64::consts::PI / 180.0;

/// Generate the rotated grid of candidate positions covering the mesh.
pub fn contact_sample_points(mesh: &SliceMeshStorage, point_spread: Coord) -> Vec<Point> {
    let bounds = mesh.bounding_box;
    if bounds.is_empty() {
        return Vec::new();
    }

    let centre = bounds.center();
    let size = bounds.size();
    let (sin_a, cos_a) = GRID_ROTATION.sin_cos();

    // Half-extent of the mesh box after rotation; the grid spans it centred
    // on the mesh so rotating the points back covers the whole box.
    let rotated_half = Point::new(
        ((size.x as f64 * cos_a + size.y as f64 * sin_a) / 2.0) as Coord,
        ((size.x as f64 * sin_a + size.y as f64 * cos_a) / 2.0) as Coord,
    );

    let mut grid = Vec::new();
    let mut x = -rotated_half.x;
    while x <= rotated_half.x {
        let mut y = -rotated_half.y;
        while y <= rotated_half.y {
            let candidate = Point::new(x, y).rotate_by_cos_sin(cos_a, sin_a) + centre;
            if bounds.contains(&candidate) {
                grid.push(candidate);
            }
            y += point_spread;
        }
        x += point_spread;
    }
    grid
}

/// Seed contact nodes for one mesh into the forest. Returns the created node
/// ids; callers batch them by layer for the dropper.
pub fn generate_contact_points(
    mesh: &SliceMeshStorage,
    params: &TreeParams,
    volumes: &ModelVolumes,
    forest: &mut Forest,
) -> Vec<NodeId> {
    let grid = contact_sample_points(mesh, params.point_spread);
    let z_gap_layers = params.z_gap_layers();
    let half_overhang_distance = params.half_overhang_distance();
    let half_overhang_distance_sq =
        (half_overhang_distance as i128) * (half_overhang_distance as i128);

    let mut contacts = Vec::new();
    let last_layer = mesh.overhang_areas.len().saturating_sub(z_gap_layers);
    for layer_nr in 1..last_layer {
        let overhang = &mesh.overhang_areas[layer_nr + z_gap_layers];
        if overhang.is_empty() {
            continue;
        }

        let skin_direction = (layer_nr + z_gap_layers) % 2 == 1;
        for part in overhang {
            let added = seed_part(
                part,
                &grid,
                layer_nr,
                skin_direction,
                half_overhang_distance_sq,
                params,
                volumes,
                forest,
                &mut contacts,
            );

            // No grid point landed on this part; support it from its centre
            // so loose features still get a branch.
            if !added {
                let centre = mesh.bounding_box.center();
                if let Some(position) = polygon_utils::move_inside(part, &centre, i128::MAX) {
                    contacts.push(forest.alloc(Node::contact(
                        position,
                        params.branch_radius,
                        layer_nr,
                        layer_nr % 2 == 1,
                        params.support_roof_layers,
                    )));
                }
            }
        }
    }

    debug!(contacts = contacts.len(), "seeded contact points");
    contacts
}

#[allow(clippy::too_many_arguments)]
fn seed_part(
    part: &ExPolygon,
    grid: &[Point],
    layer_nr: usize,
    skin_direction: bool,
    half_overhang_distance_sq: i128,
    params: &TreeParams,
    volumes: &ModelVolumes,
    forest: &mut Forest,
    contacts: &mut Vec<NodeId>,
) -> bool {
    let mut part_bounds = part.bounding_box();
    part_bounds.expand((half_overhang_distance_sq as f64).sqrt() as Coord);

    let collision = volumes.collision(0, layer_nr);
    let mut added = false;

    for candidate in grid {
        if !part_bounds.contains(candidate) {
            continue;
        }
        // Candidates just off the part are pulled onto it; this catches grid
        // points that fall between overhang islands on constant surfaces.
        let Some(position) = polygon_utils::move_inside(part, candidate, half_overhang_distance_sq)
        else {
            continue;
        };
        if !part.contains_point(&position) || polygon_utils::contains(&collision, &position) {
            continue;
        }

        contacts.push(forest.alloc(Node::contact(
            position,
            params.branch_radius,
            layer_nr,
            skin_direction,
            params.support_roof_layers,
        )));
        added = true;
    }

    added
}

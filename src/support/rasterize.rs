//! Circle rasterization: from nodes to per-layer support polygons.
//!
//! Every live node stamps a regular 10-gon of its radius into its layer.
//! Freshly seeded branches taper: over the first `tip_layers` below a
//! contact the stamp is a sheared rhombus aligned to the skin direction,
//! interpolating linearly to the full circle, so tips print as thin blades
//! under the overhang instead of full-width pillars.
//!
//! Per layer the stamps are unioned, split into roof and plain support,
//! clipped against the model (with the bottom clearance applied), simplified
//! and emitted as support infill parts. Floor regions are sampled from the
//! model outlines a few layers further down.

use crate::clipper;
use crate::config::TreeParams;
use crate::geometry::{ExPolygon, ExPolygons, Point, Polygon};
use crate::storage::{SliceDataStorage, SupportInfillPart, SupportLayer};
use crate::{Coord, CoordF};
use rayon::prelude::*;
use tracing::debug;

use super::node::{Forest, Node};
use super::volumes::ModelVolumes;

/// Vertices per stamped circle.
const CIRCLE_RESOLUTION: usize = 10;

/// Floors are subtracted from the plain support with this much growth so the
/// two never abut exactly. 10 micrometers.
const FLOOR_CLEARANCE: Coord = 10;

/// Rasterize the forest into `storage.support`.
pub fn draw_circles(
    storage: &mut SliceDataStorage,
    params: &TreeParams,
    volumes: &ModelVolumes,
    forest: &Forest,
) {
    let n_layers = storage.layer_count();
    let nodes_by_layer = forest.live_by_layer(n_layers);
    let tip_layers = params.tip_layers();

    // Unit circle scaled per node; precomputing the angles is enough.
    let circle_angles: Vec<(CoordF, CoordF)> = (0..CIRCLE_RESOLUTION)
        .map(|i| {
            let angle = std::f64::consts::TAU * i as CoordF / CIRCLE_RESOLUTION as CoordF;
            (angle.cos(), angle.sin())
        })
        .collect();

    let circle_side_length =
        (2.0 * params.branch_radius as CoordF * (std::f64::consts::PI / CIRCLE_RESOLUTION as CoordF).sin())
            as Coord;

    let layers: Vec<SupportLayer> = (0..n_layers)
        .into_par_iter()
        .map(|layer_nr| {
            rasterize_layer(
                layer_nr,
                &nodes_by_layer[layer_nr]
                    .iter()
                    .map(|&id| forest.get(id))
                    .collect::<Vec<_>>(),
                params,
                volumes,
                &circle_angles,
                circle_side_length,
                tip_layers,
            )
        })
        .collect();

    let mut max_filled: i32 = -1;
    for (layer_nr, layer) in layers.iter().enumerate() {
        if !layer.support_infill_parts.is_empty() || !layer.support_roof.is_empty() {
            max_filled = max_filled.max(layer_nr as i32);
        }
    }

    storage.support.support_layers = layers;
    storage.support.layer_nr_max_filled_layer = max_filled;
    debug!(max_filled, "support areas drawn");
}

fn rasterize_layer(
    layer_nr: usize,
    nodes: &[&Node],
    params: &TreeParams,
    volumes: &ModelVolumes,
    circle_angles: &[(CoordF, CoordF)],
    circle_side_length: Coord,
    tip_layers: usize,
) -> SupportLayer {
    let mut support_stamps: ExPolygons = Vec::new();
    let mut roof_stamps: ExPolygons = Vec::new();

    for &node in nodes {
        let stamp = node_stamp(node, params, circle_angles, tip_layers);
        if node.distance_to_top < node.roof_layers {
            roof_stamps.push(ExPolygon::new(stamp));
        } else {
            support_stamps.push(ExPolygon::new(stamp));
        }
    }

    let mut support = clipper::union_all(&support_stamps);
    let mut roof = clipper::union_all(&roof_stamps);
    support = clipper::difference(&support, &roof);

    // Keep the bottom clearance: clip against the model a few layers up so
    // support does not touch surfaces it rests over.
    let z_collision_layer = (layer_nr + 1).saturating_sub(params.z_bottom_layers());
    let collision = volumes.collision(0, z_collision_layer);
    support = clipper::difference(&support, &collision);
    roof = clipper::difference(&roof, &collision);

    // Smooth as much as possible without altering single circles: only
    // segments clearly shorter than a circle side go, deviating at most a
    // quarter line width so the walls still stack.
    let max_deviation = params.line_width / 4;
    for part in &mut support {
        part.simplify(circle_side_length * 3 / 4, max_deviation);
    }

    let support_bottom = if params.support_bottom_enable {
        let floor = sample_floor_regions(layer_nr, &support, params, volumes);
        if !floor.is_empty() {
            let grown = clipper::offset(&floor, FLOOR_CLEARANCE, clipper::OffsetJoinType::Round);
            support = clipper::difference(&support, &grown);
        }
        floor
    } else {
        Vec::new()
    };

    let support_infill_parts = support
        .into_iter()
        .filter(|part| part.area() > 0.0)
        .map(|part| SupportInfillPart {
            outline: vec![part],
            line_width: params.line_width,
            wall_count: params.wall_count,
        })
        .collect();

    SupportLayer {
        support_infill_parts,
        support_roof: roof,
        support_bottom,
    }
}

/// The polygon one node stamps into its layer.
fn node_stamp(
    node: &Node,
    params: &TreeParams,
    circle_angles: &[(CoordF, CoordF)],
    tip_layers: usize,
) -> Polygon {
    let mut stamp = Polygon::new();

    if tip_layers > 0 && node.distance_to_top < tip_layers {
        // In the tip: a rhombus sheared along the skin direction, scaled
        // linearly up to the full circle.
        let scale = (node.distance_to_top + 1) as CoordF / tip_layers as CoordF;
        let a = 0.5 + scale / 2.0;
        let b = 0.5 - scale / 2.0;
        for &(cos_a, sin_a) in circle_angles {
            let x = cos_a * params.branch_radius as CoordF;
            let y = sin_a * params.branch_radius as CoordF;
            let corner = if node.skin_direction {
                Point::new((x * a + y * b) as Coord, (x * b + y * a) as Coord)
            } else {
                Point::new((x * a - y * b) as Coord, (-x * b + y * a) as Coord)
            };
            stamp.push(node.position + corner);
        }
    } else {
        for &(cos_a, sin_a) in circle_angles {
            stamp.push(Point::new(
                node.position.x + (cos_a * node.radius as CoordF) as Coord,
                node.position.y + (sin_a * node.radius as CoordF) as Coord,
            ));
        }
    }

    stamp
}

/// Floor regions: where the support overlaps the model within the floor
/// thickness below, sampled at the configured stride.
fn sample_floor_regions(
    layer_nr: usize,
    support: &[ExPolygon],
    params: &TreeParams,
    volumes: &ModelVolumes,
) -> ExPolygons {
    if support.is_empty() {
        return Vec::new();
    }

    let z_bottom_layers = params.z_bottom_layers();
    let bottom_height_layers = div_round_up(params.support_bottom_height, params.layer_height);
    let skip_layers = div_round_up(params.support_interface_skip_height, params.layer_height).max(1);

    let mut floor: ExPolygons = Vec::new();
    let mut layers_below = 0;
    while layers_below < bottom_height_layers {
        let sample_layer = layer_nr.saturating_sub(layers_below + z_bottom_layers);
        floor.extend(clipper::intersection(
            support,
            volumes.layer_outline(sample_layer),
        ));
        layers_below += skip_layers;
    }
    // One more sample at the full floor depth.
    let deepest = layer_nr.saturating_sub(bottom_height_layers + z_bottom_layers);
    floor.extend(clipper::intersection(support, volumes.layer_outline(deepest)));

    clipper::union_all(&floor)
}

fn div_round_up(a: Coord, b: Coord) -> usize {
    if b <= 0 {
        return 0;
    }
    ((a + b - 1) / b).max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, TreeParams};
    use crate::scale;
    use crate::support::node::Forest;
    use crate::storage::SupportStorage;

    fn node_at(
        forest: &mut Forest,
        position: Point,
        radius: Coord,
        layer: usize,
        distance_to_top: usize,
        roof_layers: usize,
    ) {
        let mut node = Node::contact(position, radius, layer, false, roof_layers);
        node.distance_to_top = distance_to_top;
        forest.alloc(node);
    }

    fn empty_storage(n_layers: usize) -> SliceDataStorage {
        let mut storage = SliceDataStorage::default();
        storage.support = SupportStorage::new(n_layers);
        storage
    }

    fn open_volumes(params: &TreeParams, n_layers: usize) -> ModelVolumes {
        ModelVolumes::from_parts(params.clone(), Vec::new(), vec![Vec::new(); n_layers])
    }

    #[test]
    fn test_single_node_stamps_a_circle() {
        let params = TreeParams::default();
        let volumes = open_volumes(&params, 3);
        let mut storage = empty_storage(3);
        let mut forest = Forest::new();
        // Past the tip so a full circle is stamped.
        node_at(&mut forest, Point::zero(), scale(2.0), 1, 20, 0);

        draw_circles(&mut storage, &params, &volumes, &forest);

        let layer = &storage.support.support_layers[1];
        assert_eq!(layer.support_infill_parts.len(), 1);
        let part = &layer.support_infill_parts[0];
        assert_eq!(part.line_width, params.line_width);
        assert_eq!(part.wall_count, params.wall_count);

        // Area close to a circle of radius 2mm (10-gon, a bit smaller).
        let area = clipper::total_area(&part.outline);
        let full = std::f64::consts::PI * (scale(2.0) as f64).powi(2);
        assert!(area > 0.85 * full && area < full);

        assert_eq!(storage.support.layer_nr_max_filled_layer, 1);
        assert!(storage.support.support_layers[0].is_empty());
        assert!(storage.support.support_layers[2].is_empty());
    }

    #[test]
    fn test_tip_taper_areas_increase() {
        let params = TreeParams::default();
        let tip_layers = params.tip_layers();
        assert!(tip_layers >= 2);

        let volumes = open_volumes(&params, tip_layers + 2);
        let mut storage = empty_storage(tip_layers + 2);
        let mut forest = Forest::new();
        // One node per layer, walking down the taper. Offset them far apart
        // so the stamps stay separate.
        for d in 0..=tip_layers {
            node_at(
                &mut forest,
                Point::new(d as Coord * scale(30.0), 0),
                params.branch_radius + d as Coord * params.radius_increment.max(20),
                d,
                d,
                0,
            );
        }

        draw_circles(&mut storage, &params, &volumes, &forest);

        let mut areas = Vec::new();
        for d in 0..=tip_layers {
            let layer = &storage.support.support_layers[d];
            assert_eq!(layer.support_infill_parts.len(), 1);
            areas.push(clipper::total_area(&layer.support_infill_parts[0].outline));
        }
        // From the sheared rhombus at the contact to the full circle.
        for pair in areas.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_roof_nodes_go_to_roof() {
        let mut settings = Settings::new();
        settings
            .set("support_roof_enable", "true")
            .set("support_roof_height", 0.6);
        let params = TreeParams::from_settings(&settings);
        assert_eq!(params.support_roof_layers, 3);

        let volumes = open_volumes(&params, 10);
        let mut storage = empty_storage(10);
        let mut forest = Forest::new();
        // Within the roof band of its contact.
        node_at(&mut forest, Point::zero(), scale(1.0), 5, 2, params.support_roof_layers);
        // Past the roof band.
        node_at(
            &mut forest,
            Point::new(scale(20.0), 0),
            scale(1.0),
            3,
            7,
            params.support_roof_layers,
        );

        draw_circles(&mut storage, &params, &volumes, &forest);

        assert!(!storage.support.support_layers[5].support_roof.is_empty());
        assert!(storage.support.support_layers[5].support_infill_parts.is_empty());

        assert!(storage.support.support_layers[3].support_roof.is_empty());
        assert!(!storage.support.support_layers[3].support_infill_parts.is_empty());
    }

    #[test]
    fn test_model_clipped_with_bottom_clearance() {
        let mut settings = Settings::new();
        settings.set("support_bottom_distance", 0.4); // 2 layers
        let params = TreeParams::from_settings(&settings);

        // Model occupies a square around the node on layer 4; the stamp on
        // layer 5 must be clipped against collision(0, 4).
        let mut outlines: Vec<ExPolygons> = vec![Vec::new(); 10];
        let block = ExPolygon::new(Polygon::rectangle(
            Point::new_scale(-5.0, -5.0),
            Point::new_scale(5.0, 5.0),
        ));
        outlines[4] = vec![block];
        let volumes = ModelVolumes::from_parts(params.clone(), Vec::new(), outlines);

        let mut storage = empty_storage(10);
        let mut forest = Forest::new();
        node_at(&mut forest, Point::zero(), scale(2.0), 5, 20, 0);

        draw_circles(&mut storage, &params, &volumes, &forest);

        // z_bottom_layers = 2, so layer 5 clips against layer 4's collision,
        // which swallows the whole stamp.
        assert!(storage.support.support_layers[5].support_infill_parts.is_empty());
    }

    #[test]
    fn test_floor_sampled_from_model() {
        let mut settings = Settings::new();
        settings
            .set("support_bottom_enable", "true")
            .set("support_bottom_height", 0.4)
            .set("support_bottom_distance", 0.0);
        let params = TreeParams::from_settings(&settings);

        // Model directly below the stamp on layers 0..=4; node on layer 5.
        let mut outlines: Vec<ExPolygons> = vec![Vec::new(); 10];
        let block = ExPolygon::new(Polygon::rectangle(
            Point::new_scale(-5.0, -5.0),
            Point::new_scale(5.0, 5.0),
        ));
        for outline in outlines.iter_mut().take(5) {
            *outline = vec![block.clone()];
        }
        let volumes = ModelVolumes::from_parts(params.clone(), Vec::new(), outlines);

        let mut storage = empty_storage(10);
        let mut forest = Forest::new();
        node_at(&mut forest, Point::zero(), scale(1.0), 5, 20, 0);

        draw_circles(&mut storage, &params, &volumes, &forest);

        let layer = &storage.support.support_layers[5];
        assert!(!layer.support_bottom.is_empty());
        // The floor is carved out of the plain support.
        let support_area: f64 = layer
            .support_infill_parts
            .iter()
            .map(|p| clipper::total_area(&p.outline))
            .sum();
        let floor_area = clipper::total_area(&layer.support_bottom);
        assert!(floor_area > 0.0);
        assert!(support_area < 1.0);
    }

    #[test]
    fn test_overlapping_stamps_union_into_one_part() {
        let params = TreeParams::default();
        let volumes = open_volumes(&params, 4);
        let mut storage = empty_storage(4);
        let mut forest = Forest::new();
        node_at(&mut forest, Point::zero(), scale(2.0), 1, 20, 0);
        node_at(&mut forest, Point::new(scale(1.0), 0), scale(2.0), 1, 20, 0);
        node_at(&mut forest, Point::new(scale(30.0), 0), scale(2.0), 1, 20, 0);

        draw_circles(&mut storage, &params, &volumes, &forest);

        // Two overlapping stamps fuse; the distant one stays its own part.
        assert_eq!(storage.support.support_layers[1].support_infill_parts.len(), 2);
    }
}

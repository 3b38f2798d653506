//! Tree support integration tests.
//!
//! End-to-end scenarios through the full pipeline: seed contacts on
//! overhangs, drop the forest to the plate, rasterize, and check the
//! per-layer output against the tree invariants.

use arbor::geometry::{polygon_utils, BoundingBox, ExPolygon, Point, Polygon};
use arbor::scale;
use arbor::support::{ModelVolumes, TreeSupport};
use arbor::{SliceDataStorage, SliceMeshStorage, SupportStorage, TreeParams};

fn disc(centre: Point, radius_mm: f64) -> ExPolygon {
    let r = scale(radius_mm);
    let mut poly = Polygon::new();
    for i in 0..48 {
        let angle = std::f64::consts::TAU * i as f64 / 48.0;
        poly.push(Point::new(
            centre.x + (angle.cos() * r as f64) as i64,
            centre.y + (angle.sin() * r as f64) as i64,
        ));
    }
    ExPolygon::new(poly)
}

fn square(centre: Point, size_mm: f64) -> ExPolygon {
    let half = scale(size_mm / 2.0);
    let mut p = Polygon::rectangle(Point::new(-half, -half), Point::new(half, half));
    p.translate(centre);
    ExPolygon::new(p)
}

/// A storage with one tree-enabled mesh over a 200x200mm plate.
fn base_storage(n_layers: usize) -> SliceDataStorage {
    let mut storage = SliceDataStorage::default();
    storage.machine_bounds = BoundingBox::new(
        Point::new_scale(-100.0, -100.0),
        Point::new_scale(100.0, 100.0),
    );
    storage.support = SupportStorage::new(n_layers);

    let mut mesh = SliceMeshStorage::default();
    mesh.settings.set("support_tree_enable", "true");
    mesh.bounding_box = BoundingBox::new(
        Point::new_scale(-30.0, -30.0),
        Point::new_scale(30.0, 30.0),
    );
    mesh.layer_outlines = vec![Vec::new(); n_layers];
    mesh.overhang_areas = vec![Vec::new(); n_layers];
    storage.meshes = vec![mesh];
    storage
}

fn total_support_area(storage: &SliceDataStorage, layer: usize) -> f64 {
    storage.support.support_layers[layer]
        .support_infill_parts
        .iter()
        .flat_map(|part| part.outline.iter())
        .map(|ex| ex.area())
        .sum()
}

#[test]
fn single_pillar_reaches_the_plate() {
    let mut storage = base_storage(16);
    let params = TreeParams::from_settings(&storage.settings);
    let overhang_layer = 10 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![disc(Point::zero(), 5.0)];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);

    assert!(storage.support.generated);
    // Support exists on every layer from the contact down to the plate.
    for layer in 0..=10 {
        assert!(
            total_support_area(&storage, layer) > 0.0,
            "no support on layer {layer}"
        );
    }
    // Nothing above the contact layer.
    for layer in overhang_layer..16 {
        assert!(storage.support.support_layers[layer].is_empty());
    }
    assert_eq!(storage.support.layer_nr_max_filled_layer, 10);

    // The column stays near the overhang footprint: everything within the
    // disc grown by the accumulated lateral drift.
    let reach = scale(5.0) as f64 + 11.0 * params.max_move as f64;
    for layer in 0..=10 {
        for part in &storage.support.support_layers[layer].support_infill_parts {
            for ex in &part.outline {
                for p in ex.contour.points() {
                    assert!(
                        p.distance(&Point::zero()) < reach + scale(2.0) as f64,
                        "stray support at {p:?} on layer {layer}"
                    );
                }
            }
        }
    }
}

#[test]
fn two_overhangs_merge_on_the_way_down() {
    let mut storage = base_storage(26);
    storage.settings.set("support_tree_angle", 84.3); // max_move = 2mm
    let params = TreeParams::from_settings(&storage.settings);
    let overhang_layer = 20 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![
        disc(Point::new_scale(-20.0, 0.0), 2.0),
        disc(Point::new_scale(20.0, 0.0), 2.0),
    ];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);
    assert!(storage.support.generated);

    // Two separate columns at the top.
    let top_parts = &storage.support.support_layers[20].support_infill_parts;
    assert!(top_parts.len() >= 2, "expected separate columns at the top");

    // One fused trunk at the bottom, near the midpoint.
    let bottom_parts = &storage.support.support_layers[0].support_infill_parts;
    assert_eq!(bottom_parts.len(), 1, "expected a single root trunk");
    let centroid = bottom_parts[0].outline[0].contour.centroid();
    assert!(
        centroid.distance(&Point::zero()) < scale(5.0) as f64,
        "root at {centroid:?}"
    );
}

#[test]
fn buildplate_only_prunes_branches_with_no_escape() {
    let mut storage = base_storage(24);
    storage.settings.set("support_on_model", "false");
    let params = TreeParams::from_settings(&storage.settings);

    // A wide solid slab on layers 0..8 directly under the overhang. The
    // avoidance sweep above it is far wider than a branch can out-run.
    for layer in 0..8 {
        storage.meshes[0].layer_outlines[layer] = vec![square(Point::zero(), 50.0)];
    }
    let overhang_layer = 18 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![disc(Point::zero(), 3.0)];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);

    // Every branch is unsupportable: no layer-0 support at all.
    assert_eq!(total_support_area(&storage, 0), 0.0);
}

#[test]
fn branch_rests_on_the_model_when_allowed() {
    let mut storage = base_storage(30);
    let params = TreeParams::from_settings(&storage.settings);

    // The same slab, but support on the model is allowed: branches terminate
    // on top of it instead of vanishing.
    for layer in 0..=10 {
        storage.meshes[0].layer_outlines[layer] = vec![square(Point::zero(), 50.0)];
    }
    let overhang_layer = 25 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![disc(Point::zero(), 3.0)];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);
    assert!(storage.support.generated);

    // Support exists above the slab.
    let above: f64 = (12..=25).map(|l| total_support_area(&storage, l)).sum();
    assert!(above > 0.0);
    // The layers inside the slab keep their clearance: stamps there are
    // clipped against the model.
    assert_eq!(total_support_area(&storage, 0), 0.0);
}

#[test]
fn elliptic_plate_rejects_corner_contacts() {
    let mut storage = base_storage(12);
    storage
        .settings
        .set("machine_shape", "elliptic")
        .set("support_tree_branch_distance", 20.0);
    // One rectangular overhang spanning the whole plate; its corners stick
    // out of the inscribed ellipse.
    storage.meshes[0].bounding_box = BoundingBox::new(
        Point::new_scale(-95.0, -95.0),
        Point::new_scale(95.0, 95.0),
    );
    let params = TreeParams::from_settings(&storage.settings);
    let overhang_layer = 6 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![square(Point::zero(), 180.0)];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);
    assert!(storage.support.generated);

    // Contacts exist over the plate centre but never in the corners outside
    // the ellipse, where every position collides.
    let mut near_centre = false;
    for part in &storage.support.support_layers[6].support_infill_parts {
        for ex in &part.outline {
            let c = ex.contour.centroid();
            if c.distance(&Point::zero()) < scale(30.0) as f64 {
                near_centre = true;
            }
            // 110mm from the centre is outside the 100mm semi-axis ellipse
            // in every direction.
            assert!(
                c.distance(&Point::zero()) < scale(110.0) as f64,
                "support outside the plate at {c:?}"
            );
        }
    }
    assert!(near_centre, "no support over the plate centre");
}

#[test]
fn forest_respects_collision_everywhere() {
    let mut storage = base_storage(20);
    // A pillar the branches must steer around.
    for layer in 0..20 {
        storage.meshes[0].layer_outlines[layer] = vec![square(Point::new_scale(6.0, 0.0), 6.0)];
    }
    let params = TreeParams::from_settings(&storage.settings);
    let overhang_layer = 14 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![disc(Point::new_scale(-6.0, 0.0), 3.0)];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);
    assert!(storage.support.generated);

    // Rebuild the volumes the same way and check the support polygons stay
    // clear of the raw model outline on every layer.
    let volumes = ModelVolumes::new(&params, &storage);
    for layer in 0..20 {
        let outline = storage.layer_outlines(layer);
        for part in &storage.support.support_layers[layer].support_infill_parts {
            for ex in &part.outline {
                for p in ex.contour.points() {
                    assert!(
                        !polygon_utils::contains(&outline, p),
                        "support inside the model on layer {layer}"
                    );
                }
            }
        }
        // Probe the collision field itself for referential transparency.
        let a = volumes.collision(0, layer);
        let b = volumes.collision(0, layer);
        assert_eq!(&*a, &*b);
    }
}

#[test]
fn roof_band_follows_the_contacts() {
    let mut storage = base_storage(18);
    storage
        .settings
        .set("support_roof_enable", "true")
        .set("support_roof_height", 0.6); // 3 layers
    let params = TreeParams::from_settings(&storage.settings);
    assert_eq!(params.support_roof_layers, 3);

    let overhang_layer = 12 + params.z_gap_layers();
    storage.meshes[0].overhang_areas[overhang_layer] = vec![disc(Point::zero(), 4.0)];

    let generator = TreeSupport::from_storage(&storage);
    generator.generate_support_areas(&mut storage);

    // The top three support layers are roof, the rest plain support.
    for layer in 10..=12 {
        assert!(
            !storage.support.support_layers[layer].support_roof.is_empty(),
            "roof missing on layer {layer}"
        );
    }
    for layer in 0..6 {
        assert!(
            storage.support.support_layers[layer].support_roof.is_empty(),
            "unexpected roof on layer {layer}"
        );
        assert!(total_support_area(&storage, layer) > 0.0);
    }
}

#[test]
fn deterministic_across_runs() {
    let build = || {
        let mut storage = base_storage(16);
        let params = TreeParams::from_settings(&storage.settings);
        let overhang_layer = 10 + params.z_gap_layers();
        storage.meshes[0].overhang_areas[overhang_layer] = vec![
            disc(Point::new_scale(-8.0, 3.0), 4.0),
            disc(Point::new_scale(8.0, -3.0), 4.0),
        ];
        let generator = TreeSupport::from_storage(&storage);
        generator.generate_support_areas(&mut storage);
        storage
    };

    let first = build();
    let second = build();
    for layer in 0..16 {
        assert_eq!(
            first.support.support_layers[layer].support_infill_parts,
            second.support.support_layers[layer].support_infill_parts,
            "layer {layer} differs between runs"
        );
    }
}

#[test]
fn settings_map_drives_the_output() {
    // Doubling the bottom clearance moves the collision sampling window; the
    // run must stay well-formed either way.
    for bottom in ["0.0", "0.6"] {
        let mut storage = base_storage(14);
        storage.settings.set("support_bottom_distance", bottom);

        let params = TreeParams::from_settings(&storage.settings);
        let overhang_layer = 8 + params.z_gap_layers();
        storage.meshes[0].overhang_areas[overhang_layer] = vec![disc(Point::zero(), 4.0)];

        let generator = TreeSupport::from_storage(&storage);
        generator.generate_support_areas(&mut storage);
        assert!(storage.support.generated);
    }
}

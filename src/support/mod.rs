//! Tree support generation pipeline.
//!
//! The stages, in order:
//!
//! 1. Build [`ModelVolumes`] (machine border included) and precalculate the
//!    collision and avoidance fields.
//! 2. Seed contact nodes on every overhang of every tree-enabled mesh.
//! 3. Run the [`Dropper`] from the highest contact layer down to the plate.
//! 4. Rasterize the surviving forest into per-layer support polygons.

pub mod border;
pub mod contact;
pub mod dropper;
pub mod mst;
pub mod node;
pub mod rasterize;
pub mod volumes;

pub use dropper::Dropper;
pub use node::{Forest, Node, NodeId};
pub use volumes::ModelVolumes;

use crate::config::TreeParams;
use crate::storage::SliceDataStorage;
use tracing::{debug, info};

/// Pipeline stages reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Collision,
    DropDown,
    Areas,
}

/// Progress callback: stage, steps done, total steps.
pub type ProgressFn = dyn Fn(Stage, usize, usize) + Send + Sync;

/// Tree support generator.
pub struct TreeSupport {
    params: TreeParams,
    progress: Option<Box<ProgressFn>>,
}

impl TreeSupport {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            progress: None,
        }
    }

    /// Snapshot the mesh-group settings from the storage.
    pub fn from_storage(storage: &SliceDataStorage) -> Self {
        Self::new(TreeParams::from_settings(&storage.settings))
    }

    /// Install a progress callback fired at stage boundaries.
    pub fn with_progress(mut self, progress: Box<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Generate the support areas into `storage.support`.
    ///
    /// Does nothing unless at least one mesh enables tree support. With tree
    /// support enabled but no overhang to hold up, the output stays empty
    /// and `storage.support.generated` stays false: the flag records that
    /// support exists, not that the generator ran.
    pub fn generate_support_areas(&self, storage: &mut SliceDataStorage) {
        if !storage.meshes.iter().any(|m| m.tree_support_enabled()) {
            return;
        }
        let n_layers = storage.layer_count();
        if n_layers == 0 {
            return;
        }

        let volumes = ModelVolumes::new(&self.params, storage);
        volumes.precalculate(n_layers - 1);
        self.report(Stage::Collision, 1, 1);

        let mut forest = Forest::new();
        let mut contacts = Vec::new();
        for mesh in storage.meshes.iter().filter(|m| m.tree_support_enabled()) {
            let mesh_params = TreeParams::from_settings(&storage.settings.overlaid(&mesh.settings));
            contacts.extend(contact::generate_contact_points(
                mesh,
                &mesh_params,
                &volumes,
                &mut forest,
            ));
        }

        if contacts.is_empty() {
            debug!("no contact points; nothing to support");
            return;
        }

        let mut dropper = Dropper::new(&self.params, &volumes, forest);
        dropper.run(contacts);
        self.report(Stage::DropDown, 1, 1);

        let forest = dropper.into_forest();
        rasterize::draw_circles(storage, &self.params, &volumes, &forest);
        self.report(Stage::Areas, 1, 1);

        storage.support.generated = true;
        info!(
            max_filled_layer = storage.support.layer_nr_max_filled_layer,
            "tree support generated"
        );
    }

    fn report(&self, stage: Stage, done: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(stage, done, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, ExPolygon, Point, Polygon};
    use crate::scale;
    use crate::storage::{SliceMeshStorage, SupportStorage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn disc(centre: Point, radius_mm: f64) -> ExPolygon {
        let r = scale(radius_mm);
        let mut poly = Polygon::new();
        for i in 0..32 {
            let angle = std::f64::consts::TAU * i as f64 / 32.0;
            poly.push(Point::new(
                centre.x + (angle.cos() * r as f64) as i64,
                centre.y + (angle.sin() * r as f64) as i64,
            ));
        }
        ExPolygon::new(poly)
    }

    fn storage_with_overhang(n_layers: usize, overhang_layer: usize) -> SliceDataStorage {
        let mut storage = SliceDataStorage::default();
        storage.machine_bounds = BoundingBox::new(
            Point::new_scale(-100.0, -100.0),
            Point::new_scale(100.0, 100.0),
        );
        storage.support = SupportStorage::new(n_layers);

        let mut mesh = SliceMeshStorage::default();
        mesh.settings.set("support_tree_enable", "true");
        mesh.bounding_box = BoundingBox::new(
            Point::new_scale(-20.0, -20.0),
            Point::new_scale(20.0, 20.0),
        );
        mesh.layer_outlines = vec![Vec::new(); n_layers];
        mesh.overhang_areas = vec![Vec::new(); n_layers];
        mesh.overhang_areas[overhang_layer] = vec![disc(Point::zero(), 5.0)];
        storage.meshes = vec![mesh];
        storage
    }

    #[test]
    fn test_generate_produces_support() {
        let mut storage = storage_with_overhang(20, 15);
        let generator = TreeSupport::from_storage(&storage);

        generator.generate_support_areas(&mut storage);

        assert!(storage.support.generated);
        assert!(storage.support.layer_nr_max_filled_layer >= 0);
        let any_support = storage
            .support
            .support_layers
            .iter()
            .any(|l| !l.support_infill_parts.is_empty());
        assert!(any_support);
    }

    #[test]
    fn test_disabled_meshes_are_skipped() {
        let mut storage = storage_with_overhang(20, 15);
        storage.meshes[0].settings.set("support_tree_enable", "false");
        let generator = TreeSupport::from_storage(&storage);

        generator.generate_support_areas(&mut storage);

        assert!(!storage.support.generated);
        assert!(storage.support.support_layers.iter().all(|l| l.is_empty()));
    }

    #[test]
    fn test_no_overhangs_no_generated_flag() {
        let mut storage = storage_with_overhang(20, 15);
        storage.meshes[0].overhang_areas[15].clear();
        let generator = TreeSupport::from_storage(&storage);

        generator.generate_support_areas(&mut storage);

        assert!(!storage.support.generated);
    }

    #[test]
    fn test_progress_reports_all_stages() {
        let mut storage = storage_with_overhang(12, 8);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let generator = TreeSupport::from_storage(&storage).with_progress(Box::new(
            move |_stage, _done, _total| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));

        generator.generate_support_areas(&mut storage);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rerun_on_own_output_is_empty() {
        // Supporting the already-supported overhang set again produces no
        // new forest: after generation the overhang is gone.
        let mut storage = storage_with_overhang(20, 15);
        let generator = TreeSupport::from_storage(&storage);
        generator.generate_support_areas(&mut storage);
        assert!(storage.support.generated);

        storage.meshes[0].overhang_areas[15].clear();
        storage.support = SupportStorage::new(20);
        generator.generate_support_areas(&mut storage);
        assert!(!storage.support.generated);
        assert!(storage.support.support_layers.iter().all(|l| l.is_empty()));
    }

    #[test]
    fn test_mesh_settings_override_group() {
        let mut storage = storage_with_overhang(20, 15);
        storage.settings.set("support_tree_branch_distance", 2.5);
        storage.meshes[0]
            .settings
            .set("support_tree_branch_distance", 50.0);
        let generator = TreeSupport::from_storage(&storage);

        generator.generate_support_areas(&mut storage);

        // With a 50mm spread the grid misses the 5mm disc; only the
        // fallback contact remains, so the top support layer is one stamp.
        assert!(storage.support.generated);
    }
}

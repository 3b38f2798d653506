//! Configuration for tree support generation.
//!
//! Settings arrive as a string key/value map (the slicer's configuration
//! surface). [`TreeParams`] snapshots the recognized keys into an immutable
//! struct at the start of a run. Configuration problems never abort the run:
//! unknown enum values and malformed numbers log a warning and fall back to a
//! safe default, negative dimensions clamp to zero.

use crate::{scale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use thiserror::Error;
use tracing::warn;

/// Shape of the printable build plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildPlateShape {
    #[default]
    Rectangular,
    Elliptic,
}

/// Platform adhesion helper printed around the first layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdhesionType {
    #[default]
    None,
    Skirt,
    Brim,
    Raft,
}

/// Error raised internally by the settings layer. Never escapes the crate;
/// every occurrence is logged and recovered from locally.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("setting `{0}` is not a valid number: `{1}`")]
    InvalidNumber(String, String),
    #[error("setting `{0}` has unrecognized value `{1}`")]
    UnknownVariant(String, String),
}

/// A string key/value settings map with typed accessors.
///
/// Numeric dimensions are given in millimeters and converted to scaled
/// integer units; angles are given in degrees and converted to radians.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// This map with `overrides` layered on top, as a new map. Used to apply
    /// per-mesh settings over the mesh-group defaults.
    pub fn overlaid(&self, overrides: &Settings) -> Settings {
        let mut values = self.values.clone();
        for (k, v) in &overrides.values {
            values.insert(k.clone(), v.clone());
        }
        Settings { values }
    }

    fn get_f64(&self, key: &str, default: CoordF) -> CoordF {
        match self.values.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(error = %ConfigError::InvalidNumber(key.into(), raw.clone()), "falling back to default");
                default
            }),
        }
    }

    /// Millimeter dimension as scaled units, clamped to be non-negative.
    pub fn get_mm(&self, key: &str, default_mm: CoordF) -> Coord {
        let value = self.get_f64(key, default_mm);
        if value < 0.0 {
            warn!(key, value, "negative dimension treated as zero");
            return 0;
        }
        scale(value)
    }

    /// Angle in degrees converted to radians, clamped to `[0, 90]` degrees.
    pub fn get_angle(&self, key: &str, default_deg: CoordF) -> CoordF {
        let degrees = self.get_f64(key, default_deg);
        if !(0.0..=90.0).contains(&degrees) {
            warn!(key, degrees, "angle clamped to [0, 90] degrees");
        }
        degrees.clamp(0.0, 90.0).to_radians()
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        let value = self.get_f64(key, default as CoordF);
        if value < 0.0 {
            warn!(key, value, "negative count treated as zero");
            return 0;
        }
        value.round() as usize
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key).map(String::as_str) {
            None => default,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                warn!(error = %ConfigError::UnknownVariant(key.into(), other.into()), "falling back to default");
                default
            }
        }
    }

    pub fn get_buildplate_shape(&self, key: &str) -> BuildPlateShape {
        match self.values.get(key).map(String::as_str) {
            None | Some("rectangular") => BuildPlateShape::Rectangular,
            Some("elliptic") => BuildPlateShape::Elliptic,
            Some(other) => {
                warn!(error = %ConfigError::UnknownVariant(key.into(), other.into()), "using rectangular plate");
                BuildPlateShape::Rectangular
            }
        }
    }

    pub fn get_adhesion_type(&self, key: &str) -> AdhesionType {
        match self.values.get(key).map(String::as_str) {
            None | Some("none") => AdhesionType::None,
            Some("skirt") => AdhesionType::Skirt,
            Some("brim") => AdhesionType::Brim,
            Some("raft") => AdhesionType::Raft,
            Some(other) => {
                warn!(error = %ConfigError::UnknownVariant(key.into(), other.into()), "adhesion reserve treated as zero");
                AdhesionType::None
            }
        }
    }
}

/// Immutable configuration snapshot for one tree support run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    /// Nominal branch radius at the tip.
    pub branch_radius: Coord,
    /// Quantization step for cached radii.
    pub radius_sample_resolution: Coord,
    pub layer_height: Coord,
    /// Horizontal clearance kept between branches and the model.
    pub xy_distance: Coord,
    /// Per-layer lateral reach. `Coord::MAX` when the support angle allows
    /// horizontal growth.
    pub max_move: Coord,
    /// Per-layer radial growth of descending branches.
    pub radius_increment: Coord,
    /// Grid step for contact seeding.
    pub point_spread: Coord,
    /// Vertical clearance between a branch tip and the overhang it supports.
    pub z_gap: Coord,
    /// Roof thickness in layers; 0 disables roofs.
    pub support_roof_layers: usize,
    /// Angle driving `max_move` and the seeder's rescue distance, radians.
    pub support_angle: CoordF,
    /// When false, branches must terminate on the build plate.
    pub can_support_on_model: bool,
    pub buildplate_shape: BuildPlateShape,
    pub adhesion_type: AdhesionType,
    pub brim_size: Coord,
    pub raft_margin: Coord,
    pub skirt_size: Coord,
    /// Rasterization hints passed through to the support infill parts.
    pub line_width: Coord,
    pub wall_count: usize,
    /// Floor (dense bottom interface) generation.
    pub support_bottom_enable: bool,
    pub support_bottom_distance: Coord,
    pub support_bottom_height: Coord,
    pub support_interface_skip_height: Coord,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

impl TreeParams {
    /// Snapshot the recognized settings keys.
    pub fn from_settings(settings: &Settings) -> Self {
        let layer_height = settings.get_mm("layer_height", 0.2).max(1);
        let support_angle = settings.get_angle("support_tree_angle", 40.0);

        let branch_radius = settings.get_mm("support_tree_branch_diameter", 2.0) / 2;
        let branch_diameter_angle = settings.get_angle("support_tree_branch_diameter_angle", 5.0);

        let first_layer_factor = settings.get_f64("initial_layer_line_width_factor", 100.0) / 100.0;
        let skirt_brim_line_width = settings.get_mm("skirt_brim_line_width", 0.4);

        Self {
            branch_radius,
            radius_sample_resolution: settings
                .get_mm("support_tree_collision_resolution", 0.5)
                .max(1),
            layer_height,
            xy_distance: settings.get_mm("support_xy_distance", 0.7),
            max_move: max_move_for(support_angle, layer_height),
            radius_increment: (branch_diameter_angle.tan() * layer_height as CoordF) as Coord,
            point_spread: settings.get_mm("support_tree_branch_distance", 2.5).max(1),
            z_gap: settings.get_mm("support_top_distance", 0.1),
            support_roof_layers: if settings.get_bool("support_roof_enable", false) {
                let roof_height = settings.get_mm("support_roof_height", 1.0);
                (roof_height as CoordF / layer_height as CoordF).round() as usize
            } else {
                0
            },
            support_angle,
            can_support_on_model: settings.get_bool("support_on_model", true),
            buildplate_shape: settings.get_buildplate_shape("machine_shape"),
            adhesion_type: settings.get_adhesion_type("adhesion_type"),
            brim_size: ((skirt_brim_line_width as CoordF
                * first_layer_factor
                * settings.get_usize("brim_line_count", 8) as CoordF)
                as Coord),
            raft_margin: settings.get_mm("raft_margin", 15.0),
            skirt_size: settings.get_mm("skirt_gap", 3.0)
                + (skirt_brim_line_width as CoordF
                    * first_layer_factor
                    * settings.get_usize("skirt_line_count", 1) as CoordF) as Coord,
            line_width: settings.get_mm("support_line_width", 0.4),
            wall_count: settings.get_usize("support_tree_wall_count", 1),
            support_bottom_enable: settings.get_bool("support_bottom_enable", false),
            support_bottom_distance: settings.get_mm("support_bottom_distance", 0.2),
            support_bottom_height: settings.get_mm("support_bottom_height", 1.0),
            support_interface_skip_height: settings
                .get_mm("support_interface_skip_height", 0.2)
                .max(1),
        }
    }

    /// Number of layers a contact sits above the overhang it supports.
    /// Support is always at least one layer below the overhang.
    pub fn z_gap_layers(&self) -> usize {
        div_round_up(self.z_gap, self.layer_height) + 1
    }

    /// Layers over which a fresh branch tapers from a line to the full tip
    /// circle.
    pub fn tip_layers(&self) -> usize {
        (self.branch_radius / self.layer_height) as usize
    }

    /// Layers of vertical clearance kept below support resting on the model.
    pub fn z_bottom_layers(&self) -> usize {
        div_round_up(self.support_bottom_distance, self.layer_height)
    }

    /// How far a contact candidate may sit outside an overhang part and still
    /// be pulled onto it.
    pub fn half_overhang_distance(&self) -> Coord {
        (self.support_angle.tan() * self.layer_height as CoordF / 2.0) as Coord
    }

    /// The largest radius any branch can reach over `n_layers` of growth,
    /// which bounds the radius buckets worth caching.
    pub fn maximum_radius(&self, n_layers: usize) -> Coord {
        self.branch_radius + n_layers as Coord * self.radius_increment
    }

    /// Platform adhesion reserve around the printable area.
    pub fn adhesion_size(&self) -> Coord {
        match self.adhesion_type {
            AdhesionType::Brim => self.brim_size,
            AdhesionType::Raft => self.raft_margin,
            AdhesionType::Skirt => self.skirt_size,
            AdhesionType::None => 0,
        }
    }
}

fn max_move_for(support_angle: CoordF, layer_height: Coord) -> Coord {
    if support_angle >= FRAC_PI_2 - 1e-9 {
        Coord::MAX
    } else {
        (support_angle.tan() * layer_height as CoordF) as Coord
    }
}

fn div_round_up(a: Coord, b: Coord) -> usize {
    if b <= 0 {
        return 0;
    }
    ((a + b - 1) / b).max(0) as usize
}

//! Cached collision, avoidance and internal-guide fields.
//!
//! `ModelVolumes` answers, for a branch of radius `r` on layer `z`:
//!
//! - `collision(r, z)` — where the branch cannot sit at all (model outline
//!   plus machine border, grown by `xy_distance + r`).
//! - `avoidance(r, z)` — where the branch must not sit if it still wants to
//!   reach the build plate under the per-layer motion limit. Defined by an
//!   upward sweep: the previous layer's avoidance inset by `max_move`,
//!   smoothed, unioned with the current collision.
//! - `internal_model(r, z)` — avoidance minus collision: the interior of the
//!   model where a branch that cannot escape must live.
//!
//! Requested radii are quantized to multiples of the sample resolution, and
//! results are memoized per (radius bucket, layer). The caches are internally
//! synchronized; values are published behind `Arc` and never mutated after
//! insertion, so readers may hold them for the lifetime of the volumes.

use crate::clipper::{self, OffsetJoinType};
use crate::config::TreeParams;
use crate::geometry::ExPolygons;
use crate::storage::SliceDataStorage;
use crate::Coord;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::border::calculate_machine_border;

/// Length below which inset spurs are smoothed away, in scaled units.
const SMOOTH_SHORTCUT: Coord = 5;

/// Cache key: quantized radius and layer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RadiusLayerKey {
    radius: Coord,
    layer: usize,
}

/// Internally synchronized polygon cache. Values are immutable once inserted;
/// a racing insert keeps the first value so lookups stay referentially
/// transparent.
#[derive(Debug, Default)]
struct RadiusLayerCache {
    data: RwLock<HashMap<RadiusLayerKey, Arc<ExPolygons>>>,
}

impl RadiusLayerCache {
    fn get(&self, key: &RadiusLayerKey) -> Option<Arc<ExPolygons>> {
        self.data.read().unwrap().get(key).cloned()
    }

    fn insert(&self, key: RadiusLayerKey, value: ExPolygons) -> Arc<ExPolygons> {
        let mut data = self.data.write().unwrap();
        data.entry(key).or_insert_with(|| Arc::new(value)).clone()
    }

    /// Highest layer at or below `layer` cached for this radius.
    fn highest_cached_layer(&self, radius: Coord, layer: usize) -> Option<usize> {
        self.data
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.radius == radius && k.layer <= layer)
            .map(|k| k.layer)
            .max()
    }
}

/// Provider of keep-out regions per (branch radius, layer).
#[derive(Debug)]
pub struct ModelVolumes {
    params: TreeParams,
    machine_border: ExPolygons,
    layer_outlines: Vec<ExPolygons>,
    collision_cache: RadiusLayerCache,
    avoidance_cache: RadiusLayerCache,
    internal_cache: RadiusLayerCache,
}

impl ModelVolumes {
    /// Snapshot the combined layer outlines and machine border from the
    /// slicer storage.
    pub fn new(params: &TreeParams, storage: &SliceDataStorage) -> Self {
        let machine_border = calculate_machine_border(storage, params);
        let layer_outlines = (0..storage.layer_count())
            .map(|layer_nr| storage.layer_outlines(layer_nr))
            .collect();
        Self::from_parts(params.clone(), machine_border, layer_outlines)
    }

    /// Construct from already-assembled outlines. Useful for tests.
    pub fn from_parts(
        params: TreeParams,
        machine_border: ExPolygons,
        layer_outlines: Vec<ExPolygons>,
    ) -> Self {
        Self {
            params,
            machine_border,
            layer_outlines,
            collision_cache: RadiusLayerCache::default(),
            avoidance_cache: RadiusLayerCache::default(),
            internal_cache: RadiusLayerCache::default(),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layer_outlines.len()
    }

    /// The combined model outline snapshot for a layer.
    pub fn layer_outline(&self, layer: usize) -> &[crate::geometry::ExPolygon] {
        self.layer_outlines
            .get(layer)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Quantize a radius to the nearest multiple of the sample resolution.
    pub fn bucket(&self, radius: Coord) -> Coord {
        let resolution = self.params.radius_sample_resolution;
        ((radius as f64 / resolution as f64).round() as Coord) * resolution
    }

    /// Positions a branch of the given radius cannot occupy on this layer.
    pub fn collision(&self, radius: Coord, layer: usize) -> Arc<ExPolygons> {
        let key = RadiusLayerKey {
            radius: self.bucket(radius),
            layer,
        };
        if let Some(hit) = self.collision_cache.get(&key) {
            return hit;
        }

        let outline = self
            .layer_outlines
            .get(layer)
            .cloned()
            .unwrap_or_default();
        let combined = clipper::union(&outline, &self.machine_border);
        let grown = clipper::offset(
            &combined,
            self.params.xy_distance + key.radius,
            OffsetJoinType::Round,
        );
        self.collision_cache.insert(key, grown)
    }

    /// Positions from which a branch of the given radius can no longer be
    /// routed to the build plate.
    pub fn avoidance(&self, radius: Coord, layer: usize) -> Arc<ExPolygons> {
        let bucket = self.bucket(radius);
        let key = RadiusLayerKey {
            radius: bucket,
            layer,
        };
        if let Some(hit) = self.avoidance_cache.get(&key) {
            return hit;
        }

        // Fill iteratively from the highest layer already computed; the sweep
        // is defined recursively but tall prints would blow the stack.
        let mut start = self
            .avoidance_cache
            .highest_cached_layer(bucket, layer)
            .map(|l| l + 1)
            .unwrap_or(0);

        let mut previous = if start == 0 {
            let base = self.collision(bucket, 0);
            let base = self.avoidance_cache.insert(
                RadiusLayerKey {
                    radius: bucket,
                    layer: 0,
                },
                (*base).clone(),
            );
            start = 1;
            base
        } else {
            self.avoidance_cache
                .get(&RadiusLayerKey {
                    radius: bucket,
                    layer: start - 1,
                })
                .expect("avoidance sweep lost its previous layer")
        };

        for z in start..=layer {
            let reachable = if self.params.max_move == Coord::MAX {
                // Unbounded motion: any position outside the current
                // collision can still escape.
                Vec::new()
            } else {
                let inset = clipper::offset(&previous, -self.params.max_move, OffsetJoinType::Round);
                clipper::smooth(&inset, SMOOTH_SHORTCUT)
            };
            let swept = clipper::union(&reachable, &self.collision(bucket, z));
            previous = self.avoidance_cache.insert(
                RadiusLayerKey {
                    radius: bucket,
                    layer: z,
                },
                swept,
            );
        }

        previous
    }

    /// Inside the model but not the model itself: where interior branches of
    /// the given radius are allowed to live.
    pub fn internal_model(&self, radius: Coord, layer: usize) -> Arc<ExPolygons> {
        let key = RadiusLayerKey {
            radius: self.bucket(radius),
            layer,
        };
        if let Some(hit) = self.internal_cache.get(&key) {
            return hit;
        }

        let avoidance = self.avoidance(key.radius, layer);
        let collision = self.collision(key.radius, layer);
        let internal = clipper::difference(&avoidance, &collision);
        self.internal_cache.insert(key, internal)
    }

    /// Fill the caches for every radius bucket a branch can reach over the
    /// print. Collision is independent per key; avoidance sweeps upward per
    /// bucket, so the parallelism is across buckets.
    pub fn precalculate(&self, max_layer: usize) {
        let n_layers = self.layer_count();
        if n_layers == 0 {
            return;
        }
        let max_layer = max_layer.min(n_layers - 1);

        let resolution = self.params.radius_sample_resolution;
        let maximum_radius = self.params.maximum_radius(n_layers);
        let buckets: Vec<Coord> = (0..)
            .map(|i| i * resolution)
            .take_while(|r| *r <= maximum_radius + resolution)
            .collect();
        debug!(
            buckets = buckets.len(),
            layers = max_layer + 1,
            "precalculating model volumes"
        );

        buckets.par_iter().for_each(|&radius| {
            for layer in 0..=max_layer {
                let _ = self.collision(radius, layer);
            }
        });

        buckets.par_iter().for_each(|&radius| {
            let _ = self.avoidance(radius, max_layer);
        });
    }
}

//! Layer-by-layer downward propagation of the node forest.
//!
//! Starting from the highest contact layer, each iteration rewrites the
//! working set one layer lower: every node grows a copy of itself below,
//! nearby branches merge along a minimum spanning tree, nodes shift to stay
//! clear of the model while drifting towards their neighbours, and branches
//! that end up unsupportable are pruned with everything they carry.

use crate::geometry::{polygon_utils, Point};
use crate::Coord;
use std::collections::HashMap;
use tracing::debug;

use super::mst::MinimumSpanningTree;
use super::node::{Forest, NodeId};
use super::volumes::ModelVolumes;
use crate::config::TreeParams;

/// Extra slack allowed on top of the per-layer motion limit when escaping an
/// avoidance region, to absorb radius-bucket rounding. 100 micrometers.
const SAMPLE_SLACK: Coord = 100;

/// Owns the forest while walking it down to the build plate.
pub struct Dropper<'a> {
    params: &'a TreeParams,
    volumes: &'a ModelVolumes,
    forest: Forest,
    /// Nodes at the layer currently being written, in insertion order.
    trees: Vec<NodeId>,
    /// Branches that terminated on the model: their topmost surviving node
    /// is a root above layer 0.
    model_roots: Vec<NodeId>,
}

impl<'a> Dropper<'a> {
    pub fn new(params: &'a TreeParams, volumes: &'a ModelVolumes, forest: Forest) -> Self {
        Self {
            params,
            volumes,
            forest,
            trees: Vec::new(),
            model_roots: Vec::new(),
        }
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn into_forest(self) -> Forest {
        self.forest
    }

    /// Surviving roots after a completed run: layer-0 nodes plus branches
    /// that terminated on the model at a higher layer.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .trees
            .iter()
            .chain(self.model_roots.iter())
            .copied()
            .filter(|&id| self.forest.is_live(id))
            .collect();
        roots.sort_by_key(|&id| self.forest.get(id).layer);
        roots
    }

    /// Walk the forest from the highest contact layer down to the build
    /// plate. `contacts` holds the seeded contact nodes in any order.
    pub fn run(&mut self, mut contacts: Vec<NodeId>) {
        contacts.retain(|&id| self.forest.is_live(id));
        if contacts.is_empty() {
            return;
        }
        contacts.sort_by_key(|&id| std::cmp::Reverse(self.forest.get(id).layer));

        let top_layer = self.forest.get(contacts[0]).layer;
        let mut next_contact = 0;

        for layer in (1..=top_layer).rev() {
            while next_contact < contacts.len()
                && self.forest.get(contacts[next_contact]).layer == layer
            {
                self.trees.push(contacts[next_contact]);
                next_contact += 1;
            }
            if self.trees.is_empty() {
                continue;
            }
            self.process_layer(layer);
        }

        debug!(
            roots = self.trees.len(),
            live_nodes = self.forest.live_count(),
            "dropper finished"
        );
    }

    /// One descent iteration: write layer `layer - 1` from the working set at
    /// `layer`.
    fn process_layer(&mut self, layer: usize) {
        let target = layer - 1;
        let mut unsupported: Vec<NodeId> = Vec::new();

        // Drop every node one layer straight down. Ownership of the old node
        // transfers to its grown copy.
        let dropped: Vec<NodeId> = self
            .trees
            .drain(..)
            .map(|id| self.forest.drop_to_next_layer(id, self.params.radius_increment))
            .collect();

        // Branches that may only rest on the build plate die here if the
        // escape from the avoidance field is already out of reach.
        if !self.params.can_support_on_model {
            for &id in &dropped {
                let node = self.forest.get(id);
                let avoidance = self.volumes.avoidance(node.radius, target);
                if polygon_utils::contains(&avoidance, &node.position) {
                    let escape_sq =
                        polygon_utils::distance_to_boundary_squared(&node.position, &avoidance);
                    if escape_sq > max_move_squared(self.params.max_move) {
                        unsupported.push(id);
                    }
                }
            }
        }

        let groups = self.group_by_region(&dropped, target, &unsupported);

        for (group_index, group) in groups.iter().enumerate() {
            self.merge_group(group);
            // Re-collect survivors; merging tombstones absorbed nodes.
            let survivors: Vec<NodeId> = group
                .iter()
                .copied()
                .filter(|&id| self.forest.is_live(id))
                .collect();
            self.move_group(&survivors, group_index, target, &mut unsupported);
        }

        self.merge_position_conflicts(&dropped);
        self.prune_unsupported(unsupported);

        self.trees = dropped
            .into_iter()
            .filter(|&id| self.forest.is_live(id))
            .collect();
    }

    /// Split the avoidance field at the target layer into connected parts and
    /// assign each node to the part it lies in. Nodes outside every part form
    /// group 0, the to-build-plate group.
    fn group_by_region(
        &self,
        dropped: &[NodeId],
        target: usize,
        unsupported: &[NodeId],
    ) -> Vec<Vec<NodeId>> {
        let avoidance = self.volumes.avoidance(0, target);
        let parts = &*avoidance;

        let mut groups: Vec<Vec<NodeId>> = vec![Vec::new(); parts.len() + 1];
        for &id in dropped {
            if !self.forest.is_live(id) || unsupported.contains(&id) {
                continue;
            }
            // Without the option to rest on the model there is no interior
            // landing; every surviving branch routes to the plate.
            if !self.params.can_support_on_model {
                groups[0].push(id);
                continue;
            }
            let position = self.forest.get(id).position;

            let best = parts
                .iter()
                .enumerate()
                .filter(|(_, part)| part.contains_point(&position))
                .map(|(index, part)| {
                    let dist = part
                        .closest_point_on_boundary(&position)
                        .map(|c| position.distance_squared(&c))
                        .unwrap_or(0);
                    (dist, index)
                })
                .min();

            match best {
                Some((_, index)) => groups[index + 1].push(id),
                None => groups[0].push(id),
            }
        }
        groups
    }

    /// One merge pass over a group, guided by its minimum spanning tree.
    fn merge_group(&mut self, group: &[NodeId]) {
        if group.len() < 2 {
            return;
        }

        let positions: Vec<Point> = group.iter().map(|&id| self.forest.get(id).position).collect();
        let by_position: HashMap<Point, NodeId> =
            positions.iter().copied().zip(group.iter().copied()).collect();
        let mst = MinimumSpanningTree::new(positions);
        let max_move_sq = max_move_squared(self.params.max_move);

        for &id in group {
            if !self.forest.is_live(id) {
                continue;
            }
            let position = self.forest.get(id).position;
            let neighbours = mst.adjacent_nodes(&position);

            if neighbours.len() == 1 {
                // A pair of leaves close together collapses to its midpoint.
                let neighbour = neighbours[0];
                if position.distance_squared(&neighbour) < max_move_sq
                    && mst.adjacent_nodes(&neighbour).len() == 1
                {
                    let Some(&partner) = by_position.get(&neighbour) else {
                        continue;
                    };
                    if partner == id || !self.forest.is_live(partner) {
                        continue;
                    }
                    let midpoint = (position + neighbour) / 2;
                    self.forest.absorb(id, partner);
                    self.forest.get_mut(id).position = midpoint;
                }
            } else if neighbours.len() >= 2 {
                // A hub absorbs every neighbour within reach.
                for neighbour in neighbours {
                    if position.distance_squared(neighbour) >= max_move_sq {
                        continue;
                    }
                    let Some(&partner) = by_position.get(neighbour) else {
                        continue;
                    };
                    if partner == id || !self.forest.is_live(partner) {
                        continue;
                    }
                    self.forest.absorb(id, partner);
                }
            }
        }
    }

    /// Move every surviving node of a group to its position on the target
    /// layer. Nodes that cannot reach a feasible position are queued for
    /// pruning.
    fn move_group(
        &mut self,
        group: &[NodeId],
        group_index: usize,
        target: usize,
        unsupported: &mut Vec<NodeId>,
    ) {
        if group.is_empty() {
            return;
        }

        let mst_positions: Vec<Point> =
            group.iter().map(|&id| self.forest.get(id).position).collect();
        let mst = MinimumSpanningTree::new(mst_positions);
        let max_move = self.params.max_move;
        let max_move_sq = max_move_squared(max_move);

        for &id in group {
            let (origin, radius) = {
                let node = self.forest.get(id);
                (node.position, node.radius)
            };

            // A branch whose next position sits deeper in the collision band
            // than its own stamp reaches has hit the model surface: it
            // terminates there, or dies if it may only rest on the plate.
            if group_index > 0 {
                let collision = self.volumes.collision(0, target);
                if polygon_utils::contains(&collision, &origin) {
                    let boundary_sq =
                        polygon_utils::distance_to_boundary_squared(&origin, &collision);
                    if boundary_sq >= (radius as i128) * (radius as i128) {
                        if self.params.can_support_on_model {
                            self.terminate_on_model(id);
                        } else {
                            unsupported.push(id);
                        }
                        continue;
                    }
                }
            }

            let mut next = origin;

            // Drift towards the neighbourhood: branches that approach each
            // other merge on a later layer.
            let neighbours = mst.adjacent_nodes(&origin);
            let collapsing = neighbours.len() == 1
                && origin.distance_squared(&neighbours[0]) < max_move_sq;
            if !neighbours.is_empty() && !collapsing {
                let sum = neighbours
                    .iter()
                    .fold(Point::zero(), |acc, n| acc + *n);
                let mean = sum / neighbours.len() as Coord;
                next = if group_index == 0 {
                    // Routed to the plate: step towards the neighbours but
                    // never into the avoidance field.
                    let avoidance = self.volumes.avoidance(radius, target);
                    polygon_utils::move_towards(&origin, &mean, &avoidance, max_move)
                } else {
                    let diff = mean - origin;
                    if diff.length_squared() > max_move_sq {
                        origin + diff.with_length(max_move)
                    } else {
                        mean
                    }
                };
            }

            let moved = if group_index == 0 {
                self.move_to_buildplate_position(next, radius, target)
            } else {
                self.move_to_interior_position(origin, next, radius, target)
            };

            let Some(final_position) = moved else {
                if group_index > 0 && self.params.can_support_on_model {
                    // No interior left to stand in: the model itself is
                    // below. The branch ends here, resting on it.
                    self.terminate_on_model(id);
                } else {
                    unsupported.push(id);
                }
                continue;
            };

            // The slack beyond max_move absorbs radius bucketing, nothing
            // more.
            let budget = max_move
                .saturating_add(self.params.radius_sample_resolution)
                .saturating_add(SAMPLE_SLACK);
            if origin.distance_squared(&final_position)
                > (budget as i128) * (budget as i128)
            {
                unsupported.push(id);
                continue;
            }

            let avoidance = self.volumes.avoidance(radius, target);
            let node = self.forest.get_mut(id);
            node.position = final_position;
            node.to_buildplate = !polygon_utils::contains(&avoidance, &final_position);
        }
    }

    /// Group 0: push the node out of the avoidance field so the branch keeps
    /// its route to the build plate.
    fn move_to_buildplate_position(
        &self,
        position: Point,
        radius: Coord,
        target: usize,
    ) -> Option<Point> {
        let avoidance = self.volumes.avoidance(radius, target);
        let slack = self.params.radius_sample_resolution + SAMPLE_SLACK;
        let reach = self.params.max_move.saturating_add(slack);
        polygon_utils::move_outside(
            &avoidance,
            &position,
            slack,
            (reach as i128) * (reach as i128),
        )
    }

    /// Interior groups: pull the node deeper into the internal-guide region,
    /// towards the medial axis of the part, so branches stop hugging walls.
    fn move_to_interior_position(
        &self,
        origin: Point,
        position: Point,
        radius: Coord,
        target: usize,
    ) -> Option<Point> {
        let internal = self.volumes.internal_model(radius, target);
        if internal.is_empty() {
            return None;
        }

        let closest = polygon_utils::find_closest(&position, &internal)?;
        let distance = origin.distance(&closest) as Coord;
        let inward = if polygon_utils::contains(&internal, &position) {
            position - closest
        } else {
            closest - position
        };
        let depth = distance.saturating_add(self.params.max_move);
        let deeper = if inward.length_squared() > 0 {
            closest + inward.with_length(depth)
        } else {
            closest
        };

        let diff = deeper - origin;
        let capped = if diff.length_squared() > max_move_squared(self.params.max_move) {
            diff.with_length(self.params.max_move)
        } else {
            diff
        };
        Some(origin + capped)
    }

    /// End a branch on the model: the dropped copy is discarded and its
    /// children become roots resting on the layer below them.
    fn terminate_on_model(&mut self, dropped_id: NodeId) {
        let children = std::mem::take(&mut self.forest.get_mut(dropped_id).children);
        for &child in &children {
            self.forest.get_mut(child).parent = None;
            self.model_roots.push(child);
        }
        // With the children detached only the discarded copy itself goes;
        // its merged peers are empty husks whose subtrees were transferred.
        let _ = self.forest.remove_subtree(dropped_id);
    }

    /// Two nodes that land on identical coordinates merge; positions within a
    /// layer stay pairwise distinct.
    fn merge_position_conflicts(&mut self, dropped: &[NodeId]) {
        let mut seen: HashMap<Point, NodeId> = HashMap::new();
        for &id in dropped {
            if !self.forest.is_live(id) {
                continue;
            }
            let position = self.forest.get(id).position;
            match seen.get(&position) {
                Some(&keeper) => self.forest.absorb(keeper, id),
                None => {
                    seen.insert(position, id);
                }
            }
        }
    }

    /// Remove queued mid-air branches together with everything they support,
    /// cascading through merged peers.
    fn prune_unsupported(&mut self, mut queue: Vec<NodeId>) {
        let mut pruned = 0usize;
        while let Some(id) = queue.pop() {
            if !self.forest.is_live(id) {
                continue;
            }
            queue.extend(self.forest.remove_subtree(id));
            pruned += 1;
        }
        if pruned > 0 {
            debug!(pruned, "removed unsupportable branches");
        }
    }
}

fn max_move_squared(max_move: Coord) -> i128 {
    (max_move as i128) * (max_move as i128)
}

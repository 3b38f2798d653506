//! The node forest.
//!
//! Branches form trees: a contact node at the top, one node per layer below
//! it, down to a root on the build plate (or on the model). Children sit one
//! layer above their parent and are owned by it; the parent link is a plain
//! back-reference. Nodes live in an arena and are addressed by index, which
//! keeps the upward/downward links free of ownership cycles.

use crate::geometry::Point;
use crate::Coord;

/// Index of a node in the [`Forest`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// One vertex of a support tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub position: Point,
    /// Branch radius at this node. Non-decreasing from child to parent.
    pub radius: Coord,
    pub layer: usize,
    /// Layers between this node and the contact above it along its ancestry.
    /// Drives tip tapering and roof classification.
    pub distance_to_top: usize,
    /// Orientation of the skin lines above the branch tip; selects the shear
    /// direction of tapered stamps.
    pub skin_direction: bool,
    /// Roof thickness requested by the mesh this branch supports.
    pub roof_layers: usize,
    /// Whether this node can still reach the build plate.
    pub to_buildplate: bool,
    /// Nodes one layer above, owned by this node.
    pub children: Vec<NodeId>,
    /// Back-reference one layer below. Never an ownership edge.
    pub parent: Option<NodeId>,
    /// Peers fused into this node on its own layer. Only consulted when
    /// pruning mid-air branches.
    pub merged_neighbours: Vec<NodeId>,
    deleted: bool,
}

impl Node {
    /// A fresh contact node with no children.
    pub fn contact(
        position: Point,
        radius: Coord,
        layer: usize,
        skin_direction: bool,
        roof_layers: usize,
    ) -> Self {
        Self {
            position,
            radius,
            layer,
            distance_to_top: 0,
            skin_direction,
            roof_layers,
            to_buildplate: true,
            children: Vec::new(),
            parent: None,
            merged_neighbours: Vec::new(),
            deleted: false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Arena of nodes. Removal is by tombstone; the dropper's working set and the
/// rasterizer skip deleted nodes.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: Vec<Node>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        !self.get(id).deleted
    }

    /// Grow a new node one layer below `child`, adopting it as the sole
    /// child. Ownership of the old node transfers to the new one.
    pub fn drop_to_next_layer(&mut self, child_id: NodeId, radius_increment: Coord) -> NodeId {
        let child = self.get(child_id);
        let dropped = Node {
            position: child.position,
            radius: child.radius.saturating_add(radius_increment),
            layer: child.layer - 1,
            distance_to_top: child.distance_to_top + 1,
            skin_direction: child.skin_direction,
            roof_layers: child.roof_layers,
            to_buildplate: child.to_buildplate,
            children: vec![child_id],
            parent: None,
            merged_neighbours: Vec::new(),
            deleted: false,
        };
        let id = self.alloc(dropped);
        self.get_mut(child_id).parent = Some(id);
        id
    }

    /// Absorb `victim` into `survivor` on the same layer: take the larger
    /// radius and ancestry metadata, transfer children and the
    /// merged-neighbour set, and record the victim as a merged peer. The
    /// victim is tombstoned.
    pub fn absorb(&mut self, survivor_id: NodeId, victim_id: NodeId) {
        debug_assert_eq!(self.get(survivor_id).layer, self.get(victim_id).layer);

        let victim = self.get_mut(victim_id);
        victim.deleted = true;
        let children = std::mem::take(&mut victim.children);
        let merged = std::mem::take(&mut victim.merged_neighbours);
        let victim_radius = victim.radius;
        let victim_distance = victim.distance_to_top;
        let victim_roof = victim.roof_layers;
        let victim_to_buildplate = victim.to_buildplate;

        for &child in &children {
            self.get_mut(child).parent = Some(survivor_id);
        }

        let survivor = self.get_mut(survivor_id);
        survivor.radius = survivor.radius.max(victim_radius);
        survivor.distance_to_top = survivor.distance_to_top.max(victim_distance);
        survivor.roof_layers = survivor.roof_layers.max(victim_roof);
        survivor.to_buildplate = survivor.to_buildplate || victim_to_buildplate;
        survivor.children.extend(children);
        survivor.merged_neighbours.push(victim_id);
        survivor.merged_neighbours.extend(merged);
    }

    /// Tombstone a node and everything it supports (its transitive
    /// children). Returns the merged peers of every removed node so the
    /// caller can cascade the removal.
    pub fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut requeue = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.get_mut(current);
            if node.deleted {
                continue;
            }
            node.deleted = true;
            requeue.extend(node.merged_neighbours.iter().copied());
            stack.extend(node.children.iter().copied());
        }
        requeue
    }

    /// Live node ids grouped by layer, in allocation order.
    pub fn live_by_layer(&self, n_layers: usize) -> Vec<Vec<NodeId>> {
        let mut layers = vec![Vec::new(); n_layers];
        for (index, node) in self.nodes.iter().enumerate() {
            if !node.deleted && node.layer < n_layers {
                layers[node.layer].push(NodeId(index as u32));
            }
        }
        layers
    }

    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }
}

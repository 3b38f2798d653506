//! Minimum spanning tree over node positions.
//!
//! Rebuilt from scratch each layer; the node set and positions change every
//! descent step. A naive O(n²) Prim is plenty for the layer populations seen
//! in practice. Ties on edge length break on the lexicographic order of the
//! endpoint coordinates so runs are deterministic.

use crate::geometry::Point;
use std::collections::HashMap;

/// Undirected MST represented as an adjacency map from vertex position to
/// neighbour positions.
#[derive(Debug, Default)]
pub struct MinimumSpanningTree {
    adjacency: HashMap<Point, Vec<Point>>,
}

impl MinimumSpanningTree {
    pub fn new(mut points: Vec<Point>) -> Self {
        points.sort_unstable();
        points.dedup();

        let mut adjacency: HashMap<Point, Vec<Point>> = HashMap::with_capacity(points.len());
        for p in &points {
            adjacency.insert(*p, Vec::new());
        }
        if points.len() < 2 {
            return Self { adjacency };
        }

        let n = points.len();
        let mut in_tree = vec![false; n];
        // best_dist[i]: squared distance from vertex i to the tree,
        // best_from[i]: the tree vertex realizing it.
        let mut best_dist = vec![i128::MAX; n];
        let mut best_from = vec![0usize; n];

        in_tree[0] = true;
        for i in 1..n {
            best_dist[i] = points[0].distance_squared(&points[i]);
            best_from[i] = 0;
        }

        for _ in 1..n {
            // Pick the closest outside vertex; ties resolve to the
            // lexicographically smallest endpoint pair.
            let mut chosen: Option<usize> = None;
            for i in 0..n {
                if in_tree[i] {
                    continue;
                }
                let better = match chosen {
                    None => true,
                    Some(c) => {
                        (best_dist[i], points[best_from[i]], points[i])
                            < (best_dist[c], points[best_from[c]], points[c])
                    }
                };
                if better {
                    chosen = Some(i);
                }
            }

            let i = chosen.expect("disconnected point set in MST");
            in_tree[i] = true;
            let from = points[best_from[i]];
            adjacency.get_mut(&from).unwrap().push(points[i]);
            adjacency.get_mut(&points[i]).unwrap().push(from);

            for j in 0..n {
                if in_tree[j] {
                    continue;
                }
                let dist = points[i].distance_squared(&points[j]);
                if (dist, points[i]) < (best_dist[j], points[best_from[j]]) {
                    best_dist[j] = dist;
                    best_from[j] = i;
                }
            }
        }

        Self { adjacency }
    }

    /// Neighbours of a vertex. Empty for unknown positions.
    pub fn adjacent_nodes(&self, p: &Point) -> &[Point] {
        self.adjacency.get(p).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }
}

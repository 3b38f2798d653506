//! Polygons with holes.

use super::{BoundingBox, Point, Polygon};
use crate::Coord;
use serde::{Deserialize, Serialize};

/// A polygon with holes: an outer contour plus interior hole contours.
///
/// The contour is counter-clockwise, holes are clockwise. One `ExPolygon` is
/// always a single connected region, which makes a `Vec<ExPolygon>` double as
/// a "split into parts" representation of a larger area.
#[derive(Clone, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExPolygon {
    pub contour: Polygon,
    pub holes: Vec<Polygon>,
}

/// A set of disjoint regions.
pub type ExPolygons = Vec<ExPolygon>;

impl ExPolygon {
    #[inline]
    pub fn new(contour: Polygon) -> Self {
        Self {
            contour,
            holes: Vec::new(),
        }
    }

    #[inline]
    pub fn with_holes(contour: Polygon, holes: Vec<Polygon>) -> Self {
        Self { contour, holes }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contour.is_empty()
    }

    /// Area of the contour minus the hole areas.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| h.area()).sum();
        self.contour.area() - holes
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.contour.bounding_box()
    }

    /// Inside the contour and not inside any hole.
    pub fn contains_point(&self, p: &Point) -> bool {
        if !self.contour.contains_point(p) {
            return false;
        }
        !self.holes.iter().any(|hole| hole.contains_point(p))
    }

    /// Closest point on any boundary ring (contour or hole).
    pub fn closest_point_on_boundary(&self, p: &Point) -> Option<Point> {
        let mut best: Option<Point> = None;
        let mut best_dist = i128::MAX;

        for ring in std::iter::once(&self.contour).chain(self.holes.iter()) {
            if let Some((candidate, _)) = ring.closest_point_on_boundary(p) {
                let dist = p.distance_squared(&candidate);
                if dist < best_dist {
                    best_dist = dist;
                    best = Some(candidate);
                }
            }
        }

        best
    }

    pub fn translate(&mut self, v: Point) {
        self.contour.translate(v);
        for hole in &mut self.holes {
            hole.translate(v);
        }
    }

    /// Simplify every ring. See [`Polygon::simplify`].
    pub fn simplify(&mut self, min_segment: Coord, max_deviation: Coord) {
        self.contour.simplify(min_segment, max_deviation);
        for hole in &mut self.holes {
            hole.simplify(min_segment, max_deviation);
        }
    }
}

impl From<Polygon> for ExPolygon {
    fn from(contour: Polygon) -> Self {
        Self::new(contour)
    }
}

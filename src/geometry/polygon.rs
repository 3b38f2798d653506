//! Closed polygon contours.

use super::{BoundingBox, Point};
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed polygon defined by a sequence of points.
///
/// The polygon is implicitly closed; the last point connects back to the
/// first. Outer contours are counter-clockwise (positive area), holes are
/// clockwise (negative area).
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    #[inline]
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    #[inline]
    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle from two opposite corners, counter-clockwise.
    pub fn rectangle(min: Point, max: Point) -> Self {
        Self::from_points(vec![
            Point::new(min.x, min.y),
            Point::new(max.x, min.y),
            Point::new(max.x, max.y),
            Point::new(min.x, max.y),
        ])
    }

    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut Vec<Point> {
        &mut self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Signed area by the shoelace formula. Positive for counter-clockwise.
    pub fn signed_area(&self) -> CoordF {
        if self.points.len() < 3 {
            return 0.0;
        }

        let mut sum: i128 = 0;
        for i in 0..self.points.len() {
            let j = (i + 1) % self.points.len();
            sum += self.points[i].x as i128 * self.points[j].y as i128;
            sum -= self.points[j].x as i128 * self.points[i].y as i128;
        }

        sum as CoordF / 2.0
    }

    #[inline]
    pub fn area(&self) -> CoordF {
        self.signed_area().abs()
    }

    #[inline]
    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area() > 0.0
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    pub fn reversed(&self) -> Self {
        let mut result = self.clone();
        result.reverse();
        result
    }

    pub fn translate(&mut self, v: Point) {
        for p in &mut self.points {
            *p += v;
        }
    }

    /// Centroid of the polygon area. Falls back to the vertex average for
    /// degenerate contours.
    pub fn centroid(&self) -> Point {
        if self.points.is_empty() {
            return Point::zero();
        }
        if self.points.len() < 3 {
            let sum_x: i128 = self.points.iter().map(|p| p.x as i128).sum();
            let sum_y: i128 = self.points.iter().map(|p| p.y as i128).sum();
            return Point::new(
                (sum_x / self.points.len() as i128) as Coord,
                (sum_y / self.points.len() as i128) as Coord,
            );
        }

        let mut cx: i128 = 0;
        let mut cy: i128 = 0;
        let mut area: i128 = 0;

        for i in 0..self.points.len() {
            let j = (i + 1) % self.points.len();
            let cross = self.points[i].x as i128 * self.points[j].y as i128
                - self.points[j].x as i128 * self.points[i].y as i128;
            cx += (self.points[i].x as i128 + self.points[j].x as i128) * cross;
            cy += (self.points[i].y as i128 + self.points[j].y as i128) * cross;
            area += cross;
        }

        if area == 0 {
            let sum_x: i128 = self.points.iter().map(|p| p.x as i128).sum();
            let sum_y: i128 = self.points.iter().map(|p| p.y as i128).sum();
            return Point::new(
                (sum_x / self.points.len() as i128) as Coord,
                (sum_y / self.points.len() as i128) as Coord,
            );
        }

        Point::new((cx / (3 * area)) as Coord, (cy / (3 * area)) as Coord)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Ray-casting point-in-polygon test.
    pub fn contains_point(&self, p: &Point) -> bool {
        if self.points.len() < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = self.points.len() - 1;

        for i in 0..self.points.len() {
            let pi = &self.points[i];
            let pj = &self.points[j];

            if ((pi.y > p.y) != (pj.y > p.y))
                && ((p.x as i128)
                    < (pj.x as i128 - pi.x as i128) * (p.y as i128 - pi.y as i128)
                        / (pj.y as i128 - pi.y as i128)
                        + pi.x as i128)
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }

    /// Closest point on the polygon boundary, with the index of the edge it
    /// lies on.
    pub fn closest_point_on_boundary(&self, p: &Point) -> Option<(Point, usize)> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 {
            return Some((self.points[0], 0));
        }

        let mut best = self.points[0];
        let mut best_edge = 0;
        let mut best_dist = i128::MAX;

        for i in 0..self.points.len() {
            let a = self.points[i];
            let b = self.points[(i + 1) % self.points.len()];
            let candidate = p.project_onto_segment(a, b);
            let dist = p.distance_squared(&candidate);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
                best_edge = i;
            }
        }

        Some((best, best_edge))
    }

    /// Remove short segments, keeping the outline within `max_deviation` of
    /// the original. Collinear runs and micrometre spurs from offsetting
    /// collapse to single segments.
    pub fn simplify(&mut self, min_segment: Coord, max_deviation: Coord) {
        if self.points.len() <= 3 {
            return;
        }

        let max_dev_sq = (max_deviation as i128) * (max_deviation as i128);
        let min_seg_sq = (min_segment as i128) * (min_segment as i128);
        let mut kept: Vec<Point> = Vec::with_capacity(self.points.len());

        for i in 0..self.points.len() {
            let current = self.points[i];
            let next = self.points[(i + 1) % self.points.len()];

            let Some(&prev) = kept.last() else {
                kept.push(current);
                continue;
            };

            let short = prev.distance_squared(&current) < min_seg_sq;
            let deviation = current.project_onto_segment(prev, next);
            if short && current.distance_squared(&deviation) <= max_dev_sq {
                continue;
            }
            kept.push(current);
        }

        if kept.len() >= 3 {
            self.points = kept;
        }
    }
}

impl fmt::Debug for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polygon({} points)", self.points.len())
    }
}

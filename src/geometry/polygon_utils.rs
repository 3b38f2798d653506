//! Point-vs-region helpers shared by the contact seeder and the dropper.
//!
//! These operate on region sets (`&[ExPolygon]`) and implement the small
//! vocabulary of moves the tree needs: "am I inside", "closest boundary
//! point", "step inside this part", "escape this region", "walk towards a
//! target without entering a forbidden region".

use super::{ExPolygon, Point};
use crate::Coord;

/// How far past a boundary a relocated point is placed, so that the
/// subsequent inside/outside test is unambiguous on integer coordinates.
const BOUNDARY_NUDGE: Coord = 10;

/// True if the point lies inside any region of the set.
pub fn contains(areas: &[ExPolygon], p: &Point) -> bool {
    areas.iter().any(|area| area.contains_point(p))
}

/// Closest point on any boundary of the set.
pub fn find_closest(p: &Point, areas: &[ExPolygon]) -> Option<Point> {
    let mut best: Option<Point> = None;
    let mut best_dist = i128::MAX;

    for area in areas {
        if let Some(candidate) = area.closest_point_on_boundary(p) {
            let dist = p.distance_squared(&candidate);
            if dist < best_dist {
                best_dist = dist;
                best = Some(candidate);
            }
        }
    }

    best
}

/// Distance from the point to the nearest boundary of the set, squared.
/// `i128::MAX` when the set is empty.
pub fn distance_to_boundary_squared(p: &Point, areas: &[ExPolygon]) -> i128 {
    find_closest(p, areas)
        .map(|c| p.distance_squared(&c))
        .unwrap_or(i128::MAX)
}

/// Move a point into `part` if it is within `sqrt(max_dist_sq)` of it.
///
/// A point already inside is returned unchanged. Otherwise the point is
/// relocated just inside the nearest boundary. Returns `None` when the part
/// is too far away or degenerate.
pub fn move_inside(part: &ExPolygon, p: &Point, max_dist_sq: i128) -> Option<Point> {
    if part.contains_point(p) {
        return Some(*p);
    }

    let closest = part.closest_point_on_boundary(p)?;
    if p.distance_squared(&closest) > max_dist_sq {
        return None;
    }

    step_over_boundary(part, closest, p, true)
}

/// Move a point out of every region of the set if it is inside one.
///
/// The point is relocated `extra` beyond the nearest boundary. Returns `None`
/// when the required move exceeds `sqrt(max_dist_sq)` or no exit is found.
pub fn move_outside(
    areas: &[ExPolygon],
    p: &Point,
    extra: Coord,
    max_dist_sq: i128,
) -> Option<Point> {
    if !contains(areas, p) {
        return Some(*p);
    }

    let closest = find_closest(p, areas)?;
    let away = closest - *p;
    let candidate = if away.length_squared() > 0 {
        closest + away.with_length(extra.max(BOUNDARY_NUDGE))
    } else {
        // Already on the boundary; probe perpendicular to the nearest edge.
        let area = areas.iter().find(|a| a.contains_point(p))?;
        step_over_boundary(area, closest, p, false)?
    };

    let candidate = if contains(areas, &candidate) {
        // Overshot into a neighbouring region (e.g. a narrow channel); fall
        // back to the boundary point itself nudged outward.
        let area = areas.iter().find(|a| a.contains_point(&candidate))?;
        step_over_boundary(area, closest, p, false)?
    } else {
        candidate
    };

    if p.distance_squared(&candidate) > max_dist_sq {
        return None;
    }
    Some(candidate)
}

/// Move from `p` towards `target`, at most `limit` far, and escape `invalid`
/// if the step lands inside it.
pub fn move_towards(p: &Point, target: &Point, invalid: &[ExPolygon], limit: Coord) -> Point {
    let diff = *target - *p;
    let new_pos = if diff.length_squared() > (limit as i128) * (limit as i128) {
        *p + diff.with_length(limit)
    } else {
        *target
    };

    if contains(invalid, &new_pos) {
        move_outside(invalid, &new_pos, BOUNDARY_NUDGE, (limit as i128) * (limit as i128))
            .unwrap_or(*p)
    } else {
        new_pos
    }
}

/// Place a point just on the chosen side of a boundary point. `inward`
/// selects the side that is inside `area`.
fn step_over_boundary(area: &ExPolygon, boundary: Point, from: &Point, inward: bool) -> Option<Point> {
    // Try along the approach direction first, then both edge perpendiculars.
    let mut directions = Vec::with_capacity(3);
    let approach = boundary - *from;
    if approach.length_squared() > 0 {
        directions.push(approach.with_length(BOUNDARY_NUDGE));
    }
    let (_, edge) = area.contour.closest_point_on_boundary(&boundary)?;
    let pts = area.contour.points();
    if pts.len() >= 2 {
        let a = pts[edge];
        let b = pts[(edge + 1) % pts.len()];
        let dir = b - a;
        let perp = Point::new(-dir.y, dir.x).with_length(BOUNDARY_NUDGE);
        directions.push(perp);
        directions.push(-perp);
    }

    directions
        .into_iter()
        .map(|d| boundary + d)
        .find(|candidate| area.contains_point(candidate) == inward)
}

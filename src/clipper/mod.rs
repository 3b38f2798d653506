//! Polygon Boolean operations and offsets.
//!
//! Thin wrapper over the geo-clipper library, converting between the crate's
//! scaled-integer polygons and geo's floating-point types. Union, difference,
//! intersection and Minkowski offsets with round joins are everything the
//! support generator needs.
//!
//! The output of any operation here is a set of disjoint `ExPolygon` parts,
//! so "split into connected parts" is simply the result vector itself.

use crate::geometry::{ExPolygon, ExPolygons, Point, Polygon};
use crate::{scale, unscale, Coord};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

/// Precision factor handed to the clipper backend.
const CLIPPER_FACTOR: f64 = 1000.0;

/// Join style for offset corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetJoinType {
    Square,
    #[default]
    Round,
    Miter,
}

impl From<OffsetJoinType> for JoinType {
    fn from(jt: OffsetJoinType) -> Self {
        match jt {
            OffsetJoinType::Square => JoinType::Square,
            OffsetJoinType::Round => JoinType::Round(0.25),
            OffsetJoinType::Miter => JoinType::Miter(2.0),
        }
    }
}

fn ring_to_geo(ring: &Polygon) -> LineString<f64> {
    let mut coords: Vec<GeoCoord<f64>> = ring
        .points()
        .iter()
        .map(|p| GeoCoord {
            x: unscale(p.x),
            y: unscale(p.y),
        })
        .collect();

    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }

    LineString::new(coords)
}

fn expolygon_to_geo(expoly: &ExPolygon) -> GeoPolygon<f64> {
    let holes = expoly.holes.iter().map(ring_to_geo).collect();
    GeoPolygon::new(ring_to_geo(&expoly.contour), holes)
}

fn expolygons_to_geo(expolys: &[ExPolygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(expolys.iter().map(expolygon_to_geo).collect())
}

fn geo_ring_to_polygon(ring: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ring
        .coords()
        .map(|c| Point::new(scale(c.x), scale(c.y)))
        .collect();

    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    Polygon::from_points(points)
}

fn geo_to_expolygon(geo_poly: &GeoPolygon<f64>) -> ExPolygon {
    let contour = geo_ring_to_polygon(geo_poly.exterior());
    let holes = geo_poly.interiors().iter().map(geo_ring_to_polygon).collect();
    ExPolygon::with_holes(contour, holes)
}

fn geo_to_expolygons(multi: &MultiPolygon<f64>) -> ExPolygons {
    multi
        .0
        .iter()
        .map(geo_to_expolygon)
        .filter(|ex| ex.contour.len() >= 3)
        .collect()
}

/// Union of two region sets.
pub fn union(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() {
        return union_all(clip);
    }
    if clip.is_empty() {
        return union_all(subject);
    }

    let result = expolygons_to_geo(subject).union(&expolygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_expolygons(&result)
}

/// Union a single set of possibly-overlapping regions into disjoint parts.
pub fn union_all(polygons: &[ExPolygon]) -> ExPolygons {
    match polygons.len() {
        0 => vec![],
        1 => polygons.to_vec(),
        _ => {
            let multi = expolygons_to_geo(polygons);
            let empty = MultiPolygon::<f64>::new(vec![]);
            let result = multi.union(&empty, CLIPPER_FACTOR);
            geo_to_expolygons(&result)
        }
    }
}

/// Intersection of two region sets.
pub fn intersection(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() || clip.is_empty() {
        return vec![];
    }

    let result = expolygons_to_geo(subject).intersection(&expolygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_expolygons(&result)
}

/// Difference of two region sets (subject minus clip).
pub fn difference(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() {
        return vec![];
    }
    if clip.is_empty() {
        return subject.to_vec();
    }

    let result = expolygons_to_geo(subject).difference(&expolygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_expolygons(&result)
}

/// Minkowski offset by `delta` scaled units. Positive grows, negative
/// shrinks. Regions that collapse under a negative offset vanish.
pub fn offset(expolygons: &[ExPolygon], delta: Coord, join_type: OffsetJoinType) -> ExPolygons {
    if expolygons.is_empty() {
        return vec![];
    }
    if delta == 0 {
        return expolygons.to_vec();
    }

    let result = expolygons_to_geo(expolygons).offset(
        unscale(delta),
        join_type.into(),
        EndType::ClosedPolygon,
        CLIPPER_FACTOR,
    );
    geo_to_expolygons(&result)
}

/// Remove sub-`shortcut_length` spurs that insetting generates, without
/// deviating more than `shortcut_length` from the input outline.
pub fn smooth(expolygons: &[ExPolygon], shortcut_length: Coord) -> ExPolygons {
    expolygons
        .iter()
        .cloned()
        .map(|mut ex| {
            ex.simplify(shortcut_length, shortcut_length);
            ex
        })
        .filter(|ex| ex.contour.len() >= 3)
        .collect()
}

/// Total area of a region set, in scaled units squared.
pub fn total_area(expolygons: &[ExPolygon]) -> f64 {
    expolygons.iter().map(|ex| ex.area()).sum()
}

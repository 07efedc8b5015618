//! Planar geometry primitives for polygon validation.
//!
//! Shoelace area, orientation and segment intersection tests, a
//! self-intersection scan over a closed ring, and the bounding
//! rectangle used to replace a ring that crosses itself.

use crate::types::Point;

/// Cross products with magnitude at or below this are treated as
/// collinear. Coordinates live in [0, 1], so this sits far below any
/// meaningful turn.
const COLLINEAR_TOLERANCE: f64 = 1e-12;

/// Turn direction of an ordered point triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Collinear,
    Clockwise,
    CounterClockwise,
}

/// Signed area of a closed polygon (shoelace formula).
///
/// Positive for counter-clockwise vertex order in a y-up frame
/// (clockwise on screen, where y grows downward). Fewer than three
/// points have zero area.
#[must_use]
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x.mul_add(b.y, -(b.x * a.y)))
        .sum();
    twice / 2.0
}

/// Orientation of the triple `(p, q, r)`.
#[must_use]
pub fn orientation(p: Point, q: Point, r: Point) -> Orientation {
    let cross = (q.x - p.x).mul_add(r.y - p.y, -((q.y - p.y) * (r.x - p.x)));
    if cross.abs() <= COLLINEAR_TOLERANCE {
        Orientation::Collinear
    } else if cross > 0.0 {
        Orientation::CounterClockwise
    } else {
        Orientation::Clockwise
    }
}

/// Given collinear `p`, `q`, `r`, whether `q` lies on segment `pr`.
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Whether segment `p1q1` and segment `p2q2` share at least one point.
///
/// Uses the standard orientation test, with the on-segment check
/// covering the collinear cases (touching endpoints, overlaps).
#[must_use]
pub fn segments_intersect(p1: Point, q1: Point, p2: Point, q2: Point) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == Orientation::Collinear && on_segment(p1, p2, q1))
        || (o2 == Orientation::Collinear && on_segment(p1, q2, q1))
        || (o3 == Orientation::Collinear && on_segment(p2, p1, q2))
        || (o4 == Orientation::Collinear && on_segment(p2, q1, q2))
}

/// Whether any two non-adjacent edges of the closed polygon intersect.
///
/// Edge `i` runs from `points[i]` to `points[(i + 1) % n]`. Edges that
/// share a vertex, including the wrap-around pair (first, last), are
/// skipped.
#[must_use]
pub fn is_self_intersecting(points: &[Point]) -> bool {
    let n = points.len();
    if n < 4 {
        return false;
    }
    let edge = |i: usize| (points[i], points[(i + 1) % n]);

    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (a1, b1) = edge(i);
            let (a2, b2) = edge(j);
            if segments_intersect(a1, b1, a2, b2) {
                return true;
            }
        }
    }
    false
}

/// Axis-aligned bounding box as `(min, max)` corners.
#[must_use]
pub fn bounding_box(points: &[Point]) -> Option<(Point, Point)> {
    let first = *points.first()?;
    Some(points.iter().fold((first, first), |(min, max), p| {
        (
            Point::new(min.x.min(p.x), min.y.min(p.y)),
            Point::new(max.x.max(p.x), max.y.max(p.y)),
        )
    }))
}

/// The 4-point rectangle tracing the bounding box of `points`, starting
/// at the min corner and running along the x axis first.
#[must_use]
pub fn bounding_rectangle(points: &[Point]) -> Vec<Point> {
    bounding_box(points).map_or_else(Vec::new, |(min, max)| {
        vec![
            Point::new(min.x, min.y),
            Point::new(max.x, min.y),
            Point::new(max.x, max.y),
            Point::new(min.x, max.y),
        ]
    })
}

//! # Geometry & Collision Prediction
//!
//! Pure functions used by every redirector, resetter and the scheduler:
//!
//! - nearest point on a segment / polygon / whole physical space
//! - distance-to-collision along a straight ray
//! - distance-to-collision along a circular arc
//! - even-odd point-in-polygon test
//!
//! ## Orientation
//!
//! Every [`Segment`] handed out by [`PhysicalSpace::edges`] is oriented so the
//! walkable side lies on its left. The outward normal is therefore the right
//! perpendicular of `end - start`, and a user "approaches" an edge when its
//! heading has a positive component along that normal.
//!
//! ## Buffers
//!
//! Collision distances are measured to the edge line shifted inward by the
//! buffer width and floor at zero. Degenerate input (zero-length segment, zero
//! heading) yields `f64::INFINITY`, never NaN.

use crate::space::PhysicalSpace;
use crate::structs::{CollisionPrediction, Point, SteeringMode, Vector2D, EPSILON};

/// A directed polygon edge. The walkable side is on the left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn new(start: Point, end: Point) -> Self {
        Segment { start, end }
    }

    pub fn vector(&self) -> Vector2D {
        self.end - self.start
    }

    pub fn length(&self) -> f64 {
        self.vector().magnitude()
    }

    pub fn is_degenerate(&self) -> bool {
        self.length() < EPSILON
    }

    /// Unit direction from start to end (zero for degenerate segments).
    pub fn direction(&self) -> Vector2D {
        self.vector().normalize()
    }

    /// Unit normal pointing away from the walkable side.
    pub fn outward_normal(&self) -> Vector2D {
        self.vector().perpendicular_right().normalize()
    }

    pub fn nearest_point(&self, p: &Point) -> Point {
        nearest_point_on_segment(p, &self.start, &self.end)
    }

    pub fn distance_to(&self, p: &Point) -> f64 {
        p.distance(&self.nearest_point(p))
    }

    /// Position of `p` projected onto the segment line, measured from `start`.
    pub fn projection(&self, p: &Point) -> f64 {
        (*p - self.start).dot(&self.direction())
    }

    /// True when the projection of `p` falls inside the segment extended by
    /// `extension` at both ends.
    pub fn within_bounds(&self, p: &Point, extension: f64) -> bool {
        let t = self.projection(p);
        t >= -extension - EPSILON && t <= self.length() + extension + EPSILON
    }

    /// Signed distance from `p` to the edge line, positive on the walkable side.
    pub fn walkable_offset(&self, p: &Point) -> f64 {
        (self.start - *p).dot(&self.outward_normal())
    }

    /// Splits the segment into equal pieces no longer than `max_length`.
    pub fn split(&self, max_length: f64) -> Vec<Segment> {
        let length = self.length();
        if length < EPSILON || max_length <= 0.0 {
            return vec![*self];
        }
        let pieces = (length / max_length).ceil().max(1.0) as usize;
        let step = self.vector() * (1.0 / pieces as f64);
        (0..pieces)
            .map(|i| {
                let s = self.start + step * i as f64;
                Segment::new(s, s + step)
            })
            .collect()
    }
}

pub fn nearest_point_on_segment(p: &Point, a: &Point, b: &Point) -> Point {
    let ab = *b - *a;
    let len_sq = ab.dot(&ab);
    if len_sq < EPSILON * EPSILON {
        return *a;
    }
    let t = ((*p - *a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    *a + ab * t
}

/// Nearest point on a closed polygon outline and its distance.
pub fn nearest_point_on_polygon(p: &Point, polygon: &[Point]) -> (f64, Point) {
    let mut best = (f64::INFINITY, *p);
    let n = polygon.len();
    for i in 0..n {
        let q = nearest_point_on_segment(p, &polygon[i], &polygon[(i + 1) % n]);
        let d = p.distance(&q);
        if d < best.0 {
            best = (d, q);
        }
    }
    best
}

/// Minimum distance from `pos` to the boundary or any obstacle, with the
/// nearest point.
pub fn nearest_distance_to_boundary(pos: &Point, space: &PhysicalSpace) -> (f64, Point) {
    let mut best = nearest_point_on_polygon(pos, space.boundary());
    for obstacle in space.obstacles() {
        let candidate = nearest_point_on_polygon(pos, obstacle);
        if candidate.0 < best.0 {
            best = candidate;
        }
    }
    best
}

/// Even-odd rule.
pub fn point_in_polygon(point: &Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = pj.x + (point.y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Shoelace area, positive for counter-clockwise winding.
pub fn polygon_signed_area(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    let mut sum = 0.0;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[(i + 1) % n]);
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

pub fn pad_distance(distance: f64, buffer: f64) -> f64 {
    (distance - buffer).max(0.0)
}

/// -1, 0 or 1. Unlike `f64::signum`, zero maps to zero.
pub fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Distance travelled along `dir` before reaching the buffered line of
/// `segment`.
///
/// Infinite when `dir` does not point toward the outward side or when `pos`
/// is already beyond the edge line.
pub fn collision_distance_straight(
    pos: &Point,
    dir: &Vector2D,
    segment: &Segment,
    buffer: f64,
) -> f64 {
    if segment.is_degenerate() || dir.is_zero() {
        return f64::INFINITY;
    }
    let normal = segment.outward_normal();
    let cos_approach = dir.normalize().dot(&normal);
    if cos_approach <= EPSILON {
        return f64::INFINITY;
    }
    let perpendicular = segment.walkable_offset(pos);
    if perpendicular < 0.0 {
        return f64::INFINITY;
    }
    pad_distance(perpendicular, buffer) / cos_approach
}

/// Arc length travelled along the circle tangent to `dir` (centre on the
/// `side`) before entering the buffer band of `segment`.
///
/// `SteeringMode::Straight` delegates to [`collision_distance_straight`].
pub fn collision_distance_arc(
    pos: &Point,
    dir: &Vector2D,
    radius: f64,
    side: SteeringMode,
    segment: &Segment,
    buffer: f64,
) -> f64 {
    if side == SteeringMode::Straight || !radius.is_finite() {
        return collision_distance_straight(pos, dir, segment, buffer);
    }
    if segment.is_degenerate() || dir.is_zero() || radius <= EPSILON {
        return f64::INFINITY;
    }

    let heading = dir.normalize();
    let normal = segment.outward_normal();
    let offset = segment.walkable_offset(pos);
    if offset < 0.0 {
        return f64::INFINITY;
    }
    // Already inside the band and moving out of the walkable area
    if offset <= buffer && heading.dot(&normal) > 0.0 && segment.within_bounds(pos, buffer) {
        return 0.0;
    }

    let to_center = match side {
        SteeringMode::Left => heading.perpendicular(),
        _ => heading.perpendicular_right(),
    };
    let center = *pos + to_center * radius;

    let line_point = segment.start - normal * buffer;
    let h = (line_point - center).dot(&normal);
    if h.abs() > radius {
        return f64::INFINITY;
    }
    let foot = center + normal * h;
    let half_chord = (radius * radius - h * h).max(0.0).sqrt();
    let along = segment.direction();

    let start_radial = *pos - center;
    let mut best = f64::INFINITY;
    for candidate in [foot + along * half_chord, foot - along * half_chord] {
        if !segment.within_bounds(&candidate, buffer) {
            continue;
        }
        let radial = candidate - center;
        let tangent = match side {
            SteeringMode::Left => radial.perpendicular(),
            _ => radial.perpendicular_right(),
        };
        // Only crossings that enter the band count
        if tangent.dot(&normal) <= 0.0 {
            continue;
        }
        let mut sweep = match side {
            SteeringMode::Left => start_radial.signed_angle_to(&radial),
            _ => -start_radial.signed_angle_to(&radial),
        };
        if sweep < 0.0 {
            sweep += 360.0;
        }
        let distance = radius * sweep.to_radians();
        if distance < best {
            best = distance;
        }
    }
    best
}

/// Minimum collision distance over every edge of `space` for one steering
/// option.
pub fn predict_collision(
    pos: &Point,
    dir: &Vector2D,
    mode: SteeringMode,
    radius: f64,
    space: &PhysicalSpace,
    buffer: f64,
) -> CollisionPrediction {
    let mut distance = f64::INFINITY;
    for segment in space.edges() {
        let d = match mode {
            SteeringMode::Straight => {
                let d = collision_distance_straight(pos, dir, &segment, buffer);
                // Edge lines extend past their endpoints; keep only real hits
                let cos_approach = dir.normalize().dot(&segment.outward_normal());
                if d.is_finite() && cos_approach > EPSILON {
                    let hit = *pos + dir.normalize() * (segment.walkable_offset(pos) / cos_approach);
                    if segment.within_bounds(&hit, buffer) {
                        d
                    } else {
                        f64::INFINITY
                    }
                } else {
                    d
                }
            }
            _ => collision_distance_arc(pos, dir, radius, mode, &segment, buffer),
        };
        if d < distance {
            distance = d;
        }
    }
    CollisionPrediction {
        mode,
        radius: if mode == SteeringMode::Straight {
            f64::INFINITY
        } else {
            radius
        },
        distance,
    }
}

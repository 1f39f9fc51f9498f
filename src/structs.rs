//! # Core Data Structures
//!
//! This module defines the fundamental data types shared by every stage of the
//! redirection pipeline:
//!
//! - **Point**: 2D position in a tracking-space or virtual frame
//! - **Vector2D**: 2D displacement/direction vector with arithmetic operations
//! - **Pose**: position plus facing direction
//! - **Gains**: the translation/rotation/curvature triple applied in one step
//! - **AvatarState**: complete per-avatar redirection state
//! - **AvatarSnapshot**: read-only copy of an avatar used by its peers
//!
//! Angles are in degrees and positive angles are counter-clockwise.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Magnitudes below this are treated as zero.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn origin() -> Self {
        Point { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Vector from the origin to this point.
    pub fn to_vector(self) -> Vector2D {
        Vector2D::new(self.x, self.y)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({:.2}, {:.2})", self.x, self.y)
    }
}

impl Sub for Point {
    type Output = Vector2D;

    fn sub(self, other: Point) -> Vector2D {
        Vector2D {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Add<Vector2D> for Point {
    type Output = Point;

    fn add(self, other: Vector2D) -> Point {
        Point {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub<Vector2D> for Point {
    type Output = Point;

    fn sub(self, other: Vector2D) -> Point {
        Point {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl AddAssign<Vector2D> for Point {
    fn add_assign(&mut self, other: Vector2D) {
        self.x += other.x;
        self.y += other.y;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: f64,
    pub y: f64,
}

impl Vector2D {
    pub fn new(x: f64, y: f64) -> Self {
        Vector2D { x, y }
    }

    pub fn zero() -> Self {
        Vector2D { x: 0.0, y: 0.0 }
    }

    /// Unit vector pointing at `degrees` counter-clockwise from +x.
    pub fn from_degrees(degrees: f64) -> Self {
        let radians = degrees.to_radians();
        Vector2D::new(radians.cos(), radians.sin())
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude() < EPSILON
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalize(&self) -> Vector2D {
        let mag = self.magnitude();
        if mag > EPSILON {
            Vector2D {
                x: self.x / mag,
                y: self.y / mag,
            }
        } else {
            Vector2D { x: 0.0, y: 0.0 }
        }
    }

    pub fn dot(&self, other: &Vector2D) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 3D cross product.
    pub fn cross(&self, other: &Vector2D) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Perpendicular rotated 90 degrees counter-clockwise (to the left).
    pub fn perpendicular(&self) -> Vector2D {
        Vector2D {
            x: -self.y,
            y: self.x,
        }
    }

    /// Perpendicular rotated 90 degrees clockwise (to the right).
    pub fn perpendicular_right(&self) -> Vector2D {
        Vector2D {
            x: self.y,
            y: -self.x,
        }
    }

    pub fn rotate(&self, degrees: f64) -> Vector2D {
        let rotated = Rotation2::new(degrees.to_radians()) * Vector2::new(self.x, self.y);
        Vector2D::new(rotated.x, rotated.y)
    }

    /// Signed angle in degrees from `self` to `other`, in (-180, 180].
    /// Returns 0 when either vector is zero.
    pub fn signed_angle_to(&self, other: &Vector2D) -> f64 {
        if self.is_zero() || other.is_zero() {
            return 0.0;
        }
        self.cross(other).atan2(self.dot(other)).to_degrees()
    }

    /// Unsigned angle in degrees between the two vectors, in [0, 180].
    pub fn angle_to(&self, other: &Vector2D) -> f64 {
        self.signed_angle_to(other).abs()
    }

    /// Heading of this vector in degrees counter-clockwise from +x.
    pub fn heading_degrees(&self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }
}

impl fmt::Display for Vector2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector2D({:.2}, {:.2})", self.x, self.y)
    }
}

impl Add for Vector2D {
    type Output = Vector2D;

    fn add(self, other: Vector2D) -> Vector2D {
        Vector2D {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl AddAssign for Vector2D {
    fn add_assign(&mut self, other: Vector2D) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vector2D {
    type Output = Vector2D;

    fn sub(self, other: Vector2D) -> Vector2D {
        Vector2D {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f64> for Vector2D {
    type Output = Vector2D;

    fn mul(self, scalar: f64) -> Vector2D {
        Vector2D {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

impl Neg for Vector2D {
    type Output = Vector2D;

    fn neg(self) -> Vector2D {
        Vector2D {
            x: -self.x,
            y: -self.y,
        }
    }
}

/// Position and facing direction. The direction is kept normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub direction: Vector2D,
}

impl Pose {
    pub fn new(position: Point, direction: Vector2D) -> Self {
        let direction = if direction.is_zero() {
            Vector2D::new(1.0, 0.0)
        } else {
            direction.normalize()
        };
        Pose {
            position,
            direction,
        }
    }

    pub fn facing_degrees(position: Point, degrees: f64) -> Self {
        Pose::new(position, Vector2D::from_degrees(degrees))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::new(Point::origin(), Vector2D::new(1.0, 0.0))
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pose(pos={}, dir={})", self.position, self.direction)
    }
}

/// Gains applied during one step. Curvature is in 1/m, positive steers the
/// user physically to the left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub translation: f64,
    pub rotation: f64,
    pub curvature: f64,
}

impl Gains {
    pub fn identity() -> Self {
        Gains {
            translation: 1.0,
            rotation: 1.0,
            curvature: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        (self.translation - 1.0).abs() < EPSILON
            && (self.rotation - 1.0).abs() < EPSILON
            && self.curvature.abs() < EPSILON
    }
}

impl Default for Gains {
    fn default() -> Self {
        Gains::identity()
    }
}

/// Path shape used by collision prediction and scheduler guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SteeringMode {
    Straight,
    Left,
    Right,
}

impl SteeringMode {
    /// Sign of the curvature that realizes this mode.
    pub fn curvature_sign(&self) -> f64 {
        match self {
            SteeringMode::Straight => 0.0,
            SteeringMode::Left => 1.0,
            SteeringMode::Right => -1.0,
        }
    }
}

/// A predicted distance-to-collision along one steering option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionPrediction {
    pub mode: SteeringMode,
    /// Curvature radius of the path; infinite for straight paths.
    pub radius: f64,
    pub distance: f64,
}

/// Closed interval of times (or distances) in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub min: f64,
    pub max: f64,
}

impl TimeRange {
    pub fn new(min: f64, max: f64) -> Self {
        TimeRange { min, max }
    }
}

/// Per-avatar redirection state, mutated only by its own controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarState {
    pub id: usize,
    /// Pose relative to the avatar's tracking-space frame.
    pub physical: Pose,
    pub virtual_pose: Pose,
    pub previous_physical: Pose,
    pub previous_virtual: Pose,
    /// Accumulated physical walking distance in meters.
    pub walked_distance: f64,
    pub gains: Gains,
    pub priority: f64,
    pub invalid: bool,
    pub mission_complete: bool,
}

impl AvatarState {
    pub fn new(id: usize, physical: Pose, virtual_pose: Pose) -> Self {
        AvatarState {
            id,
            physical,
            virtual_pose,
            previous_physical: physical,
            previous_virtual: virtual_pose,
            walked_distance: 0.0,
            gains: Gains::identity(),
            // Initial priority follows the avatar id
            priority: id as f64,
            invalid: false,
            mission_complete: false,
        }
    }

    /// Angle in degrees that takes a physical direction to its virtual one.
    pub fn frame_angle(&self) -> f64 {
        self.physical
            .direction
            .signed_angle_to(&self.virtual_pose.direction)
    }

    /// Maps a virtual-frame vector into the physical frame.
    pub fn virtual_to_physical(&self, v: Vector2D) -> Vector2D {
        v.rotate(-self.frame_angle())
    }

    /// Maps a virtual point into physical coordinates through the current frame.
    pub fn virtual_point_to_physical(&self, p: Point) -> Point {
        let offset = self.virtual_to_physical(p - self.virtual_pose.position);
        self.physical.position + offset
    }
}

/// Read-only copy of an avatar taken at the start of the decision phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarSnapshot {
    pub id: usize,
    pub space_index: usize,
    pub physical: Pose,
    pub priority: f64,
    pub in_reset: bool,
    pub reset_unfinished: bool,
}

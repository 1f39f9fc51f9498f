//! # Steer-To-Target Redirection
//!
//! Steers the user toward a target in the physical space:
//!
//! - **Center**: the bounding-box centre. When the centre is almost directly
//!   behind the user (bearing >= 160 degrees), a temporary target 4 m away at
//!   90 degrees toward the centre side is used until the bearing drops, so the
//!   user does not oscillate between turning left and right.
//! - **Orbit**: a tangent point on a circle around the centre, radius 7.5 m
//!   (or a quarter of the shorter side for spaces up to 30 m).
//!
//! The proposed rotation is dampened sinusoidally near zero bearing and
//! linearly close to the target, then blended with the previous step's
//! rotation to avoid jitter.

use crate::config::RedirectorKind;
use crate::geometry::sign;
use crate::redirector::{GainRequest, Redirector, StepContext};
use crate::structs::{Gains, Point};

const DAMPENING_DISTANCE: f64 = 1.25;
const DAMPENING_BEARING: f64 = 45.0;
const SMOOTHING_FACTOR: f64 = 0.125;
const TEMP_TARGET_BEARING: f64 = 160.0;
const TEMP_TARGET_DISTANCE: f64 = 4.0;
const ORBIT_RADIUS: f64 = 7.5;
const ORBIT_SMALL_SPACE: f64 = 30.0;
const ORBIT_INSIDE_ANGLE: f64 = 60.0;
/// Heading changes smaller than this (degrees) leave the rotation gain neutral.
const MIN_DELTA_DIRECTION: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerTarget {
    Center,
    Orbit,
}

#[derive(Debug, Clone)]
pub struct SteerToRedirector {
    target: SteerTarget,
    last_rotation_applied: f64,
    temporary_target: Option<Point>,
    current_target: Option<Point>,
}

impl SteerToRedirector {
    pub fn new(target: SteerTarget) -> Self {
        SteerToRedirector {
            target,
            last_rotation_applied: 0.0,
            temporary_target: None,
            current_target: None,
        }
    }

    pub fn center() -> Self {
        Self::new(SteerTarget::Center)
    }

    pub fn orbit() -> Self {
        Self::new(SteerTarget::Orbit)
    }

    /// Target chosen during the latest injection.
    pub fn current_target(&self) -> Option<Point> {
        self.current_target
    }

    fn pick_target(&mut self, ctx: &StepContext) -> Point {
        let target = match self.target {
            SteerTarget::Center => self.pick_center_target(ctx),
            SteerTarget::Orbit => pick_orbit_target(ctx),
        };
        self.current_target = Some(target);
        target
    }

    fn pick_center_target(&mut self, ctx: &StepContext) -> Point {
        let center = ctx.space.center();
        let pos = ctx.position();
        let dir = ctx.direction();
        let to_center = center - pos;
        if dir.angle_to(&to_center) >= TEMP_TARGET_BEARING {
            let side = sign(dir.signed_angle_to(&to_center));
            // Directly behind: pick the left side
            let side = if side == 0.0 { 1.0 } else { side };
            *self
                .temporary_target
                .get_or_insert_with(|| pos + dir.rotate(side * 90.0) * TEMP_TARGET_DISTANCE)
        } else {
            self.temporary_target = None;
            center
        }
    }
}

/// Orbit radius for a space of the given bounding-box size.
pub fn orbit_radius(width: f64, height: f64) -> f64 {
    if width <= ORBIT_SMALL_SPACE || height <= ORBIT_SMALL_SPACE {
        width.min(height) / 4.0
    } else {
        ORBIT_RADIUS
    }
}

fn pick_orbit_target(ctx: &StepContext) -> Point {
    let center = ctx.space.center();
    let (width, height) = ctx.space.size();
    let radius = orbit_radius(width, height);
    let pos = ctx.position();
    let dir = ctx.direction();

    let to_center = center - pos;
    let distance = to_center.magnitude();
    let alpha = if distance < radius {
        ORBIT_INSIDE_ANGLE
    } else {
        (radius / distance).acos().to_degrees()
    };
    let outward = (-to_center).normalize();
    let target1 = center + outward.rotate(alpha) * radius;
    let target2 = center + outward.rotate(-alpha) * radius;
    if dir.angle_to(&(target1 - pos)) <= dir.angle_to(&(target2 - pos)) {
        target1
    } else {
        target2
    }
}

impl Redirector for SteerToRedirector {
    fn kind(&self) -> RedirectorKind {
        match self.target {
            SteerTarget::Center => RedirectorKind::SteerToCenter,
            SteerTarget::Orbit => RedirectorKind::SteerToOrbit,
        }
    }

    fn inject_redirection(&mut self, ctx: &StepContext) -> GainRequest {
        let target = self.pick_target(ctx);
        let pos = ctx.position();
        let dir = ctx.direction();
        let delta_dir = ctx.motion.delta_direction;
        let bounds = &ctx.bounds;

        let desired = target - pos;
        // Physical turn direction that brings the heading onto the target
        let steer = sign(dir.signed_angle_to(&desired));

        let gain = if delta_dir * steer > 0.0 {
            bounds.min_rotation
        } else {
            bounds.max_rotation
        };
        let mut proposed = -steer * (delta_dir * (gain - 1.0)).abs();

        // Step 1: sinusoidal dampening near zero bearing
        let bearing = dir.angle_to(&desired);
        if bearing <= DAMPENING_BEARING {
            proposed *= (90.0 * bearing / DAMPENING_BEARING).to_radians().sin();
        }
        // Step 2: linear dampening close to the target
        let distance = desired.magnitude();
        if distance <= DAMPENING_DISTANCE {
            proposed *= distance / DAMPENING_DISTANCE;
        }
        // Step 3: smoothing against the previous step
        let final_rotation =
            (1.0 - SMOOTHING_FACTOR) * self.last_rotation_applied + SMOOTHING_FACTOR * proposed;
        self.last_rotation_applied = final_rotation;

        let rotation = if delta_dir.abs() < MIN_DELTA_DIRECTION {
            1.0
        } else {
            1.0 + final_rotation / delta_dir
        };
        Gains {
            translation: 1.0,
            rotation,
            curvature: steer / bounds.curvature_radius,
        }
    }
}

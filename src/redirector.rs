//! # Redirectors
//!
//! A redirector proposes raw gains every step; [`apply_gains`] clamps them to
//! the configured [`GainBounds`] and turns them into a virtual translation and
//! rotation.
//!
//! ## Gating
//!
//! - Translation gain always scales the step displacement: `delta * (gt - 1)`.
//! - Rotation gain contributes `delta_dir * (gr - 1)` only while rotating.
//! - Curvature contributes `-curvature * |delta|` (radians) only while walking.
//! - When both contribute, the larger magnitude wins.
//!
//! ## Variants
//!
//! | Kind | Implementation |
//! |------|----------------|
//! | `null` | [`NullRedirector`] |
//! | `steer_to_center`, `steer_to_orbit` | [`crate::steer_to::SteerToRedirector`] |
//! | `apf_*` | [`crate::apf::PotentialFieldRedirector`] |
//! | `scheduled` | [`ScheduledRedirector`] |

use crate::apf::PotentialFieldRedirector;
use crate::config::{GainBounds, RedirectionConfig, RedirectorKind};
use crate::space::PhysicalSpace;
use crate::steer_to::SteerToRedirector;
use crate::structs::{AvatarSnapshot, AvatarState, Gains, Point, SteeringMode, Vector2D};
use log::trace;
use serde::{Deserialize, Serialize};

/// Raw gains proposed by a redirector, before clamping and gating.
pub type GainRequest = Gains;

/// Observed physical motion of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMotion {
    pub delta_physical: Vector2D,
    /// Physical displacement expressed in the virtual frame.
    pub delta_virtual: Vector2D,
    /// Physical heading change in degrees, counter-clockwise positive.
    pub delta_direction: f64,
    pub dt: f64,
    pub walking: bool,
    pub rotating: bool,
}

impl StepMotion {
    pub fn classify(
        delta_physical: Vector2D,
        delta_virtual: Vector2D,
        delta_direction: f64,
        dt: f64,
        config: &RedirectionConfig,
    ) -> Self {
        let (walking, rotating) = if dt > 0.0 {
            (
                delta_physical.magnitude() / dt > config.walking_threshold,
                delta_direction.abs() / dt > config.rotating_threshold,
            )
        } else {
            (false, false)
        };
        StepMotion {
            delta_physical,
            delta_virtual,
            delta_direction,
            dt,
            walking,
            rotating,
        }
    }

    pub fn still(dt: f64) -> Self {
        StepMotion {
            delta_physical: Vector2D::zero(),
            delta_virtual: Vector2D::zero(),
            delta_direction: 0.0,
            dt,
            walking: false,
            rotating: false,
        }
    }
}

/// Everything a redirector may read during one step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub avatar: &'a AvatarState,
    pub motion: StepMotion,
    pub space: &'a PhysicalSpace,
    /// Other avatars in the same physical space.
    pub peers: &'a [AvatarSnapshot],
    pub config: &'a RedirectionConfig,
    pub bounds: GainBounds,
    /// Current waypoint in virtual coordinates.
    pub waypoint: Option<Point>,
    /// Last waypoint of the path in virtual coordinates.
    pub final_waypoint: Option<Point>,
    /// Physical prop the user should end up at (haptic alignment).
    pub haptic_target: Option<Point>,
}

impl<'a> StepContext<'a> {
    pub fn position(&self) -> Point {
        self.avatar.physical.position
    }

    pub fn direction(&self) -> Vector2D {
        self.avatar.physical.direction
    }
}

/// Gains after clamping together with the virtual-frame injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedRedirection {
    pub gains: Gains,
    pub translation: Vector2D,
    /// Degrees, counter-clockwise positive.
    pub rotation: f64,
}

impl AppliedRedirection {
    pub fn none() -> Self {
        AppliedRedirection {
            gains: Gains::identity(),
            translation: Vector2D::zero(),
            rotation: 0.0,
        }
    }
}

/// Clamps a gain request to `bounds` and applies the walking/rotating gates.
pub fn apply_gains(request: &GainRequest, motion: &StepMotion, bounds: &GainBounds) -> AppliedRedirection {
    let translation_gain = bounds.clamp_translation(request.translation);
    let translation = motion.delta_virtual * (translation_gain - 1.0);

    let mut rotation: f64 = 0.0;
    let mut rotation_gain = 1.0;
    if motion.rotating {
        rotation_gain = bounds.clamp_rotation(request.rotation);
        let from_rotation = motion.delta_direction * (rotation_gain - 1.0);
        if from_rotation.abs() > rotation.abs() {
            rotation = from_rotation;
        }
    }

    let mut curvature = 0.0;
    if motion.walking {
        curvature = bounds.clamp_curvature(request.curvature);
        // Positive curvature turns the virtual view clockwise so the user
        // compensates by turning left
        let from_curvature = -(curvature * motion.delta_virtual.magnitude()).to_degrees();
        if from_curvature.abs() > rotation.abs() {
            rotation = from_curvature;
        }
    }

    let gains = Gains {
        translation: translation_gain,
        rotation: rotation_gain,
        curvature,
    };
    trace!(
        "applied gains gt={:.3} gr={:.3} k={:.4} rotation={:.4}",
        gains.translation,
        gains.rotation,
        gains.curvature,
        rotation
    );
    AppliedRedirection {
        gains,
        translation,
        rotation,
    }
}

/// Guidance handed to the scheduler-driven redirector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedirectParams {
    pub mode: SteeringMode,
    pub radius: f64,
    pub translation_gain: f64,
}

/// Per-step gain policy.
pub trait Redirector {
    fn kind(&self) -> RedirectorKind;

    /// Raw desired gains for this step. Clamping happens in [`apply_gains`].
    fn inject_redirection(&mut self, ctx: &StepContext) -> GainRequest;

    /// Processing priority for this avatar, when the policy defines one.
    fn priority(&mut self, _ctx: &StepContext) -> Option<f64> {
        None
    }

    /// Last normalized steering force of a potential-field policy.
    fn total_force(&self) -> Option<Vector2D> {
        None
    }

    /// Installs (or clears) externally scheduled guidance.
    fn set_schedule(&mut self, _params: Option<RedirectParams>) {}
}

#[derive(Debug, Default)]
pub struct NullRedirector;

impl Redirector for NullRedirector {
    fn kind(&self) -> RedirectorKind {
        RedirectorKind::Null
    }

    fn inject_redirection(&mut self, _ctx: &StepContext) -> GainRequest {
        Gains::identity()
    }
}

/// Applies scheduler guidance verbatim while active, otherwise neutral.
#[derive(Debug, Default)]
pub struct ScheduledRedirector {
    params: Option<RedirectParams>,
}

impl ScheduledRedirector {
    pub fn params(&self) -> Option<RedirectParams> {
        self.params
    }
}

impl Redirector for ScheduledRedirector {
    fn kind(&self) -> RedirectorKind {
        RedirectorKind::Scheduled
    }

    fn inject_redirection(&mut self, _ctx: &StepContext) -> GainRequest {
        match self.params {
            Some(params) => {
                let curvature = if params.radius > 0.0 && params.radius.is_finite() {
                    params.mode.curvature_sign() / params.radius
                } else {
                    0.0
                };
                Gains {
                    translation: params.translation_gain,
                    rotation: 1.0,
                    curvature,
                }
            }
            None => Gains::identity(),
        }
    }

    fn set_schedule(&mut self, params: Option<RedirectParams>) {
        self.params = params;
    }
}

pub fn build_redirector(kind: RedirectorKind) -> Box<dyn Redirector> {
    match kind {
        RedirectorKind::Null => Box::new(NullRedirector),
        RedirectorKind::SteerToCenter => Box::new(SteerToRedirector::center()),
        RedirectorKind::SteerToOrbit => Box::new(SteerToRedirector::orbit()),
        RedirectorKind::ApfBasic
        | RedirectorKind::ApfSegmented
        | RedirectorKind::ApfDynamic
        | RedirectorKind::ApfHaptic => Box::new(PotentialFieldRedirector::new(kind)),
        RedirectorKind::Scheduled => Box::new(ScheduledRedirector::default()),
    }
}

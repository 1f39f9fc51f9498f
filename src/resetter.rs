//! # Resetters
//!
//! A resetter decides when continuous redirection can no longer keep the
//! user clear of the boundary, obstacles and peers, and then drives an overt
//! in-place turn until the user faces somewhere safe.
//!
//! ## Lifecycle
//!
//! 1. [`Resetter::is_reset_required`] is polled while the avatar is `Normal`.
//! 2. [`Resetter::initialize_reset`] plans the turn and returns guidance.
//! 3. [`Resetter::inject_resetting`] runs once per step and reports the
//!    virtual injection plus whether the turn is finished.
//! 4. [`Resetter::end_reset`] clears guidance.
//!
//! ## Physical progress
//!
//! The physical rotation still required decreases by the observed
//! `|delta_direction|` every reset step. An autopilot walker asks
//! [`Resetter::simulated_turn`] how far to spin this step.
//!
//! ## Variants
//!
//! | Kind | Turn | Virtual injection |
//! |------|------|-------------------|
//! | `null` | none | ends immediately |
//! | `freeze_turn` | 180 deg | cancels the user's own motion |
//! | `two_one_turn` | 180 deg | doubles rotation until 180 deg injected |
//! | `center_seeking`, `gradient_seeking`, `scheduled` | see [`crate::steered_reset`] | ratio of the turn |

use crate::config::ResetterKind;
use crate::geometry::{nearest_distance_to_boundary, sign};
use crate::redirector::StepContext;
use crate::steered_reset::{SteerGoal, SteeredResetter};
use crate::structs::{Point, Vector2D};
use log::debug;

/// Degrees subtracted from 90 so that grazing motion never triggers.
pub const TOLERANCE_ANGLE: f64 = 1.0;
pub const HALF_TURN: f64 = 180.0;
/// Rotation (degrees) below which a turn counts as complete.
pub const TURN_EPSILON: f64 = 1e-6;

/// Everything a resetter may read during one step.
#[derive(Debug, Clone, Copy)]
pub struct ResetContext<'a> {
    pub step: StepContext<'a>,
    /// Last normalized force of the avatar's redirector, if it is a potential field.
    pub field_force: Option<Vector2D>,
}

impl<'a> ResetContext<'a> {
    pub fn new(step: StepContext<'a>, field_force: Option<Vector2D>) -> Self {
        ResetContext { step, field_force }
    }
}

/// What the user is asked to do during a reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetGuidance {
    /// +1 for counter-clockwise, -1 for clockwise.
    pub turn_sign: f64,
    /// Physical direction the user should face when the reset ends.
    pub target_direction: Vector2D,
    /// Physical rotation still required, in degrees.
    pub remaining_rotation: f64,
}

/// Virtual-frame correction for one reset step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetInjection {
    /// Degrees added to the virtual heading.
    pub rotation: f64,
    /// Displacement added to the virtual position.
    pub translation: Vector2D,
    pub finished: bool,
}

impl ResetInjection {
    pub fn idle() -> Self {
        ResetInjection {
            rotation: 0.0,
            translation: Vector2D::zero(),
            finished: false,
        }
    }

    pub fn done() -> Self {
        ResetInjection {
            finished: true,
            ..Self::idle()
        }
    }
}

/// Physical in-place turn shared by every resetter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalTurn {
    pub sign: f64,
    pub remaining: f64,
}

impl PhysicalTurn {
    pub fn new(sign: f64, amount: f64) -> Self {
        PhysicalTurn {
            sign: if sign < 0.0 { -1.0 } else { 1.0 },
            remaining: amount.max(0.0),
        }
    }

    /// Signed rotation an autopilot performs this step.
    pub fn simulated(&self, dt: f64, rotation_speed: f64) -> f64 {
        self.sign * (rotation_speed * dt).min(self.remaining)
    }

    pub fn observe(&mut self, delta_direction: f64) {
        self.remaining = (self.remaining - delta_direction.abs()).max(0.0);
    }

    pub fn is_done(&self) -> bool {
        self.remaining <= TURN_EPSILON
    }
}

/// True when moving one more step ahead brings the user within the buffer of
/// a vertex, an edge or a peer that lies in front of them.
pub fn collision_imminent(ctx: &StepContext) -> bool {
    let pos = ctx.position();
    let dir = ctx.direction();
    let probe = pos + dir * ctx.motion.delta_physical.magnitude();
    let buffer = ctx.config.reset_trigger_buffer;

    let threatens = |candidate: &Point| {
        candidate.distance(&probe) <= buffer
            && (*candidate - probe).angle_to(&dir) < 90.0 - TOLERANCE_ANGLE
    };

    ctx.space.vertices().any(|v| threatens(v))
        || ctx
            .space
            .edges()
            .iter()
            .any(|edge| threatens(&edge.nearest_point(&probe)))
        || ctx.peers.iter().any(|peer| threatens(&peer.physical.position))
}

/// Point the user is being pushed away from: the nearest boundary point when
/// it is inside the buffer, otherwise the nearest peer.
pub fn reset_obstacle_point(ctx: &StepContext) -> Point {
    let pos = ctx.position();
    let (distance, nearest) = nearest_distance_to_boundary(&pos, ctx.space);
    if distance <= ctx.config.reset_trigger_buffer {
        return nearest;
    }
    ctx.peers
        .iter()
        .map(|p| p.physical.position)
        .min_by(|a, b| a.distance(&pos).total_cmp(&b.distance(&pos)))
        .unwrap_or(nearest)
}

/// Per-avatar reset policy.
pub trait Resetter {
    fn kind(&self) -> ResetterKind;

    fn is_reset_required(&self, ctx: &ResetContext) -> bool {
        collision_imminent(&ctx.step)
    }

    fn initialize_reset(&mut self, ctx: &ResetContext) -> ResetGuidance;

    fn inject_resetting(&mut self, ctx: &ResetContext) -> ResetInjection;

    fn end_reset(&mut self);

    /// Signed in-place rotation (degrees) an autopilot performs this step.
    fn simulated_turn(&self, dt: f64, rotation_speed: f64) -> f64;

    fn guidance(&self) -> Option<ResetGuidance>;

    /// Externally decided target direction (scheduler-driven resets).
    fn set_reset_direction(&mut self, _direction: Option<Vector2D>) {}
}

/// Never asks for a reset; a forced reset ends on its first step.
#[derive(Debug, Default)]
pub struct NullResetter;

impl Resetter for NullResetter {
    fn kind(&self) -> ResetterKind {
        ResetterKind::Null
    }

    fn is_reset_required(&self, _ctx: &ResetContext) -> bool {
        false
    }

    fn initialize_reset(&mut self, ctx: &ResetContext) -> ResetGuidance {
        ResetGuidance {
            turn_sign: 1.0,
            target_direction: ctx.step.direction(),
            remaining_rotation: 0.0,
        }
    }

    fn inject_resetting(&mut self, _ctx: &ResetContext) -> ResetInjection {
        ResetInjection::done()
    }

    fn end_reset(&mut self) {}

    fn simulated_turn(&self, _dt: f64, _rotation_speed: f64) -> f64 {
        0.0
    }

    fn guidance(&self) -> Option<ResetGuidance> {
        None
    }
}

/// Freezes the virtual pose while the user turns 180 degrees.
#[derive(Debug, Default)]
pub struct FreezeTurnResetter {
    turn: Option<PhysicalTurn>,
    target: Vector2D,
}

impl Resetter for FreezeTurnResetter {
    fn kind(&self) -> ResetterKind {
        ResetterKind::FreezeTurn
    }

    fn initialize_reset(&mut self, ctx: &ResetContext) -> ResetGuidance {
        let turn = PhysicalTurn::new(1.0, HALF_TURN);
        self.turn = Some(turn);
        self.target = -ctx.step.direction();
        debug!("Avatar {} freeze-turn toward {}", ctx.step.avatar.id, self.target);
        ResetGuidance {
            turn_sign: turn.sign,
            target_direction: self.target,
            remaining_rotation: turn.remaining,
        }
    }

    fn inject_resetting(&mut self, ctx: &ResetContext) -> ResetInjection {
        let Some(turn) = self.turn.as_mut() else {
            return ResetInjection::done();
        };
        let motion = &ctx.step.motion;
        turn.observe(motion.delta_direction);
        ResetInjection {
            rotation: -motion.delta_direction,
            translation: -motion.delta_virtual,
            finished: turn.is_done(),
        }
    }

    fn end_reset(&mut self) {
        self.turn = None;
    }

    fn simulated_turn(&self, dt: f64, rotation_speed: f64) -> f64 {
        self.turn
            .map(|t| t.simulated(dt, rotation_speed))
            .unwrap_or(0.0)
    }

    fn guidance(&self) -> Option<ResetGuidance> {
        self.turn.map(|t| ResetGuidance {
            turn_sign: t.sign,
            target_direction: self.target,
            remaining_rotation: t.remaining,
        })
    }
}

/// Doubles the user's rotation until 180 degrees have been injected.
#[derive(Debug, Default)]
pub struct TwoOneTurnResetter {
    turn: Option<PhysicalTurn>,
    target: Vector2D,
    injected: f64,
}

impl Resetter for TwoOneTurnResetter {
    fn kind(&self) -> ResetterKind {
        ResetterKind::TwoOneTurn
    }

    fn initialize_reset(&mut self, ctx: &ResetContext) -> ResetGuidance {
        let turn = PhysicalTurn::new(1.0, HALF_TURN);
        self.turn = Some(turn);
        self.target = -ctx.step.direction();
        self.injected = 0.0;
        ResetGuidance {
            turn_sign: turn.sign,
            target_direction: self.target,
            remaining_rotation: turn.remaining,
        }
    }

    fn inject_resetting(&mut self, ctx: &ResetContext) -> ResetInjection {
        let Some(turn) = self.turn.as_mut() else {
            return ResetInjection::done();
        };
        let delta = ctx.step.motion.delta_direction;
        turn.observe(delta);

        // Keep going in whichever direction the user is turning
        let goal = if delta > 0.0 { HALF_TURN } else { -HALF_TURN };
        let remaining = goal - self.injected;
        if remaining.abs() < delta.abs() || turn.is_done() {
            self.injected += remaining;
            return ResetInjection {
                rotation: remaining,
                translation: Vector2D::zero(),
                finished: true,
            };
        }
        self.injected += delta;
        ResetInjection {
            rotation: delta,
            ..ResetInjection::idle()
        }
    }

    fn end_reset(&mut self) {
        self.turn = None;
        self.injected = 0.0;
    }

    fn simulated_turn(&self, dt: f64, rotation_speed: f64) -> f64 {
        self.turn
            .map(|t| t.simulated(dt, rotation_speed))
            .unwrap_or(0.0)
    }

    fn guidance(&self) -> Option<ResetGuidance> {
        self.turn.map(|t| ResetGuidance {
            turn_sign: t.sign,
            target_direction: self.target,
            remaining_rotation: t.remaining,
        })
    }
}

pub fn build_resetter(kind: ResetterKind) -> Box<dyn Resetter> {
    match kind {
        ResetterKind::Null => Box::new(NullResetter),
        ResetterKind::FreezeTurn => Box::new(FreezeTurnResetter::default()),
        ResetterKind::TwoOneTurn => Box::new(TwoOneTurnResetter::default()),
        ResetterKind::CenterSeeking => Box::new(SteeredResetter::new(SteerGoal::Center)),
        ResetterKind::GradientSeeking => Box::new(SteeredResetter::new(SteerGoal::Gradient)),
        ResetterKind::Scheduled => Box::new(SteeredResetter::new(SteerGoal::Scheduled)),
    }
}

/// Signed turn direction that goes the long way round to `target`.
pub fn long_way_sign(current: &Vector2D, target: &Vector2D) -> f64 {
    if sign(current.signed_angle_to(target)) > 0.0 {
        -1.0
    } else {
        1.0
    }
}

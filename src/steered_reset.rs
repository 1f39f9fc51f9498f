//! # Steered Resets
//!
//! Center-seeking, gradient-seeking and scheduler-driven resets all share one
//! turn plan. The user turns in place the long way round until they face the
//! target direction, while the virtual frame is rotated by a fixed share of
//! every observed heading change.
//!
//! ## Turn plan
//!
//! With `a = angle(current, target)`:
//!
//! - physical rotation `P = 360 - a`, turning away from the target side
//! - steering budget `S = a`, so the virtual heading ends where it started
//! - scheduler-driven: `S = (turn_sign * w + a) mod 360`, where `w` is the
//!   bearing of the current waypoint, so the virtual heading ends facing it
//! - every step injects `S / P * delta_direction`; the last step injects the
//!   remainder
//!
//! ## Target direction
//!
//! The raw target (space centre, potential-field force, or the scheduler's
//! choice) is deflected when it points back into the obstacle that caused
//! the reset: it becomes that obstacle's normal rotated 70 degrees toward the
//! raw target.

use crate::apf::basic_force;
use crate::config::ResetterKind;
use crate::redirector::StepContext;
use crate::resetter::{
    long_way_sign, reset_obstacle_point, PhysicalTurn, ResetContext, ResetGuidance, ResetInjection,
    Resetter,
};
use crate::structs::Vector2D;
use log::debug;

const FULL_TURN: f64 = 360.0;
const DEFLECTION_ANGLE: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerGoal {
    Center,
    Gradient,
    Scheduled,
}

impl SteerGoal {
    pub fn kind(&self) -> ResetterKind {
        match self {
            SteerGoal::Center => ResetterKind::CenterSeeking,
            SteerGoal::Gradient => ResetterKind::GradientSeeking,
            SteerGoal::Scheduled => ResetterKind::Scheduled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnPlan {
    pub turn: PhysicalTurn,
    pub target: Vector2D,
    pub ratio: f64,
    /// Virtual rotation still to inject, in degrees.
    pub steer_remaining: f64,
}

impl TurnPlan {
    pub fn new(current: Vector2D, target: Vector2D, steer_budget: f64) -> Self {
        let physical = FULL_TURN - current.angle_to(&target);
        let turn = PhysicalTurn::new(long_way_sign(&current, &target), physical);
        TurnPlan {
            turn,
            target,
            ratio: steer_budget / physical,
            steer_remaining: steer_budget,
        }
    }

    pub fn advance(&mut self, delta_direction: f64) -> ResetInjection {
        self.turn.observe(delta_direction);
        let steer = self.ratio * delta_direction;
        if self.steer_remaining <= steer.abs() || self.turn.is_done() {
            let rotation = self.turn.sign * self.steer_remaining;
            self.steer_remaining = 0.0;
            return ResetInjection {
                rotation,
                ..ResetInjection::done()
            };
        }
        self.steer_remaining -= steer.abs();
        ResetInjection {
            rotation: steer,
            ..ResetInjection::idle()
        }
    }

    pub fn guidance(&self) -> ResetGuidance {
        ResetGuidance {
            turn_sign: self.turn.sign,
            target_direction: self.target,
            remaining_rotation: self.turn.remaining,
        }
    }
}

/// Turns `raw` away from the obstacle that caused the reset when it points
/// back into it.
pub fn deflect_from_obstacle(raw: Vector2D, step: &StepContext) -> Vector2D {
    let obstacle = reset_obstacle_point(step);
    let normal = (step.position() - obstacle).normalize();
    if normal.is_zero() || normal.dot(&raw) > 0.0 {
        return raw;
    }
    if normal.signed_angle_to(&raw) < 0.0 {
        normal.rotate(-DEFLECTION_ANGLE)
    } else {
        normal.rotate(DEFLECTION_ANGLE)
    }
}

#[derive(Debug)]
pub struct SteeredResetter {
    goal: SteerGoal,
    plan: Option<TurnPlan>,
    scheduled_direction: Option<Vector2D>,
}

impl SteeredResetter {
    pub fn new(goal: SteerGoal) -> Self {
        SteeredResetter {
            goal,
            plan: None,
            scheduled_direction: None,
        }
    }

    pub fn plan(&self) -> Option<&TurnPlan> {
        self.plan.as_ref()
    }

    fn target_direction(&self, ctx: &ResetContext) -> Vector2D {
        let step = &ctx.step;
        let pos = step.position();
        let to_center = (step.space.center() - pos).normalize();
        let target = match self.goal {
            SteerGoal::Center => deflect_from_obstacle(to_center, step),
            SteerGoal::Gradient => {
                let force = ctx
                    .field_force
                    .filter(|f| !f.is_zero())
                    .unwrap_or_else(|| basic_force(pos, step.space, step.peers));
                deflect_from_obstacle(force, step)
            }
            SteerGoal::Scheduled => match self.scheduled_direction.filter(|d| !d.is_zero()) {
                Some(direction) => direction,
                None => deflect_from_obstacle(to_center, step),
            },
        };
        if target.is_zero() {
            -step.direction()
        } else {
            target.normalize()
        }
    }

    /// Virtual rotation needed so the virtual heading ends where it should.
    fn steer_budget(&self, ctx: &ResetContext, current: Vector2D, target: Vector2D) -> f64 {
        let angle = current.angle_to(&target);
        if self.goal != SteerGoal::Scheduled {
            return angle;
        }
        let avatar = ctx.step.avatar;
        let bearing = ctx
            .step
            .waypoint
            .map(|w| {
                avatar
                    .virtual_pose
                    .direction
                    .signed_angle_to(&(w - avatar.virtual_pose.position))
            })
            .unwrap_or(0.0);
        (long_way_sign(&current, &target) * bearing + angle).rem_euclid(FULL_TURN)
    }
}

impl Resetter for SteeredResetter {
    fn kind(&self) -> ResetterKind {
        self.goal.kind()
    }

    fn initialize_reset(&mut self, ctx: &ResetContext) -> ResetGuidance {
        let current = ctx.step.direction();
        let target = self.target_direction(ctx);
        let budget = self.steer_budget(ctx, current, target);
        let plan = TurnPlan::new(current, target, budget);
        debug!(
            "Avatar {} {} reset: turn {:.1} deg (sign {}), steer {:.1} deg",
            ctx.step.avatar.id,
            self.goal.kind(),
            plan.turn.remaining,
            plan.turn.sign,
            budget
        );
        self.plan = Some(plan);
        plan.guidance()
    }

    fn inject_resetting(&mut self, ctx: &ResetContext) -> ResetInjection {
        match self.plan.as_mut() {
            Some(plan) => plan.advance(ctx.step.motion.delta_direction),
            None => ResetInjection::done(),
        }
    }

    fn end_reset(&mut self) {
        self.plan = None;
        self.scheduled_direction = None;
    }

    fn simulated_turn(&self, dt: f64, rotation_speed: f64) -> f64 {
        self.plan
            .map(|p| p.turn.simulated(dt, rotation_speed))
            .unwrap_or(0.0)
    }

    fn guidance(&self) -> Option<ResetGuidance> {
        self.plan.map(|p| p.guidance())
    }

    fn set_reset_direction(&mut self, direction: Option<Vector2D>) {
        self.scheduled_direction = direction;
    }
}

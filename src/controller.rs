//! # Avatar Controller
//!
//! Owns one avatar's state together with its redirector and resetter, and
//! runs the per-step lifecycle:
//!
//! 1. [`AvatarController::observe`] takes the new physical pose, carries the
//!    virtual pose forward through the current physical-to-virtual frame and
//!    classifies the motion.
//! 2. [`AvatarController::apply`] either redirects (clamped gains) or keeps a
//!    reset running, then writes the injection into the virtual pose only.
//!
//! ## Reset states
//!
//! ```text
//! Normal --predicate--> Triggered --apply--> InReset --turn done--> Cooldown(2) --> Normal
//!                                               |
//!                                   (synchronized, peers still turning)
//!                                               v
//!                                   InReset { awaiting_peers }
//! ```
//!
//! A trial starts in `Cooldown(3)`. The cooldown decrements on each
//! redirection step and a reset can only trigger from `Normal`.

use crate::config::{RedirectionConfig, RedirectorKind, ResetterKind};
use crate::redirector::{apply_gains, RedirectParams, Redirector, StepContext, StepMotion};
use crate::resetter::{ResetContext, ResetGuidance, Resetter};
use crate::space::PhysicalSpace;
use crate::structs::{AvatarSnapshot, AvatarState, Gains, Point, Pose, Vector2D};
use log::{info, warn};
use serde::Serialize;

pub const START_COOLDOWN: u32 = 3;
pub const RESET_COOLDOWN: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResetState {
    Normal,
    Triggered,
    InReset { awaiting_peers: bool },
    Cooldown(u32),
}

impl ResetState {
    pub fn is_resetting(&self) -> bool {
        matches!(self, ResetState::Triggered | ResetState::InReset { .. })
    }

    /// Still turning (not merely waiting at the barrier).
    pub fn is_unfinished(&self) -> bool {
        matches!(
            self,
            ResetState::Triggered
                | ResetState::InReset {
                    awaiting_peers: false
                }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvalidReason {
    ResetLimitExceeded,
    Stuck,
}

/// Structured per-step events for external loggers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AvatarEvent {
    GainApplied {
        avatar: usize,
        gains: Gains,
        translation: Vector2D,
        rotation: f64,
    },
    ResetTriggered {
        avatar: usize,
        reset_count: usize,
        turn_sign: f64,
        target_direction: Vector2D,
    },
    ResetEnded {
        avatar: usize,
        reset_count: usize,
    },
    WaypointReached {
        avatar: usize,
        index: usize,
    },
    MissionComplete {
        avatar: usize,
    },
    Invalid {
        avatar: usize,
        reason: InvalidReason,
    },
}

/// Step-wide inputs shared by every avatar in one physical space.
#[derive(Debug, Clone, Copy)]
pub struct StepEnv<'a> {
    pub space: &'a PhysicalSpace,
    /// Snapshot of the other avatars in the same space.
    pub peers: &'a [AvatarSnapshot],
    pub config: &'a RedirectionConfig,
    pub waypoint: Option<Point>,
    pub final_waypoint: Option<Point>,
    pub haptic_target: Option<Point>,
    /// Any avatar in the snapshot still turning through a reset.
    pub peers_mid_reset: bool,
}

fn step_context<'a>(state: &'a AvatarState, motion: StepMotion, env: &StepEnv<'a>) -> StepContext<'a> {
    StepContext {
        avatar: state,
        motion,
        space: env.space,
        peers: env.peers,
        config: env.config,
        bounds: env.config.gain_bounds(),
        waypoint: env.waypoint,
        final_waypoint: env.final_waypoint,
        haptic_target: env.haptic_target,
    }
}

pub struct AvatarController {
    state: AvatarState,
    space_index: usize,
    redirector: Box<dyn Redirector>,
    resetter: Box<dyn Resetter>,
    reset_state: ResetState,
    reset_count: usize,
    elapsed: f64,
    same_position_time: f64,
    motion: StepMotion,
    invalid_reason: Option<InvalidReason>,
}

impl AvatarController {
    pub fn new(
        id: usize,
        space_index: usize,
        physical: Pose,
        virtual_pose: Pose,
        redirector: Box<dyn Redirector>,
        resetter: Box<dyn Resetter>,
    ) -> Self {
        AvatarController {
            state: AvatarState::new(id, physical, virtual_pose),
            space_index,
            redirector,
            resetter,
            reset_state: ResetState::Cooldown(START_COOLDOWN),
            reset_count: 0,
            elapsed: 0.0,
            same_position_time: 0.0,
            motion: StepMotion::still(0.0),
            invalid_reason: None,
        }
    }

    pub fn id(&self) -> usize {
        self.state.id
    }

    pub fn state(&self) -> &AvatarState {
        &self.state
    }

    pub fn space_index(&self) -> usize {
        self.space_index
    }

    pub fn reset_state(&self) -> ResetState {
        self.reset_state
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn same_position_time(&self) -> f64 {
        self.same_position_time
    }

    pub fn motion(&self) -> StepMotion {
        self.motion
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        self.invalid_reason
    }

    pub fn redirector_kind(&self) -> RedirectorKind {
        self.redirector.kind()
    }

    pub fn resetter_kind(&self) -> ResetterKind {
        self.resetter.kind()
    }

    pub fn guidance(&self) -> Option<ResetGuidance> {
        self.resetter.guidance()
    }

    pub fn total_force(&self) -> Option<Vector2D> {
        self.redirector.total_force()
    }

    pub fn is_active(&self) -> bool {
        !self.state.invalid && !self.state.mission_complete
    }

    /// In-place turn an autopilot performs while resetting.
    pub fn simulated_turn(&self, dt: f64, rotation_speed: f64) -> f64 {
        self.resetter.simulated_turn(dt, rotation_speed)
    }

    pub fn set_schedule(&mut self, params: Option<RedirectParams>) {
        self.redirector.set_schedule(params);
    }

    pub fn set_reset_direction(&mut self, direction: Option<Vector2D>) {
        self.resetter.set_reset_direction(direction);
    }

    /// Takes the new physical pose and carries the virtual pose through the
    /// current frame.
    pub fn observe(&mut self, physical: Pose, dt: f64, config: &RedirectionConfig) -> StepMotion {
        let previous = self.state.physical;
        let delta_physical = physical.position - previous.position;
        let delta_direction = previous.direction.signed_angle_to(&physical.direction);
        let delta_virtual = delta_physical.rotate(self.state.frame_angle());

        self.state.previous_physical = previous;
        self.state.previous_virtual = self.state.virtual_pose;
        self.state.physical = physical;
        self.state.virtual_pose = Pose::new(
            self.state.virtual_pose.position + delta_virtual,
            self.state.virtual_pose.direction.rotate(delta_direction),
        );
        self.state.walked_distance += delta_physical.magnitude();
        self.elapsed += dt;

        let motion = StepMotion::classify(delta_physical, delta_virtual, delta_direction, dt, config);
        if !motion.walking && !self.state.mission_complete {
            self.same_position_time += dt;
        } else {
            self.same_position_time = 0.0;
        }
        self.motion = motion;
        motion
    }

    pub fn snapshot(&self) -> AvatarSnapshot {
        AvatarSnapshot {
            id: self.state.id,
            space_index: self.space_index,
            physical: self.state.physical,
            priority: self.state.priority,
            in_reset: self.reset_state.is_resetting(),
            reset_unfinished: self.reset_state.is_unfinished(),
        }
    }

    /// Polls the resetter; only a `Normal` avatar can trigger.
    pub fn reset_required(&self, env: &StepEnv) -> bool {
        if self.reset_state != ResetState::Normal || !self.is_active() {
            return false;
        }
        let step = step_context(&self.state, self.motion, env);
        let ctx = ResetContext::new(step, self.redirector.total_force());
        self.resetter.is_reset_required(&ctx)
    }

    /// Marks the avatar for a reset on the next apply. Returns false when it
    /// is already resetting.
    pub fn trigger(&mut self) -> bool {
        if self.reset_state.is_resetting() || !self.is_active() {
            return false;
        }
        self.reset_state = ResetState::Triggered;
        true
    }

    pub fn apply(&mut self, env: &StepEnv) -> Vec<AvatarEvent> {
        let mut events = Vec::new();
        if !self.is_active() {
            return events;
        }
        match self.reset_state {
            ResetState::Triggered => {
                let step = step_context(&self.state, self.motion, env);
                let ctx = ResetContext::new(step, self.redirector.total_force());
                let guidance = self.resetter.initialize_reset(&ctx);
                self.reset_count += 1;
                self.reset_state = ResetState::InReset {
                    awaiting_peers: false,
                };
                info!(
                    "Avatar {} reset #{} triggered at {}",
                    self.state.id, self.reset_count, self.state.physical.position
                );
                events.push(AvatarEvent::ResetTriggered {
                    avatar: self.state.id,
                    reset_count: self.reset_count,
                    turn_sign: guidance.turn_sign,
                    target_direction: guidance.target_direction,
                });
                self.continue_reset(env, &mut events);
            }
            ResetState::InReset { awaiting_peers: false } => self.continue_reset(env, &mut events),
            ResetState::InReset { awaiting_peers: true } => {
                self.freeze();
                if !env.peers_mid_reset {
                    self.finish_reset(&mut events);
                }
            }
            ResetState::Normal | ResetState::Cooldown(_) => {
                events.push(self.redirect(env));
                self.reset_state = match self.reset_state {
                    ResetState::Cooldown(n) if n > 1 => ResetState::Cooldown(n - 1),
                    _ => ResetState::Normal,
                };
            }
        }
        events
    }

    fn redirect(&mut self, env: &StepEnv) -> AvatarEvent {
        let step = step_context(&self.state, self.motion, env);
        let request = self.redirector.inject_redirection(&step);
        let applied = apply_gains(&request, &self.motion, &step.bounds);

        self.inject(applied.translation, applied.rotation);
        self.state.gains = applied.gains;
        AvatarEvent::GainApplied {
            avatar: self.state.id,
            gains: applied.gains,
            translation: applied.translation,
            rotation: applied.rotation,
        }
    }

    fn continue_reset(&mut self, env: &StepEnv, events: &mut Vec<AvatarEvent>) {
        let step = step_context(&self.state, self.motion, env);
        let ctx = ResetContext::new(step, self.redirector.total_force());
        let injection = self.resetter.inject_resetting(&ctx);
        self.inject(injection.translation, injection.rotation);
        self.state.gains = Gains::identity();
        if !injection.finished {
            return;
        }
        self.resetter.end_reset();
        if env.config.synchronized_reset && env.peers_mid_reset {
            self.reset_state = ResetState::InReset {
                awaiting_peers: true,
            };
        } else {
            self.finish_reset(events);
        }
    }

    fn finish_reset(&mut self, events: &mut Vec<AvatarEvent>) {
        self.reset_state = ResetState::Cooldown(RESET_COOLDOWN);
        info!("Avatar {} reset #{} ended", self.state.id, self.reset_count);
        events.push(AvatarEvent::ResetEnded {
            avatar: self.state.id,
            reset_count: self.reset_count,
        });
    }

    /// Cancels the user's own motion in the virtual frame.
    fn freeze(&mut self) {
        let motion = self.motion;
        self.inject(-motion.delta_virtual, -motion.delta_direction);
    }

    fn inject(&mut self, translation: Vector2D, rotation: f64) {
        let virtual_pose = &mut self.state.virtual_pose;
        *virtual_pose = Pose::new(
            virtual_pose.position + translation,
            virtual_pose.direction.rotate(rotation),
        );
    }

    /// Recomputes the processing priority when the redirector defines one.
    pub fn refresh_priority(&mut self, env: &StepEnv) {
        let step = step_context(&self.state, self.motion, env);
        if let Some(priority) = self.redirector.priority(&step) {
            self.state.priority = priority;
        }
    }

    /// Flags the avatar invalid once a limit is exceeded.
    pub fn check_invalid(&mut self, config: &RedirectionConfig) -> Option<AvatarEvent> {
        if self.state.invalid {
            return None;
        }
        let reason = if self.reset_count > config.max_reset_count {
            InvalidReason::ResetLimitExceeded
        } else if self.same_position_time > config.max_same_position_time {
            InvalidReason::Stuck
        } else {
            return None;
        };
        warn!(
            "Avatar {} marked invalid: {:?} (resets={}, still for {:.1}s)",
            self.state.id, reason, self.reset_count, self.same_position_time
        );
        self.state.invalid = true;
        self.invalid_reason = Some(reason);
        self.retire();
        Some(AvatarEvent::Invalid {
            avatar: self.state.id,
            reason,
        })
    }

    /// Drops any reset in progress once the avatar stops taking part, so
    /// peers waiting at the barrier are released.
    fn retire(&mut self) {
        if self.reset_state.is_resetting() {
            self.resetter.end_reset();
        }
        self.reset_state = ResetState::Normal;
    }

    pub fn complete_mission(&mut self) -> Option<AvatarEvent> {
        if self.state.mission_complete {
            return None;
        }
        self.state.mission_complete = true;
        self.same_position_time = 0.0;
        self.retire();
        info!(
            "Avatar {} mission complete after {:.1}s, {:.2}m walked, {} resets",
            self.state.id, self.elapsed, self.state.walked_distance, self.reset_count
        );
        Some(AvatarEvent::MissionComplete {
            avatar: self.state.id,
        })
    }
}

impl std::fmt::Debug for AvatarController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarController")
            .field("id", &self.state.id)
            .field("redirector", &self.redirector.kind())
            .field("resetter", &self.resetter.kind())
            .field("reset_state", &self.reset_state)
            .field("reset_count", &self.reset_count)
            .finish()
    }
}

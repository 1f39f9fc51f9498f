//! # Simulated Walker
//!
//! Autopilot that produces the next physical pose of an avatar when no
//! tracker is attached. The walker thinks in virtual space (turn toward the
//! waypoint, then walk) and converts its intent into physical motion through
//! the avatar's current physical-to-virtual frame, so redirection shows up
//! as a curved physical path.

use crate::config::RedirectionConfig;
use crate::controller::AvatarController;
use crate::structs::{Point, Pose, EPSILON};

/// Remaining bearing (degrees) below which the walker starts walking.
pub const ALIGN_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedWalker {
    pub translation_speed: f64,
    pub rotation_speed: f64,
}

impl SimulatedWalker {
    pub fn new(config: &RedirectionConfig) -> Self {
        SimulatedWalker {
            translation_speed: config.translation_speed,
            rotation_speed: config.rotation_speed,
        }
    }

    /// Physical pose for the next step.
    pub fn next_pose(&self, controller: &AvatarController, waypoint: Option<Point>, dt: f64) -> Pose {
        let state = controller.state();
        let physical = state.physical;
        if !controller.is_active() {
            return physical;
        }

        if controller.reset_state().is_resetting() {
            let turn = controller.simulated_turn(dt, self.rotation_speed);
            return Pose::new(physical.position, physical.direction.rotate(turn));
        }

        let Some(waypoint) = waypoint else {
            return physical;
        };
        let virtual_pose = state.virtual_pose;
        let to_target = waypoint - virtual_pose.position;
        let distance = to_target.magnitude();
        if distance < EPSILON {
            return physical;
        }

        // Step 1: turn toward the waypoint
        let bearing = virtual_pose.direction.signed_angle_to(&to_target);
        let max_turn = self.rotation_speed * dt;
        let turn = bearing.clamp(-max_turn, max_turn);
        let heading = virtual_pose.direction.rotate(turn);

        // Step 2: walk once aligned
        let walk = if (bearing - turn).abs() < ALIGN_TOLERANCE {
            (self.translation_speed * dt).min(distance)
        } else {
            0.0
        };
        let step = state.virtual_to_physical(heading * walk);
        Pose::new(physical.position + step, physical.direction.rotate(turn))
    }
}

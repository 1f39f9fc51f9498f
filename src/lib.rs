//! # Redirection Core
//!
//! Redirected-walking decision core: per-step redirection gains, reset
//! detection and sequencing, and multi-user conflict scheduling for avatars
//! sharing a bounded physical tracking space.
//!
//! ## Strategies
//!
//! - **Redirectors**: Null, Steer-To-Center / Steer-To-Orbit, the artificial
//!   potential field family (basic, segmented, dynamic, haptic) and a
//!   scheduler-driven redirector.
//! - **Resetters**: Null, Freeze-Turn, 2:1 Turn, Center-Seeking,
//!   Gradient-Seeking and a scheduler-driven resetter.
//! - **Scheduler**: reachability grid plus reset-first / guide-others
//!   decisions that keep co-located users loosely synchronized.
//!
//! ## Usage
//!
//! Build a [`Trial`] from a [`RedirectionConfig`], one or more
//! [`PhysicalSpace`]s and an [`AvatarSetup`] per avatar, then call
//! [`Trial::step`] (autopilot) or [`Trial::step_with_poses`] (tracked).
//! With the `python` feature the crate also builds as the Python module
//! `redirection_core`.

pub mod apf;
pub mod config;
pub mod controller;
pub mod error;
pub mod geometry;
pub mod redirector;
pub mod resetter;
pub mod scheduler;
pub mod space;
pub mod steer_to;
pub mod steered_reset;
pub mod structs;
pub mod trial;
pub mod walker;

#[cfg(feature = "python")]
mod python;

pub use config::{GainBounds, RedirectionConfig, RedirectorKind, ResetterKind, SchedulerConfig};
pub use controller::{AvatarController, AvatarEvent, InvalidReason, ResetState, StepEnv};
pub use error::{RdwError, Result};
pub use geometry::{
    collision_distance_arc, collision_distance_straight, nearest_distance_to_boundary, point_in_polygon,
    predict_collision, Segment,
};
pub use redirector::{apply_gains, build_redirector, RedirectParams, Redirector, StepContext, StepMotion};
pub use resetter::{build_resetter, Resetter};
pub use scheduler::{ConflictScheduler, GuidanceStrategy, Instruction, ReachabilityGrid, ScheduleDecision, ScheduleTrigger};
pub use space::{ObstacleLayout, PhysicalSpace, SpaceLayout};
pub use structs::{CollisionPrediction, Gains, Point, Pose, SteeringMode, TimeRange, Vector2D};
pub use trial::{AvatarSetup, StepReport, Trial, TrialOutcome};
pub use walker::SimulatedWalker;

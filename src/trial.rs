//! # Trial Orchestration
//!
//! Runs a whole multi-avatar trial in lockstep. Every step is split into a
//! decision phase that only reads a snapshot of all avatars and an apply
//! phase that mutates them, so the outcome does not depend on which avatar
//! happens to be processed first.
//!
//! ## Step
//!
//! 1. Processing order (descending priority, ties by lower index)
//! 2. Movement (autopilot walkers or tracked poses)
//! 3. Waypoint updates
//! 4. Observe
//! 5. Snapshot
//! 6. Trigger detection (synchronized or independent)
//! 7. Scheduler decision
//! 8. Apply
//! 9. Priority refresh
//! 10. Invalid and mission checks

use crate::config::{RedirectionConfig, RedirectorKind, ResetterKind};
use crate::controller::{AvatarController, AvatarEvent, StepEnv};
use crate::error::{RdwError, Result};
use crate::redirector::build_redirector;
use crate::resetter::build_resetter;
use crate::scheduler::{AvatarView, ConflictScheduler, ReachabilityGrid, ScheduleDecision, ScheduleTrigger};
use crate::space::PhysicalSpace;
use crate::structs::{AvatarSnapshot, Point, Pose};
use crate::walker::SimulatedWalker;
use log::{debug, info};
use ordered_float::OrderedFloat;
use priority_queue::PriorityQueue;
use serde::Serialize;
use std::cmp::Reverse;

/// Everything needed to place one avatar in a trial.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarSetup {
    pub space_index: usize,
    pub physical: Pose,
    pub virtual_pose: Pose,
    pub redirector: RedirectorKind,
    pub resetter: ResetterKind,
    /// Virtual waypoints, visited in order.
    pub waypoints: Vec<Point>,
    pub haptic_target: Option<Point>,
}

impl AvatarSetup {
    pub fn new(space_index: usize, physical: Pose, redirector: RedirectorKind, resetter: ResetterKind) -> Self {
        AvatarSetup {
            space_index,
            physical,
            virtual_pose: physical,
            redirector,
            resetter,
            waypoints: Vec::new(),
            haptic_target: None,
        }
    }

    pub fn with_virtual_pose(mut self, virtual_pose: Pose) -> Self {
        self.virtual_pose = virtual_pose;
        self
    }

    pub fn with_waypoints(mut self, waypoints: Vec<Point>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn with_haptic_target(mut self, target: Point) -> Self {
        self.haptic_target = Some(target);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrialOutcome {
    /// Every avatar completed its mission.
    Normal,
    /// Some avatar was marked invalid.
    Invalid,
    /// Stopped from outside, or the step cap was reached.
    Manual,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: usize,
    /// Avatar indices in processing order.
    pub order: Vec<usize>,
    pub events: Vec<AvatarEvent>,
    pub decision: Option<ScheduleDecision>,
    pub outcome: Option<TrialOutcome>,
}

/// Per-avatar counters at the end of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AvatarSummary {
    pub avatar: usize,
    pub resets: usize,
    pub walked_distance: f64,
    pub elapsed: f64,
    pub invalid: bool,
    pub mission_complete: bool,
}

#[derive(Debug, Clone, Default)]
struct WaypointTrack {
    points: Vec<Point>,
    index: usize,
    touched: bool,
}

impl WaypointTrack {
    fn current(&self) -> Option<Point> {
        self.points.get(self.index).copied()
    }

    fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }
}

/// Inputs shared by every avatar, kept apart from the controllers they feed.
#[derive(Debug)]
struct TrialWorld {
    config: RedirectionConfig,
    spaces: Vec<PhysicalSpace>,
    tracks: Vec<WaypointTrack>,
    haptic_targets: Vec<Option<Point>>,
}

impl TrialWorld {
    fn env<'a>(&'a self, avatar: &AvatarController, peers: &'a [AvatarSnapshot], peers_mid_reset: bool) -> StepEnv<'a> {
        let index = avatar.id();
        let track = &self.tracks[index];
        StepEnv {
            space: &self.spaces[avatar.space_index()],
            peers,
            config: &self.config,
            waypoint: track.current(),
            final_waypoint: track.last(),
            haptic_target: self.haptic_targets[index],
            peers_mid_reset,
        }
    }
}

pub struct Trial {
    world: TrialWorld,
    avatars: Vec<AvatarController>,
    walker: SimulatedWalker,
    scheduler: Option<ConflictScheduler>,
    step_count: usize,
    outcome: Option<TrialOutcome>,
}

impl Trial {
    pub fn new(config: RedirectionConfig, spaces: Vec<PhysicalSpace>, setups: Vec<AvatarSetup>) -> Result<Self> {
        config.validate()?;
        if setups.is_empty() {
            return Err(RdwError::NoAvatars);
        }

        let mut avatars = Vec::with_capacity(setups.len());
        let mut tracks = Vec::with_capacity(setups.len());
        let mut haptic_targets = Vec::with_capacity(setups.len());
        let mut scheduler: Option<ConflictScheduler> = None;
        for (id, setup) in setups.into_iter().enumerate() {
            let space = spaces.get(setup.space_index).ok_or(RdwError::SpaceIndexOutOfRange {
                index: setup.space_index,
                count: spaces.len(),
            })?;
            if setup.redirector == RedirectorKind::Scheduled {
                scheduler
                    .get_or_insert_with(ConflictScheduler::new)
                    .register(id, ReachabilityGrid::new(space, &config));
            }
            avatars.push(AvatarController::new(
                id,
                setup.space_index,
                setup.physical,
                setup.virtual_pose,
                build_redirector(setup.redirector),
                build_resetter(setup.resetter),
            ));
            tracks.push(WaypointTrack {
                points: setup.waypoints,
                ..WaypointTrack::default()
            });
            haptic_targets.push(setup.haptic_target);
        }

        info!(
            "Trial set up with {} avatars in {} spaces (scheduler: {})",
            avatars.len(),
            spaces.len(),
            scheduler.is_some()
        );
        Ok(Trial {
            walker: SimulatedWalker::new(&config),
            world: TrialWorld {
                config,
                spaces,
                tracks,
                haptic_targets,
            },
            avatars,
            scheduler,
            step_count: 0,
            outcome: None,
        })
    }

    pub fn config(&self) -> &RedirectionConfig {
        &self.world.config
    }

    pub fn avatars(&self) -> &[AvatarController] {
        &self.avatars
    }

    pub fn avatar(&self, index: usize) -> Option<&AvatarController> {
        self.avatars.get(index)
    }

    pub fn scheduler(&self) -> Option<&ConflictScheduler> {
        self.scheduler.as_ref()
    }

    pub fn outcome(&self) -> Option<TrialOutcome> {
        self.outcome
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn elapsed(&self) -> f64 {
        self.step_count as f64 * self.world.config.dt()
    }

    pub fn waypoint_index(&self, avatar: usize) -> Option<usize> {
        self.world.tracks.get(avatar).map(|t| t.index)
    }

    pub fn total_resets(&self) -> usize {
        self.avatars.iter().map(|a| a.reset_count()).sum()
    }

    pub fn summary(&self) -> Vec<AvatarSummary> {
        self.avatars
            .iter()
            .map(|a| AvatarSummary {
                avatar: a.id(),
                resets: a.reset_count(),
                walked_distance: a.state().walked_distance,
                elapsed: a.elapsed(),
                invalid: a.state().invalid,
                mission_complete: a.state().mission_complete,
            })
            .collect()
    }

    /// Descending priority, ties broken by lower index.
    pub fn processing_order(&self) -> Vec<usize> {
        let mut queue = PriorityQueue::new();
        for (i, avatar) in self.avatars.iter().enumerate() {
            queue.push(i, (OrderedFloat(avatar.state().priority), Reverse(i)));
        }
        let mut order = Vec::with_capacity(self.avatars.len());
        while let Some((i, _)) = queue.pop() {
            order.push(i);
        }
        order
    }

    /// Autopilot step: every avatar is moved by the simulated walker.
    pub fn step(&mut self) -> StepReport {
        self.advance(None)
    }

    /// Tracked step: one physical pose per avatar, in index order.
    pub fn step_with_poses(&mut self, poses: &[Pose]) -> Result<StepReport> {
        if poses.len() != self.avatars.len() {
            return Err(RdwError::PoseCountMismatch {
                expected: self.avatars.len(),
                actual: poses.len(),
            });
        }
        Ok(self.advance(Some(poses)))
    }

    /// Steps until an outcome; reaching the cap ends the trial as manual.
    pub fn run(&mut self, max_steps: usize) -> TrialOutcome {
        while self.outcome.is_none() && self.step_count < max_steps {
            self.step();
        }
        self.outcome.unwrap_or_else(|| self.stop())
    }

    pub fn stop(&mut self) -> TrialOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        info!("Trial stopped manually after {} steps", self.step_count);
        self.outcome = Some(TrialOutcome::Manual);
        TrialOutcome::Manual
    }

    fn advance(&mut self, poses: Option<&[Pose]>) -> StepReport {
        if self.outcome.is_some() {
            return StepReport {
                step: self.step_count,
                order: Vec::new(),
                events: Vec::new(),
                decision: None,
                outcome: self.outcome,
            };
        }
        let dt = self.world.config.dt();
        let mut events = Vec::new();

        // Step 1: processing order
        let order = self.processing_order();
        debug!("Step {} processing order {:?}", self.step_count, order);

        // Step 2: movement
        let next_poses: Vec<Pose> = match poses {
            Some(poses) => poses.to_vec(),
            None => self
                .avatars
                .iter()
                .zip(&self.world.tracks)
                .map(|(avatar, track)| self.walker.next_pose(avatar, track.current(), dt))
                .collect(),
        };

        // Step 3: waypoint updates
        self.update_waypoints(&mut events);

        // Step 4: observe
        for (avatar, pose) in self.avatars.iter_mut().zip(next_poses) {
            if avatar.is_active() {
                avatar.observe(pose, dt, &self.world.config);
            }
        }

        // Step 5: snapshot
        let snapshots: Vec<AvatarSnapshot> = self.avatars.iter().map(|a| a.snapshot()).collect();

        // Step 6: trigger detection
        let needed: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| {
                let peers = same_space_peers(&snapshots, i);
                self.avatars[i].reset_required(&self.world.env(&self.avatars[i], &peers, false))
            })
            .collect();
        let synchronized = self.world.config.synchronized_reset && !needed.is_empty();
        if synchronized {
            debug!("Synchronized reset requested by {:?}", needed);
            for avatar in self.avatars.iter_mut() {
                avatar.trigger();
            }
        } else {
            for &i in &needed {
                self.avatars[i].trigger();
            }
        }

        // Step 7: scheduler decision
        let decision = self.schedule(synchronized, &snapshots);

        // Step 8: apply
        let unfinished: Vec<bool> = self
            .avatars
            .iter()
            .map(|a| a.is_active() && a.reset_state().is_unfinished())
            .collect();
        for &i in &order {
            let peers = same_space_peers(&snapshots, i);
            let peers_mid_reset = unfinished.iter().enumerate().any(|(j, &u)| j != i && u);
            let env = self.world.env(&self.avatars[i], &peers, peers_mid_reset);
            events.extend(self.avatars[i].apply(&env));
        }

        // Step 9: priority refresh
        for &i in &order {
            let peers = same_space_peers(&snapshots, i);
            let env = self.world.env(&self.avatars[i], &peers, false);
            self.avatars[i].refresh_priority(&env);
        }

        // Step 10: invalid and mission checks
        for avatar in self.avatars.iter_mut() {
            events.extend(avatar.check_invalid(&self.world.config));
        }
        self.step_count += 1;
        self.outcome = self.evaluate_outcome();
        if let Some(outcome) = self.outcome {
            info!(
                "Trial finished as {:?} after {} steps ({} resets)",
                outcome,
                self.step_count,
                self.total_resets()
            );
        }

        StepReport {
            step: self.step_count,
            order,
            events,
            decision,
            outcome: self.outcome,
        }
    }

    fn update_waypoints(&mut self, events: &mut Vec<AvatarEvent>) {
        let threshold = self.world.config.waypoint_threshold;
        for (avatar, track) in self.avatars.iter_mut().zip(self.world.tracks.iter_mut()) {
            track.touched = false;
            if !avatar.is_active() {
                continue;
            }
            let Some(waypoint) = track.current() else {
                continue;
            };
            if avatar.state().virtual_pose.position.distance(&waypoint) > threshold {
                continue;
            }
            info!("Avatar {} reached waypoint {}", avatar.id(), track.index);
            events.push(AvatarEvent::WaypointReached {
                avatar: avatar.id(),
                index: track.index,
            });
            track.touched = true;
            track.index += 1;
            if track.index >= track.points.len() {
                events.extend(avatar.complete_mission());
            }
        }
    }

    fn schedule(&mut self, synchronized: bool, snapshots: &[AvatarSnapshot]) -> Option<ScheduleDecision> {
        let scheduler = self.scheduler.as_ref()?;
        let scheduled: Vec<usize> = scheduler.avatars().filter(|&i| self.avatars[i].is_active()).collect();
        let trigger = if synchronized {
            ScheduleTrigger::SynchronizedReset
        } else if scheduled.iter().any(|&i| self.world.tracks[i].touched) {
            ScheduleTrigger::WaypointReached
        } else {
            return None;
        };

        let views: Vec<AvatarView> = scheduled
            .iter()
            .map(|&i| {
                let avatar = &self.avatars[i];
                AvatarView {
                    id: i,
                    space: &self.world.spaces[avatar.space_index()],
                    physical: avatar.state().physical,
                    virtual_position: avatar.state().virtual_pose.position,
                    waypoint: self.world.tracks[i].current(),
                    peers: same_space_peers(snapshots, i).iter().map(|p| p.physical.position).collect(),
                }
            })
            .collect();
        let decision = scheduler.schedule(trigger, &views, &self.world.config);

        for instruction in &decision.instructions {
            let avatar = &mut self.avatars[instruction.avatar];
            avatar.set_schedule(Some(instruction.params));
            if instruction.reset {
                avatar.set_reset_direction(instruction.reset_direction);
                avatar.trigger();
            }
        }
        Some(decision)
    }

    fn evaluate_outcome(&self) -> Option<TrialOutcome> {
        if self.avatars.iter().any(|a| a.state().invalid) {
            Some(TrialOutcome::Invalid)
        } else if self.avatars.iter().all(|a| a.state().mission_complete) {
            Some(TrialOutcome::Normal)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for Trial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trial")
            .field("avatars", &self.avatars)
            .field("step_count", &self.step_count)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Snapshots of the other avatars sharing the space of `index`.
fn same_space_peers(snapshots: &[AvatarSnapshot], index: usize) -> Vec<AvatarSnapshot> {
    let own = &snapshots[index];
    snapshots
        .iter()
        .filter(|s| s.id != own.id && s.space_index == own.space_index)
        .copied()
        .collect()
}

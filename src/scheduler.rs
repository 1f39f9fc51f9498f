//! # Multi-User Conflict Scheduler
//!
//! Decides, for avatars sharing physical space, who resets now and where
//! everyone else is guided, so that the group stays loosely synchronized and
//! nobody is left without an instruction.
//!
//! ## Setup
//!
//! Each scheduled avatar gets a [`ReachabilityGrid`]: square cells over its
//! assigned space, each profiled over `direction_samples` headings. A cell's
//! score is `sum(1 / max_time)` over headings (smaller is safer).
//!
//! ## Runtime
//!
//! On a [`ScheduleTrigger`] every avatar is assessed:
//!
//! - collision-time range under its current heading (straight plus left and
//!   right arcs for `K` radii `R / cos(pi / (2K) * i)`)
//! - reset-time range over all safe headings, remembering the furthest option
//! - time to reach its current waypoint
//!
//! An avatar is flagged when its worst-case time is not above its time to the
//! waypoint. The flagged avatar with the smallest time resets first toward
//! the furthest option; everyone else is guided to the cell with the longest
//! reach within that same budget. With nobody flagged, everyone heads for
//! the safest cell reachable within its own budget.

use crate::config::{GainBounds, RedirectionConfig};
use crate::geometry::{nearest_distance_to_boundary, predict_collision};
use crate::redirector::RedirectParams;
use crate::space::PhysicalSpace;
use crate::structs::{CollisionPrediction, Point, Pose, SteeringMode, TimeRange, Vector2D, EPSILON};
use log::debug;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;

/// Extra share of the buffer kept clear along arcs.
const ARC_EXTRA_BUFFER: f64 = 0.5;
/// Nearest-boundary distance above which every heading counts as safe.
const SAFE_CLEARANCE: f64 = 0.1;
/// Max angle (degrees) between a safe heading and the wall normal.
const SAFE_ANGLE: f64 = 80.0;
/// Spacing of path samples checked against peers.
const PATH_SAMPLE_STEP: f64 = 0.25;
/// |offset| below which a target counts as dead ahead.
const STRAIGHT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleTrigger {
    /// Some avatar needs a reset and synchronized resets are on.
    SynchronizedReset,
    /// Some avatar touched its waypoint.
    WaypointReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GuidanceStrategy {
    SafestPosition,
    FurthestPosition,
    /// Longest-reach cell within the shared time budget (seconds).
    MaxTimePosition(f64),
}

/// What one avatar is told to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Instruction {
    pub avatar: usize,
    pub reset: bool,
    pub strategy: GuidanceStrategy,
    pub params: RedirectParams,
    /// Physical heading to face after the reset.
    pub reset_direction: Option<Vector2D>,
    /// Centre of the chosen cell, if any.
    pub target: Option<Point>,
    /// No cell qualified and the furthest option was used instead.
    pub fallback: bool,
}

/// Collision profile of one avatar at decision time.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub avatar: usize,
    pub collision_options: Vec<CollisionPrediction>,
    pub collision_time: TimeRange,
    pub reset_time: TimeRange,
    /// Safest heading with the longest reach and its best option.
    pub furthest: Option<(Vector2D, CollisionPrediction)>,
    pub time_to_waypoint: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleDecision {
    pub trigger: ScheduleTrigger,
    pub assessments: Vec<Assessment>,
    pub must_reset: Vec<usize>,
    pub reset_first: Option<usize>,
    /// Shared time budget when some avatar must reset.
    pub budget: Option<f64>,
    pub instructions: Vec<Instruction>,
}

impl ScheduleDecision {
    pub fn instruction(&self, avatar: usize) -> Option<&Instruction> {
        self.instructions.iter().find(|i| i.avatar == avatar)
    }
}

/// One avatar as seen by the scheduler.
#[derive(Debug, Clone)]
pub struct AvatarView<'a> {
    pub id: usize,
    pub space: &'a PhysicalSpace,
    pub physical: Pose,
    pub virtual_position: Point,
    /// Current waypoint in virtual coordinates.
    pub waypoint: Option<Point>,
    /// Physical positions of the other avatars in the same space.
    pub peers: Vec<Point>,
}

/// Heading sampled uniformly counter-clockwise from +x.
pub fn sample_direction(index: usize, samples: usize) -> Vector2D {
    Vector2D::from_degrees(360.0 / samples.max(1) as f64 * index as f64)
}

/// Straight option plus left and right arcs for every sampled radius.
pub fn collision_options(pos: Point, dir: Vector2D, space: &PhysicalSpace, config: &RedirectionConfig) -> Vec<CollisionPrediction> {
    let buffer = config.reset_trigger_buffer;
    let k = config.scheduler.radius_samples.max(1);
    let mut options = Vec::with_capacity(2 * k + 1);
    for i in 0..k {
        let radius = config.curvature_radius / (std::f64::consts::PI / (2.0 * k as f64) * i as f64).cos();
        for mode in [SteeringMode::Left, SteeringMode::Right] {
            let mut prediction = predict_collision(&pos, &dir, mode, radius, space, buffer);
            prediction.distance = (prediction.distance - ARC_EXTRA_BUFFER * buffer).max(0.0);
            options.push(prediction);
        }
    }
    options.push(predict_collision(&pos, &dir, SteeringMode::Straight, f64::INFINITY, space, buffer));
    options
}

/// Distances converted to times: min at the slowest gain, max at the fastest.
pub fn time_range(options: &[CollisionPrediction], speed: f64, bounds: &GainBounds) -> TimeRange {
    if options.is_empty() {
        return TimeRange::new(0.0, 0.0);
    }
    let min = options.iter().map(|o| o.distance).fold(f64::INFINITY, f64::min);
    let max = options.iter().map(|o| o.distance).fold(0.0, f64::max);
    TimeRange::new(min / speed * bounds.min_translation, max / speed * bounds.max_translation)
}

fn furthest_option(options: &[CollisionPrediction]) -> Option<CollisionPrediction> {
    options
        .iter()
        .copied()
        .filter(|o| o.distance > 0.0)
        .max_by_key(|o| OrderedFloat(o.distance))
}

/// A heading is safe when the boundary is not right there, or when it points
/// away from the nearest boundary point.
pub fn direction_is_safe(pos: Point, dir: Vector2D, space: &PhysicalSpace) -> bool {
    let (distance, nearest) = nearest_distance_to_boundary(&pos, space);
    if distance > SAFE_CLEARANCE {
        return true;
    }
    let away = pos - nearest;
    away.dot(&dir) > 0.0 && away.angle_to(&dir) < SAFE_ANGLE
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityCell {
    pub center: Point,
    /// Collision-time range per sampled heading.
    pub profile: Vec<TimeRange>,
    /// Sum of `1 / max_time` over headings, smaller is safer.
    pub score: f64,
    pub max_time: f64,
}

impl ReachabilityCell {
    fn profile(center: Point, space: &PhysicalSpace, config: &RedirectionConfig) -> Self {
        let bounds = config.gain_bounds();
        let samples = config.scheduler.direction_samples;
        let mut profile = Vec::with_capacity(samples);
        let mut score = 0.0;
        let mut max_time: f64 = 0.0;
        for i in 0..samples {
            let options = collision_options(center, sample_direction(i, samples), space, config);
            let range = time_range(&options, config.translation_speed, &bounds);
            score += if range.max > EPSILON { 1.0 / range.max } else { f64::INFINITY };
            max_time = max_time.max(range.max);
            profile.push(range);
        }
        ReachabilityCell {
            center,
            profile,
            score,
            max_time,
        }
    }
}

/// Precomputed safety grid of one avatar's space. Immutable after setup.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityGrid {
    cells: Vec<ReachabilityCell>,
}

impl ReachabilityGrid {
    /// Covers the bounding box of `space`.
    pub fn new(space: &PhysicalSpace, config: &RedirectionConfig) -> Self {
        let (min, max) = space.bounding_box();
        Self::with_region(space, min, max, config)
    }

    /// Covers an explicit region of `space`.
    pub fn with_region(space: &PhysicalSpace, min: Point, max: Point, config: &RedirectionConfig) -> Self {
        let size = config.scheduler.cell_size;
        let columns = ((max.x - min.x) / size).floor().max(0.0) as usize;
        let rows = ((max.y - min.y) / size).floor().max(0.0) as usize;
        let mut cells = Vec::new();
        for i in 0..columns {
            for j in 0..rows {
                let center = Point::new(min.x + (i as f64 + 0.5) * size, min.y + (j as f64 + 0.5) * size);
                if space.contains(&center) {
                    cells.push(ReachabilityCell::profile(center, space, config));
                }
            }
        }
        debug!("Reachability grid built with {} cells", cells.len());
        ReachabilityGrid { cells }
    }

    pub fn cells(&self) -> &[ReachabilityCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Point reached after walking `s` meters along a path.
fn path_point(pos: Point, dir: Vector2D, mode: SteeringMode, radius: f64, s: f64) -> Point {
    if mode == SteeringMode::Straight || !radius.is_finite() {
        return pos + dir * s;
    }
    let side = mode.curvature_sign();
    let center = pos + dir.perpendicular() * (side * radius);
    let angle = (s / radius).to_degrees() * side;
    center + (pos - center).rotate(angle)
}

fn path_clear_of_peers(
    pos: Point,
    dir: Vector2D,
    mode: SteeringMode,
    radius: f64,
    length: f64,
    peers: &[Point],
    buffer: f64,
) -> bool {
    let samples = (length / PATH_SAMPLE_STEP).ceil().max(1.0) as usize;
    (0..=samples).all(|i| {
        let point = path_point(pos, dir, mode, radius, length * i as f64 / samples as f64);
        peers.iter().all(|p| p.distance(&point) > buffer)
    })
}

/// Checks the speed window, the boundary and the peers for one path.
#[allow(clippy::too_many_arguments)]
fn validate_path(
    pos: Point,
    dir: Vector2D,
    mode: SteeringMode,
    radius: f64,
    length: f64,
    time: f64,
    space: &PhysicalSpace,
    peers: &[Point],
    config: &RedirectionConfig,
) -> Option<RedirectParams> {
    let bounds = config.gain_bounds();
    let nominal = config.translation_speed * time;
    if length < EPSILON || length < nominal / bounds.max_translation || length > nominal / bounds.min_translation {
        return None;
    }
    let collision = predict_collision(&pos, &dir, mode, radius, space, config.reset_trigger_buffer);
    if collision.distance < length {
        return None;
    }
    if !path_clear_of_peers(pos, dir, mode, radius, length, peers, config.reset_trigger_buffer) {
        return None;
    }
    Some(RedirectParams {
        mode,
        radius,
        translation_gain: bounds.clamp_translation(nominal / length),
    })
}

/// Reach `target` without turning first: a straight line when it is dead
/// ahead, otherwise the unique arc tangent to `dir`.
pub fn reach_with_heading(
    target: Point,
    pos: Point,
    dir: Vector2D,
    time: f64,
    space: &PhysicalSpace,
    peers: &[Point],
    config: &RedirectionConfig,
) -> Option<RedirectParams> {
    let diff = target - pos;
    let a = diff.dot(&diff);
    if a < EPSILON {
        return None;
    }
    let right = dir.perpendicular_right();
    let b = diff.dot(&right);
    if b.abs() < STRAIGHT_TOLERANCE {
        if diff.dot(&dir) <= 0.0 {
            return None;
        }
        return validate_path(pos, dir, SteeringMode::Straight, f64::INFINITY, diff.magnitude(), time, space, peers, config);
    }

    // Signed radius toward the right-hand side
    let signed = a / (2.0 * b);
    let radius = signed.abs();
    if radius < config.curvature_radius {
        return None;
    }
    let (mode, center) = if signed > 0.0 {
        (SteeringMode::Right, pos + right * radius)
    } else {
        (SteeringMode::Left, pos - right * radius)
    };
    let swept = (pos - center).signed_angle_to(&(target - center));
    let sweep = match mode {
        SteeringMode::Left => swept.rem_euclid(360.0),
        _ => (-swept).rem_euclid(360.0),
    };
    let length = radius * sweep.to_radians();
    validate_path(pos, dir, mode, radius, length, time, space, peers, config)
}

/// Reach `target` after a reset: straight when it is far enough, otherwise
/// along a minimum-radius arc (left first). Returns the heading to face.
pub fn reach_after_reset(
    target: Point,
    pos: Point,
    time: f64,
    space: &PhysicalSpace,
    peers: &[Point],
    config: &RedirectionConfig,
) -> Option<(Vector2D, RedirectParams)> {
    let diff = target - pos;
    let distance = diff.magnitude();
    if distance < EPSILON {
        return None;
    }
    let chord = diff.normalize();
    let bounds = config.gain_bounds();
    let nominal = config.translation_speed * time;

    if nominal / bounds.max_translation <= distance {
        if !direction_is_safe(pos, chord, space) {
            return None;
        }
        return validate_path(pos, chord, SteeringMode::Straight, f64::INFINITY, distance, time, space, peers, config)
            .map(|params| (chord, params));
    }

    let radius = config.curvature_radius;
    if distance > 2.0 * radius {
        return None;
    }
    // Tangent-chord angle equals half the swept angle
    let half = (distance / (2.0 * radius)).asin();
    let length = 2.0 * radius * half;
    for (mode, start) in [
        (SteeringMode::Left, chord.rotate(-half.to_degrees())),
        (SteeringMode::Right, chord.rotate(half.to_degrees())),
    ] {
        if !direction_is_safe(pos, start, space) {
            continue;
        }
        if let Some(params) = validate_path(pos, start, mode, radius, length, time, space, peers, config) {
            return Some((start, params));
        }
    }
    None
}

/// Owns the per-avatar grids and makes decisions from a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConflictScheduler {
    grids: BTreeMap<usize, ReachabilityGrid>,
}

impl ConflictScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, avatar: usize, grid: ReachabilityGrid) {
        self.grids.insert(avatar, grid);
    }

    pub fn grid(&self, avatar: usize) -> Option<&ReachabilityGrid> {
        self.grids.get(&avatar)
    }

    pub fn avatars(&self) -> impl Iterator<Item = usize> + '_ {
        self.grids.keys().copied()
    }

    pub fn assess(&self, view: &AvatarView, config: &RedirectionConfig) -> Assessment {
        let bounds = config.gain_bounds();
        let speed = config.translation_speed;
        let pos = view.physical.position;

        let current_options = collision_options(pos, view.physical.direction, view.space, config);
        let collision_time = time_range(&current_options, speed, &bounds);

        let samples = config.scheduler.direction_samples;
        let mut reset_min = f64::INFINITY;
        let mut reset_max: f64 = 0.0;
        let mut furthest = None;
        for i in 0..samples {
            let dir = sample_direction(i, samples);
            if !direction_is_safe(pos, dir, view.space) {
                continue;
            }
            let options = collision_options(pos, dir, view.space, config);
            let range = time_range(&options, speed, &bounds);
            if range.max > reset_max {
                furthest = furthest_option(&options).map(|o| (dir, o));
            }
            reset_min = reset_min.min(range.min);
            reset_max = reset_max.max(range.max);
        }
        let reset_time = if reset_min.is_finite() {
            TimeRange::new(reset_min, reset_max)
        } else {
            TimeRange::new(0.0, 0.0)
        };

        let time_to_waypoint = view
            .waypoint
            .map(|w| ((w.distance(&view.virtual_position) - config.waypoint_threshold) / speed).max(0.0))
            .unwrap_or(0.0);

        Assessment {
            avatar: view.id,
            collision_options: current_options,
            collision_time,
            reset_time,
            furthest,
            time_to_waypoint,
        }
    }

    /// Runs one decision. Views are expected in ascending id order.
    pub fn decide(&self, trigger: ScheduleTrigger, views: &[AvatarView], config: &RedirectionConfig) -> ScheduleDecision {
        let assessments: Vec<Assessment> = views.iter().map(|v| self.assess(v, config)).collect();
        let key = |a: &Assessment| match trigger {
            ScheduleTrigger::SynchronizedReset => a.reset_time.max,
            ScheduleTrigger::WaypointReached => a.collision_time.max,
        };
        let must_reset: Vec<usize> = assessments
            .iter()
            .filter(|a| key(a) <= a.time_to_waypoint)
            .map(|a| a.avatar)
            .collect();
        let reset_first = assessments
            .iter()
            .filter(|a| must_reset.contains(&a.avatar))
            .min_by_key(|a| (OrderedFloat(key(a)), a.avatar))
            .map(|a| (a.avatar, key(a)));
        let synchronized = trigger == ScheduleTrigger::SynchronizedReset;

        let instructions = views
            .iter()
            .zip(&assessments)
            .map(|(view, assessment)| match reset_first {
                None => self.guide(view, assessment, GuidanceStrategy::SafestPosition, synchronized, config),
                Some((first, _)) if first == view.id => {
                    self.guide(view, assessment, GuidanceStrategy::FurthestPosition, true, config)
                }
                Some((_, budget)) => {
                    self.guide(view, assessment, GuidanceStrategy::MaxTimePosition(budget), synchronized, config)
                }
            })
            .collect();

        let decision = ScheduleDecision {
            trigger,
            must_reset,
            reset_first: reset_first.map(|(id, _)| id),
            budget: reset_first.map(|(_, budget)| budget),
            assessments,
            instructions,
        };
        debug!(
            "Schedule {:?}: must_reset={:?} first={:?} budget={:?}",
            decision.trigger, decision.must_reset, decision.reset_first, decision.budget
        );
        decision
    }

    /// Like [`Self::decide`], but a waypoint decision that resets someone in
    /// synchronized mode is re-run as a synchronized reset.
    pub fn schedule(&self, trigger: ScheduleTrigger, views: &[AvatarView], config: &RedirectionConfig) -> ScheduleDecision {
        let decision = self.decide(trigger, views, config);
        if trigger == ScheduleTrigger::WaypointReached
            && config.synchronized_reset
            && decision.instructions.iter().any(|i| i.reset)
        {
            return self.decide(ScheduleTrigger::SynchronizedReset, views, config);
        }
        decision
    }

    fn guide(
        &self,
        view: &AvatarView,
        assessment: &Assessment,
        strategy: GuidanceStrategy,
        reset: bool,
        config: &RedirectionConfig,
    ) -> Instruction {
        let pos = view.physical.position;
        let budget = match strategy {
            GuidanceStrategy::MaxTimePosition(budget) => budget,
            _ => assessment.time_to_waypoint,
        };
        let cells = match (strategy, self.grids.get(&view.id)) {
            (GuidanceStrategy::FurthestPosition, _) | (_, None) => &[][..],
            (_, Some(grid)) => grid.cells(),
        };

        let mut best: Option<(f64, Point, Option<Vector2D>, RedirectParams)> = None;
        for cell in cells {
            let value = match strategy {
                GuidanceStrategy::SafestPosition => -cell.score,
                _ => cell.max_time,
            };
            if best.as_ref().is_some_and(|(v, ..)| value <= *v) {
                continue;
            }
            let reached = if reset {
                reach_after_reset(cell.center, pos, budget, view.space, &view.peers, config)
                    .map(|(dir, params)| (Some(dir), params))
            } else {
                reach_with_heading(cell.center, pos, view.physical.direction, budget, view.space, &view.peers, config)
                    .map(|params| (None, params))
            };
            if let Some((dir, params)) = reached {
                best = Some((value, cell.center, dir, params));
            }
        }

        if let Some((_, target, reset_direction, params)) = best {
            return Instruction {
                avatar: view.id,
                reset,
                strategy,
                params,
                reset_direction,
                target: Some(target),
                fallback: false,
            };
        }
        self.furthest_instruction(view, assessment, strategy, reset, config)
    }

    /// Always available: the furthest option, at full translation gain.
    fn furthest_instruction(
        &self,
        view: &AvatarView,
        assessment: &Assessment,
        strategy: GuidanceStrategy,
        reset: bool,
        config: &RedirectionConfig,
    ) -> Instruction {
        let gain = config.max_translation_gain;
        let heading_option = furthest_option(&assessment.collision_options);
        let (reset_direction, option) = match (reset, assessment.furthest) {
            (true, Some((dir, option))) => (Some(dir), Some(option)),
            _ => (None, heading_option),
        };
        let (mode, radius) = option
            .map(|o| (o.mode, o.radius))
            .unwrap_or((SteeringMode::Straight, f64::INFINITY));
        Instruction {
            avatar: view.id,
            reset,
            strategy,
            params: RedirectParams {
                mode,
                radius,
                translation_gain: gain,
            },
            reset_direction,
            target: None,
            fallback: strategy != GuidanceStrategy::FurthestPosition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{rectangle, ObstacleLayout};

    const EPS: f64 = 1e-9;

    fn square() -> PhysicalSpace {
        rectangle(10.0, 10.0, ObstacleLayout::None).unwrap().space
    }

    fn view<'a>(id: usize, space: &'a PhysicalSpace, physical: Pose, waypoint: Option<Point>, peers: Vec<Point>) -> AvatarView<'a> {
        AvatarView {
            id,
            space,
            physical,
            virtual_position: physical.position,
            waypoint,
            peers,
        }
    }

    // ==================== Collision Option Tests ====================

    #[test]
    fn test_collision_options_count_and_straight() {
        let config = RedirectionConfig::default();
        let options = collision_options(Point::new(3.5, 0.0), Vector2D::new(1.0, 0.0), &square(), &config);
        assert_eq!(options.len(), 11);
        let straight = options.last().unwrap();
        assert_eq!(straight.mode, SteeringMode::Straight);
        assert!((straight.distance - 1.0).abs() < 1e-9);
        assert!(options[..10].iter().all(|o| o.distance < 1.0));
    }

    #[test]
    fn test_time_range_scales_by_gains() {
        let options = [
            CollisionPrediction {
                mode: SteeringMode::Straight,
                radius: f64::INFINITY,
                distance: 2.0,
            },
            CollisionPrediction {
                mode: SteeringMode::Left,
                radius: 7.5,
                distance: 1.0,
            },
        ];
        let bounds = RedirectionConfig::default().gain_bounds();
        let range = time_range(&options, 1.0, &bounds);
        assert!((range.min - 0.86).abs() < EPS);
        assert!((range.max - 2.52).abs() < EPS);
    }

    #[test]
    fn test_direction_is_safe_near_wall() {
        let space = square();
        assert!(direction_is_safe(Point::origin(), Vector2D::new(1.0, 0.0), &space));
        let wall = Point::new(4.95, 0.0);
        assert!(!direction_is_safe(wall, Vector2D::new(1.0, 0.0), &space));
        assert!(!direction_is_safe(wall, Vector2D::new(0.0, 1.0), &space));
        assert!(direction_is_safe(wall, Vector2D::new(-1.0, 0.2), &space));
    }

    // ==================== Grid Tests ====================

    #[test]
    fn test_grid_covers_open_space() {
        let config = RedirectionConfig::default();
        let grid = ReachabilityGrid::new(&square(), &config);
        assert_eq!(grid.len(), 400);
        let blocked = rectangle(10.0, 10.0, ObstacleLayout::CenterBlock).unwrap().space;
        let grid = ReachabilityGrid::new(&blocked, &config);
        // The 3x3 m block removes 36 cells
        assert_eq!(grid.len(), 364);
    }

    #[test]
    fn test_center_cell_safer_than_corner() {
        let config = RedirectionConfig::default();
        let grid = ReachabilityGrid::new(&square(), &config);
        let find = |p: Point| grid.cells().iter().find(|c| c.center.distance(&p) < 1e-9).unwrap();
        let center = find(Point::new(0.25, 0.25));
        let corner = find(Point::new(4.75, 4.75));
        assert!(center.score < corner.score);
        // Facing into the corner there is no room at all
        assert!(corner.profile.iter().any(|r| r.max == 0.0));
        assert_eq!(center.profile.len(), 30);
    }

    // ==================== Reachability Tests ====================

    #[test]
    fn test_reach_with_heading_straight_ahead() {
        let config = RedirectionConfig::default();
        let space = square();
        let params = reach_with_heading(Point::new(2.0, 0.0), Point::origin(), Vector2D::new(1.0, 0.0), 2.0, &space, &[], &config)
            .unwrap();
        assert_eq!(params.mode, SteeringMode::Straight);
        assert!((params.translation_gain - 1.0).abs() < EPS);
    }

    #[test]
    fn test_reach_with_heading_rejects_tight_turn() {
        let config = RedirectionConfig::default();
        let space = square();
        // Needs a radius of about 1 m
        let params = reach_with_heading(Point::new(1.0, 1.0), Point::origin(), Vector2D::new(1.0, 0.0), 1.6, &space, &[], &config);
        assert!(params.is_none());
    }

    #[test]
    fn test_reach_with_heading_gentle_left_arc() {
        let config = RedirectionConfig::default();
        let space = square();
        let target = Point::new(3.0, 0.3);
        let params = reach_with_heading(target, Point::origin(), Vector2D::new(1.0, 0.0), 3.0, &space, &[], &config).unwrap();
        assert_eq!(params.mode, SteeringMode::Left);
        let expected = (9.0 + 0.09) / 0.6;
        assert!((params.radius - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reach_with_heading_outside_speed_window() {
        let config = RedirectionConfig::default();
        let space = square();
        // 2 m in 1 s would need a gain of 0.5
        let params = reach_with_heading(Point::new(2.0, 0.0), Point::origin(), Vector2D::new(1.0, 0.0), 1.0, &space, &[], &config);
        assert!(params.is_none());
    }

    #[test]
    fn test_reach_blocked_by_peer() {
        let config = RedirectionConfig::default();
        let space = square();
        let peers = [Point::new(1.0, 0.1)];
        let params = reach_with_heading(Point::new(2.0, 0.0), Point::origin(), Vector2D::new(1.0, 0.0), 2.0, &space, &peers, &config);
        assert!(params.is_none());
    }

    #[test]
    fn test_reach_after_reset_straight_behind() {
        let config = RedirectionConfig::default();
        let space = square();
        let (dir, params) = reach_after_reset(Point::new(-2.0, 0.0), Point::origin(), 2.0, &space, &[], &config).unwrap();
        assert!((dir.x + 1.0).abs() < EPS);
        assert_eq!(params.mode, SteeringMode::Straight);
    }

    #[test]
    fn test_reach_after_reset_short_target_uses_arc() {
        let config = RedirectionConfig::default();
        let space = square();
        // 1 m away but 2 s to fill: a straight walk would be too short
        let target = Point::new(0.0, 1.0);
        let reached = reach_after_reset(target, Point::origin(), 2.0, &space, &[], &config);
        // An arc of radius 7.5 through a 1 m chord is barely longer than 1 m
        assert!(reached.is_none());
        let reached = reach_after_reset(target, Point::origin(), 1.0, &space, &[], &config).unwrap();
        assert_eq!(reached.1.mode, SteeringMode::Straight);
    }

    #[test]
    fn test_path_point_on_left_arc() {
        let p = path_point(Point::origin(), Vector2D::new(1.0, 0.0), SteeringMode::Left, 1.0, std::f64::consts::FRAC_PI_2);
        assert!((p.x - 1.0).abs() < 1e-9);
        assert!((p.y - 1.0).abs() < 1e-9);
    }

    // ==================== Assessment Tests ====================

    #[test]
    fn test_assessment_uses_current_heading() {
        let config = RedirectionConfig::default();
        let space = square();
        let mut scheduler = ConflictScheduler::new();
        scheduler.register(0, ReachabilityGrid::new(&space, &config));
        let pose = Pose::facing_degrees(Point::new(3.5, 0.0), 0.0);
        let assessment = scheduler.assess(&view(0, &space, pose, Some(Point::new(4.0, 0.0)), vec![]), &config);

        let expected = collision_options(pose.position, pose.direction, &space, &config);
        assert_eq!(assessment.collision_options, expected);
        let range = time_range(&expected, config.translation_speed, &config.gain_bounds());
        assert!((assessment.collision_time.max - range.max).abs() < EPS);
        // Facing the wall, turning away leaves more room than walking on
        assert!(assessment.reset_time.max > assessment.collision_time.max);
        assert!(assessment.furthest.is_some());
    }

    // ==================== Decision Tests ====================

    #[test]
    fn test_nobody_flagged_guides_to_safest() {
        let config = RedirectionConfig::default();
        let space = square();
        let mut scheduler = ConflictScheduler::new();
        scheduler.register(0, ReachabilityGrid::new(&space, &config));
        let views = [view(0, &space, Pose::facing_degrees(Point::origin(), 0.0), Some(Point::new(1.0, 0.0)), vec![])];
        let decision = scheduler.decide(ScheduleTrigger::WaypointReached, &views, &config);
        assert!(decision.must_reset.is_empty());
        assert_eq!(decision.reset_first, None);
        let instruction = decision.instruction(0).unwrap();
        assert!(!instruction.reset);
        assert_eq!(instruction.strategy, GuidanceStrategy::SafestPosition);
    }

    #[test]
    fn test_flagged_avatar_resets_first() {
        let config = RedirectionConfig::default();
        let space = square();
        let mut scheduler = ConflictScheduler::new();
        scheduler.register(0, ReachabilityGrid::new(&space, &config));
        scheduler.register(1, ReachabilityGrid::new(&space, &config));
        let a = Pose::facing_degrees(Point::new(3.5, 0.0), 0.0);
        let b = Pose::facing_degrees(Point::new(-2.0, 0.0), 90.0);
        let views = [
            view(0, &space, a, Some(Point::new(13.5, 0.0)), vec![b.position]),
            view(1, &space, b, Some(Point::new(-2.0, 2.0)), vec![a.position]),
        ];
        let decision = scheduler.decide(ScheduleTrigger::WaypointReached, &views, &config);
        assert_eq!(decision.must_reset, vec![0]);
        assert_eq!(decision.reset_first, Some(0));
        let budget = decision.assessments[0].collision_time.max;
        assert_eq!(decision.budget, Some(budget));

        let first = decision.instruction(0).unwrap();
        assert!(first.reset);
        assert_eq!(first.strategy, GuidanceStrategy::FurthestPosition);
        assert!(!first.fallback);
        assert_eq!(first.params.translation_gain, config.max_translation_gain);

        let other = decision.instruction(1).unwrap();
        assert!(!other.reset);
        assert_eq!(other.strategy, GuidanceStrategy::MaxTimePosition(budget));
    }

    #[test]
    fn test_schedule_reruns_synchronized() {
        let config = RedirectionConfig::default();
        let space = square();
        let scheduler = ConflictScheduler::new();
        let a = Pose::facing_degrees(Point::new(3.5, 0.0), 0.0);
        let views = [view(0, &space, a, Some(Point::new(13.5, 0.0)), vec![])];
        let decision = scheduler.schedule(ScheduleTrigger::WaypointReached, &views, &config);
        assert_eq!(decision.trigger, ScheduleTrigger::SynchronizedReset);
    }

    #[test]
    fn test_missing_grid_falls_back() {
        let config = RedirectionConfig::default();
        let space = square();
        let scheduler = ConflictScheduler::new();
        let views = [view(0, &space, Pose::facing_degrees(Point::origin(), 0.0), Some(Point::new(1.0, 0.0)), vec![])];
        let decision = scheduler.decide(ScheduleTrigger::WaypointReached, &views, &config);
        let instruction = decision.instruction(0).unwrap();
        assert!(instruction.fallback);
        assert_eq!(instruction.params.translation_gain, config.max_translation_gain);
        assert!(instruction.target.is_none());
        assert!(instruction.reset_direction.is_none());
    }

    #[test]
    fn test_decision_is_deterministic() {
        let config = RedirectionConfig::default();
        let space = square();
        let mut scheduler = ConflictScheduler::new();
        scheduler.register(0, ReachabilityGrid::new(&space, &config));
        scheduler.register(1, ReachabilityGrid::new(&space, &config));
        let a = Pose::facing_degrees(Point::new(1.0, 1.0), 30.0);
        let b = Pose::facing_degrees(Point::new(-1.0, -2.0), 200.0);
        let views = [
            view(0, &space, a, Some(Point::new(4.0, 1.0)), vec![b.position]),
            view(1, &space, b, Some(Point::new(-3.0, -2.0)), vec![a.position]),
        ];
        let first = scheduler.decide(ScheduleTrigger::SynchronizedReset, &views, &config);
        let second = scheduler.decide(ScheduleTrigger::SynchronizedReset, &views, &config);
        assert_eq!(first, second);
    }
}

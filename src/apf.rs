//! # Artificial Potential Field Redirection
//!
//! Boundaries, obstacles and other users act as repulsive sources whose
//! contributions sum into one steering force. The normalized force is the
//! desired physical facing direction.
//!
//! ## Variants
//!
//! | Kind | Wall term | Peer term | Extras |
//! |------|-----------|-----------|--------|
//! | `apf_basic` | `d/|d|^2` from nearest point of visible boundary edges and every obstacle | `d/|d|^2` | none |
//! | `apf_segmented` | `C*len*d/|d|^(1+lambda)` per <= 1 m piece | `k*d/|d|^(1+gamma)` | proximity-scaled steering rate |
//! | `apf_dynamic` | `d/|d|^2` from visible edges | gamma = 1.5 | higher-priority avatar term, gravitation, priority |
//! | `apf_haptic` | as basic | as basic | attraction toward a physical prop when alignment is achievable |
//!
//! `k` weights a peer by how directly the two users face each other, clamped
//! to [0, 1].
//!
//! ## Gains
//!
//! - translation: max gain when walking against the force, else 1
//!   (segmented: always 1)
//! - rotation: min gain while turning toward the force, max gain otherwise
//! - curvature: full strength toward the force (segmented: proximity rate)

use crate::config::RedirectorKind;
use crate::geometry::{nearest_distance_to_boundary, nearest_point_on_polygon, sign, Segment};
use crate::redirector::{GainRequest, Redirector, StepContext};
use crate::space::PhysicalSpace;
use crate::structs::{AvatarSnapshot, Gains, Point, Vector2D, EPSILON};

const SEGMENT_LENGTH: f64 = 1.0;
const SEGMENTED_C: f64 = 0.00897;
const SEGMENTED_LAMBDA: f64 = 2.656;
const SEGMENTED_GAMMA: f64 = 3.091;
/// Steering rate cap (degrees/s) reached at the wall.
const PROXIMITY_MAX_RATE: f64 = 15.0;
const MIN_STEP_DISTANCE: f64 = 0.001;

const DYNAMIC_GAMMA: f64 = 1.5;
const AVATAR_WEIGHT: f64 = 0.25;
const GRAVITATION_WEIGHT: f64 = 0.5;
const PRIORITY_MAGNITUDE_WEIGHT: f64 = 1.0;
const PRIORITY_ANGLE_WEIGHT: f64 = 0.02;
const CLEARANCE_WEIGHT: f64 = 2.0;
const CENTER_DISTANCE_WEIGHT: f64 = 1.0;

/// `d.normalize() / |d|^exponent`, zero for coincident points.
fn inverse_power(d: Vector2D, exponent: f64) -> Vector2D {
    let distance = d.magnitude();
    if distance < EPSILON {
        return Vector2D::zero();
    }
    d.normalize() * (1.0 / distance.powf(exponent))
}

/// True when `pos` is on the walkable side of `edge`'s nearest point.
fn faces_edge(pos: &Point, edge: &Segment, nearest: &Point) -> bool {
    let inward = edge.vector().perpendicular();
    inward.dot(&(*pos - *nearest).normalize()) > 0.0
}

/// How directly two users face each other, in [0, 1].
pub fn facing_weight(pos: Point, dir: Vector2D, other_pos: Point, other_dir: Vector2D) -> f64 {
    let theta1 = (other_pos - pos).angle_to(&dir).to_radians();
    let theta2 = (pos - other_pos).angle_to(&other_dir).to_radians();
    ((theta1.cos() + theta2.cos()) / 2.0).clamp(0.0, 1.0)
}

/// Repulsion from another user weighted by [`facing_weight`].
pub fn peer_force(pos: Point, dir: Vector2D, other_pos: Point, other_dir: Vector2D, gamma: f64) -> Vector2D {
    let k = facing_weight(pos, dir, other_pos, other_dir);
    inverse_power(pos - other_pos, gamma) * k
}

/// Unnormalized negative gradient of the basic field: nearest points of
/// visible boundary edges, nearest point of each obstacle and every peer.
pub fn basic_gradient(pos: Point, space: &PhysicalSpace, peers: &[AvatarSnapshot]) -> Vector2D {
    let mut sources = Vec::new();
    for edge in space.boundary_edges() {
        let nearest = edge.nearest_point(&pos);
        if faces_edge(&pos, &edge, &nearest) {
            sources.push(nearest);
        }
    }
    for obstacle in space.obstacles() {
        sources.push(nearest_point_on_polygon(&pos, obstacle).1);
    }
    sources.extend(peers.iter().map(|p| p.physical.position));

    sources
        .iter()
        .fold(Vector2D::zero(), |acc, source| acc + inverse_power(pos - *source, 1.0))
}

/// Normalized basic field force, used as the fallback reset direction.
pub fn basic_force(pos: Point, space: &PhysicalSpace, peers: &[AvatarSnapshot]) -> Vector2D {
    basic_gradient(pos, space, peers).normalize()
}

/// Wall force with every edge split into pieces of at most 1 m.
pub fn segmented_wall_force(pos: Point, space: &PhysicalSpace) -> Vector2D {
    let mut force = Vector2D::zero();
    for edge in space.edges() {
        for piece in edge.split(SEGMENT_LENGTH) {
            let center = piece.start.midpoint(&piece.end);
            if !faces_edge(&pos, &piece, &center) {
                continue;
            }
            force += inverse_power(pos - center, SEGMENTED_LAMBDA) * (SEGMENTED_C * piece.length());
        }
    }
    force
}

/// `d/|d|^2` from the nearest point of every visible edge.
pub fn visible_wall_force(pos: Point, space: &PhysicalSpace) -> Vector2D {
    let mut force = Vector2D::zero();
    for edge in space.edges() {
        let nearest = edge.nearest_point(&pos);
        if faces_edge(&pos, &edge, &nearest) {
            force += inverse_power(pos - nearest, 1.0);
        }
    }
    force
}

/// Gains that steer the user toward `force`.
pub fn force_gains(force: Vector2D, ctx: &StepContext) -> GainRequest {
    let dir = ctx.direction();
    let bounds = &ctx.bounds;
    let translation = if force.dot(&dir) < 0.0 {
        bounds.max_translation
    } else {
        1.0
    };
    let steer = sign(dir.signed_angle_to(&force));
    Gains {
        translation,
        rotation: rotation_toward(steer, ctx),
        curvature: steer / bounds.curvature_radius,
    }
}

fn rotation_toward(steer: f64, ctx: &StepContext) -> f64 {
    if ctx.motion.delta_direction * steer > 0.0 {
        ctx.bounds.min_rotation
    } else {
        ctx.bounds.max_rotation
    }
}

#[derive(Debug, Clone)]
pub struct PotentialFieldRedirector {
    kind: RedirectorKind,
    total_force: Option<Vector2D>,
    alignment: bool,
}

impl PotentialFieldRedirector {
    /// `kind` must be one of the `apf_*` kinds; anything else behaves as basic.
    pub fn new(kind: RedirectorKind) -> Self {
        let kind = if kind.is_potential_field() {
            kind
        } else {
            RedirectorKind::ApfBasic
        };
        PotentialFieldRedirector {
            kind,
            total_force: None,
            alignment: false,
        }
    }

    /// Whether the haptic variant is currently attracting toward its prop.
    pub fn alignment_state(&self) -> bool {
        self.alignment
    }

    fn segmented_force(&self, ctx: &StepContext) -> Vector2D {
        let pos = ctx.position();
        let dir = ctx.direction();
        let mut force = segmented_wall_force(pos, ctx.space);
        for peer in ctx.peers {
            force += peer_force(pos, dir, peer.physical.position, peer.physical.direction, SEGMENTED_GAMMA);
        }
        force
    }

    /// Wall and peer force of the dynamic variant, without the avatar term.
    fn dynamic_base_force(&self, ctx: &StepContext) -> Vector2D {
        let pos = ctx.position();
        let dir = ctx.direction();
        let mut force = visible_wall_force(pos, ctx.space);
        for peer in ctx.peers {
            force += peer_force(pos, dir, peer.physical.position, peer.physical.direction, DYNAMIC_GAMMA);
        }
        force
    }

    fn dynamic_force(&self, ctx: &StepContext) -> Vector2D {
        let pos = ctx.position();
        let dir = ctx.direction();
        let mut force = self.dynamic_base_force(ctx);
        // Avoid the spot just ahead of every avatar that outranks this one
        for peer in ctx.peers.iter().filter(|p| p.priority > ctx.avatar.priority) {
            let ahead = peer.physical.position + peer.physical.direction;
            force += peer_force(pos, dir, ahead, peer.physical.direction, DYNAMIC_GAMMA) * AVATAR_WEIGHT;
        }
        let gravitation = steering_target_direction(pos, dir, ctx.space, ctx.peers)
            * (GRAVITATION_WEIGHT * force.magnitude());
        (force + gravitation).normalize()
    }

    fn update_alignment(&mut self, ctx: &StepContext) {
        self.alignment = false;
        let (Some(haptic), Some(final_waypoint)) = (ctx.haptic_target, ctx.final_waypoint) else {
            return;
        };
        let pos = ctx.position();
        let virtual_distance = final_waypoint.distance(&ctx.avatar.virtual_pose.position);
        let physical_distance = haptic.distance(&pos);
        let bounds = &ctx.bounds;
        let reachable = bounds.min_translation * physical_distance < virtual_distance
            && virtual_distance < bounds.max_translation * physical_distance;
        if !reachable {
            return;
        }
        let bearing = ctx.direction().angle_to(&(haptic - pos)).to_radians();
        let limit = (physical_distance / (2.0 * bounds.curvature_radius)).min(1.0).asin();
        self.alignment = bearing < limit;
    }

    fn haptic_force(&mut self, ctx: &StepContext) -> Vector2D {
        let pos = ctx.position();
        let mut gradient = basic_gradient(pos, ctx.space, ctx.peers);
        self.update_alignment(ctx);
        if self.alignment {
            if let Some(haptic) = ctx.haptic_target {
                let d = pos - haptic;
                gradient += -(d.normalize() * d.magnitude().powi(2));
            }
        }
        gradient.normalize()
    }

    fn proximity_gains(&self, force: Vector2D, ctx: &StepContext) -> GainRequest {
        let dir = ctx.direction();
        let steer = sign(dir.signed_angle_to(&force));
        let radius = ctx.bounds.curvature_radius;
        let step = ctx.motion.delta_physical.magnitude();
        let dt = ctx.motion.dt;
        let speed = if dt > 0.0 { step / dt } else { 0.0 };

        let mut rate = 360.0 * speed / (2.0 * std::f64::consts::PI * radius);
        let (distance, _) = nearest_distance_to_boundary(&ctx.position(), ctx.space);
        if distance < radius {
            let t = 1.0 - distance / radius;
            rate = (1.0 - t) * rate + t * PROXIMITY_MAX_RATE;
        }
        Gains {
            translation: 1.0,
            rotation: rotation_toward(steer, ctx),
            curvature: steer * (rate * dt).to_radians() / step.max(MIN_STEP_DISTANCE),
        }
    }
}

impl Redirector for PotentialFieldRedirector {
    fn kind(&self) -> RedirectorKind {
        self.kind
    }

    fn inject_redirection(&mut self, ctx: &StepContext) -> GainRequest {
        let pos = ctx.position();
        let (force, request) = match self.kind {
            RedirectorKind::ApfSegmented => {
                let force = self.segmented_force(ctx).normalize();
                (force, self.proximity_gains(force, ctx))
            }
            RedirectorKind::ApfDynamic => {
                let force = self.dynamic_force(ctx);
                (force, force_gains(force, ctx))
            }
            RedirectorKind::ApfHaptic => {
                let force = self.haptic_force(ctx);
                (force, force_gains(force, ctx))
            }
            _ => {
                let force = basic_force(pos, ctx.space, ctx.peers);
                (force, force_gains(force, ctx))
            }
        };
        self.total_force = Some(force);
        request
    }

    fn priority(&mut self, ctx: &StepContext) -> Option<f64> {
        if self.kind != RedirectorKind::ApfDynamic {
            return None;
        }
        let force = self.dynamic_base_force(ctx);
        let angle = force.angle_to(&ctx.direction());
        Some(-(PRIORITY_MAGNITUDE_WEIGHT * force.magnitude() + PRIORITY_ANGLE_WEIGHT * angle))
    }

    fn total_force(&self) -> Option<Vector2D> {
        self.total_force
    }
}

/// Direction toward the open spot ahead that is furthest from all peers.
///
/// Samples a unit grid spanned by the feet of the first pair of consecutive
/// boundary edges lying ahead of the user. The winner maximizes the summed
/// distance to peers; ties (including no peers) go to the spot with the
/// largest `2 * clearance - 1 * distance to centre`.
fn steering_target_direction(pos: Point, dir: Vector2D, space: &PhysicalSpace, peers: &[AvatarSnapshot]) -> Vector2D {
    let boundary = space.boundary();
    let n = boundary.len();
    let ahead = (0..n).find_map(|i| {
        let e1 = Segment::new(boundary[i], boundary[(i + 1) % n]);
        let e2 = Segment::new(boundary[(i + 1) % n], boundary[(i + 2) % n]);
        let feet = (e1.nearest_point(&pos), e2.nearest_point(&pos));
        ((feet.0 - pos).dot(&dir) >= 0.0 && (feet.1 - pos).dot(&dir) >= 0.0).then_some(feet)
    });
    let Some(feet) = ahead else {
        return Vector2D::zero();
    };

    let x_dir = (feet.0 - pos).normalize();
    let y_dir = (feet.1 - pos).normalize();
    let x_count = (feet.0 - pos).magnitude().floor() as usize;
    let y_count = (feet.1 - pos).magnitude().floor() as usize;
    let center = space.center();

    let mut best: Option<(Point, f64, f64)> = None;
    for i in 0..x_count {
        for j in 0..y_count {
            let target = pos + x_dir * (0.5 + i as f64) + y_dir * (0.5 + j as f64);
            if !space.contains(&target) {
                continue;
            }
            let spread: f64 = peers.iter().map(|p| p.physical.position.distance(&target)).sum();
            let clearance = nearest_distance_to_boundary(&target, space).0;
            let openness = CLEARANCE_WEIGHT * clearance - CENTER_DISTANCE_WEIGHT * target.distance(&center);
            let better = match best {
                None => true,
                Some((_, best_spread, best_openness)) => {
                    spread > best_spread + EPSILON
                        || ((spread - best_spread).abs() <= EPSILON && openness > best_openness)
                }
            };
            if better {
                best = Some((target, spread, openness));
            }
        }
    }
    match best {
        Some((target, _, _)) => (target - pos).normalize(),
        None => Vector2D::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedirectionConfig;
    use crate::redirector::StepMotion;
    use crate::space::{rectangle, ObstacleLayout};
    use crate::structs::{AvatarState, Pose};

    const EPS: f64 = 1e-9;

    fn square() -> PhysicalSpace {
        rectangle(10.0, 10.0, ObstacleLayout::None).unwrap().space
    }

    fn snapshot(id: usize, pos: Point, degrees: f64, priority: f64) -> AvatarSnapshot {
        AvatarSnapshot {
            id,
            space_index: 0,
            physical: Pose::facing_degrees(pos, degrees),
            priority,
            in_reset: false,
            reset_unfinished: false,
        }
    }

    struct Setup {
        avatar: AvatarState,
        space: PhysicalSpace,
        peers: Vec<AvatarSnapshot>,
        config: RedirectionConfig,
        final_waypoint: Option<Point>,
        haptic_target: Option<Point>,
        delta_dir: f64,
    }

    impl Setup {
        fn new(pose: Pose) -> Self {
            Setup {
                avatar: AvatarState::new(0, pose, pose),
                space: square(),
                peers: vec![],
                config: RedirectionConfig::default(),
                final_waypoint: None,
                haptic_target: None,
                delta_dir: 0.0,
            }
        }

        fn inject(&self, r: &mut PotentialFieldRedirector) -> GainRequest {
            let delta = self.avatar.physical.direction * 0.02;
            let ctx = StepContext {
                avatar: &self.avatar,
                motion: StepMotion::classify(delta, delta, self.delta_dir, 0.02, &self.config),
                space: &self.space,
                peers: &self.peers,
                config: &self.config,
                bounds: self.config.gain_bounds(),
                waypoint: None,
                final_waypoint: self.final_waypoint,
                haptic_target: self.haptic_target,
            };
            r.inject_redirection(&ctx)
        }

        fn priority(&self, r: &mut PotentialFieldRedirector) -> Option<f64> {
            let ctx = StepContext {
                avatar: &self.avatar,
                motion: StepMotion::still(0.02),
                space: &self.space,
                peers: &self.peers,
                config: &self.config,
                bounds: self.config.gain_bounds(),
                waypoint: None,
                final_waypoint: None,
                haptic_target: None,
            };
            r.priority(&ctx)
        }
    }

    // ==================== Force Primitive Tests ====================

    #[test]
    fn test_inverse_power_coincident_is_zero() {
        assert!(inverse_power(Vector2D::zero(), 2.0).is_zero());
    }

    #[test]
    fn test_facing_weight_head_on_and_back_to_back() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(2.0, 0.0);
        let head_on = facing_weight(a, Vector2D::new(1.0, 0.0), b, Vector2D::new(-1.0, 0.0));
        assert!((head_on - 1.0).abs() < EPS);
        let apart = facing_weight(a, Vector2D::new(-1.0, 0.0), b, Vector2D::new(1.0, 0.0));
        assert_eq!(apart, 0.0);
    }

    #[test]
    fn test_basic_gradient_symmetric_center_is_zero() {
        let g = basic_gradient(Point::origin(), &square(), &[]);
        assert!(g.magnitude() < 1e-12);
    }

    #[test]
    fn test_basic_gradient_points_away_from_near_wall() {
        let g = basic_gradient(Point::new(3.0, 0.0), &square(), &[]);
        // -1/2 + 1/8 from the side walls, top and bottom cancel
        assert!((g.x + 0.375).abs() < 1e-9);
        assert!(g.y.abs() < 1e-9);
    }

    #[test]
    fn test_basic_gradient_includes_obstacle() {
        let space = rectangle(10.0, 10.0, ObstacleLayout::CenterBlock).unwrap().space;
        // Between the block (x = 1.5) and the right wall (x = 5), closer to the block
        let g = basic_gradient(Point::new(2.0, 0.0), &space, &[]);
        assert!(g.x > 0.0);
    }

    #[test]
    fn test_segmented_wall_force_only_walkable_side() {
        let f = segmented_wall_force(Point::new(4.0, 0.0), &square());
        assert!(f.x < 0.0);
        assert!(f.y.abs() < 1e-9);
    }

    #[test]
    fn test_visible_wall_force_center_cancels() {
        assert!(visible_wall_force(Point::origin(), &square()).magnitude() < 1e-12);
    }

    // ==================== Basic Variant Tests ====================

    #[test]
    fn test_basic_walking_against_force_uses_max_translation() {
        let setup = Setup::new(Pose::facing_degrees(Point::new(3.0, 0.0), 0.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        let g = setup.inject(&mut r);
        assert_eq!(g.translation, 1.26);
        let force = r.total_force().unwrap();
        assert!((force.x + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_basic_walking_with_force_keeps_translation() {
        let setup = Setup::new(Pose::facing_degrees(Point::new(3.0, 0.0), 180.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        assert_eq!(setup.inject(&mut r).translation, 1.0);
    }

    #[test]
    fn test_basic_steers_toward_force() {
        // Facing +y near the right wall: the force (-x) is on the left
        let setup = Setup::new(Pose::facing_degrees(Point::new(3.0, 0.0), 90.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        let g = setup.inject(&mut r);
        assert!((g.curvature - 1.0 / 7.5).abs() < EPS);
    }

    #[test]
    fn test_basic_rotation_rule() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::new(3.0, 0.0), 90.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        setup.delta_dir = 2.0;
        assert_eq!(setup.inject(&mut r).rotation, 0.8);
        setup.delta_dir = -2.0;
        assert_eq!(setup.inject(&mut r).rotation, 1.49);
    }

    #[test]
    fn test_basic_peer_repulsion() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::origin(), 0.0));
        setup.peers = vec![snapshot(1, Point::new(1.0, 0.0), 180.0, 1.0)];
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        setup.inject(&mut r);
        assert!(r.total_force().unwrap().x < -0.99);
    }

    // ==================== Segmented Variant Tests ====================

    #[test]
    fn test_segmented_proximity_curvature() {
        let setup = Setup::new(Pose::facing_degrees(Point::new(4.0, 0.0), 90.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfSegmented);
        let g = setup.inject(&mut r);
        assert_eq!(g.translation, 1.0);

        let base = 360.0 / (2.0 * std::f64::consts::PI * 7.5);
        let t = 1.0 - 1.0 / 7.5;
        let rate = (1.0 - t) * base + t * 15.0;
        let expected = (rate * 0.02).to_radians() / 0.02;
        assert!((g.curvature - expected).abs() < 1e-6, "{} vs {}", g.curvature, expected);
    }

    #[test]
    fn test_segmented_ignores_peer_facing_away() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::origin(), 180.0));
        setup.peers = vec![snapshot(1, Point::new(1.0, 0.0), 0.0, 1.0)];
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfSegmented);
        setup.inject(&mut r);
        // Both face away from each other: only the symmetric walls remain
        assert!(r.total_force().unwrap().magnitude() < 1e-9);
    }

    // ==================== Dynamic Variant Tests ====================

    #[test]
    fn test_dynamic_priority_lower_near_wall() {
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfDynamic);
        let center = Setup::new(Pose::facing_degrees(Point::origin(), 0.0)).priority(&mut r).unwrap();
        let wall = Setup::new(Pose::facing_degrees(Point::new(4.5, 0.0), 0.0)).priority(&mut r).unwrap();
        assert!(center.abs() < 1e-9);
        assert!(wall < center);
    }

    #[test]
    fn test_non_dynamic_has_no_priority() {
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        assert_eq!(Setup::new(Pose::default()).priority(&mut r), None);
    }

    #[test]
    fn test_dynamic_force_is_normalized() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::new(2.0, 1.0), 30.0));
        setup.peers = vec![snapshot(1, Point::new(-2.0, -1.0), 0.0, 5.0)];
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfDynamic);
        setup.inject(&mut r);
        let force = r.total_force().unwrap();
        assert!((force.magnitude() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_steering_target_prefers_far_from_peers() {
        let space = square();
        let peers = vec![snapshot(1, Point::new(-4.0, -4.0), 0.0, 0.0)];
        let dir = steering_target_direction(Point::new(-3.0, -3.0), Vector2D::new(1.0, 1.0).normalize(), &space, &peers);
        assert!(dir.x > 0.0 && dir.y > 0.0);
    }

    // ==================== Haptic Variant Tests ====================

    #[test]
    fn test_haptic_without_target_is_basic() {
        let setup = Setup::new(Pose::facing_degrees(Point::new(3.0, 0.0), 90.0));
        let mut haptic = PotentialFieldRedirector::new(RedirectorKind::ApfHaptic);
        let mut basic = PotentialFieldRedirector::new(RedirectorKind::ApfBasic);
        assert_eq!(setup.inject(&mut haptic), setup.inject(&mut basic));
        assert!(!haptic.alignment_state());
    }

    #[test]
    fn test_haptic_alignment_attracts() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::origin(), 90.0));
        setup.haptic_target = Some(Point::new(0.0, 3.0));
        // Virtual distance equals physical distance: gain 1 is within bounds
        setup.final_waypoint = Some(Point::new(0.0, 3.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfHaptic);
        setup.inject(&mut r);
        assert!(r.alignment_state());
        let force = r.total_force().unwrap();
        assert!((force.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_haptic_alignment_requires_bearing() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::origin(), 0.0));
        setup.haptic_target = Some(Point::new(0.0, 3.0));
        setup.final_waypoint = Some(Point::new(0.0, 3.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfHaptic);
        setup.inject(&mut r);
        assert!(!r.alignment_state());
    }

    #[test]
    fn test_haptic_alignment_requires_reachable_distance() {
        let mut setup = Setup::new(Pose::facing_degrees(Point::origin(), 90.0));
        setup.haptic_target = Some(Point::new(0.0, 3.0));
        setup.final_waypoint = Some(Point::new(0.0, 10.0));
        let mut r = PotentialFieldRedirector::new(RedirectorKind::ApfHaptic);
        setup.inject(&mut r);
        assert!(!r.alignment_state());
    }

    #[test]
    fn test_new_coerces_non_field_kind() {
        assert_eq!(PotentialFieldRedirector::new(RedirectorKind::Null).kind(), RedirectorKind::ApfBasic);
    }
}

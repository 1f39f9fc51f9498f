//! Property-based tests for the redirection core
//!
//! These tests verify invariants that should hold for all inputs: applied
//! gains stay inside their bounds, motion gating holds, straight collision
//! distances shrink monotonically and scheduler decisions are reproducible.

use proptest::prelude::*;
use redirection_core::scheduler::AvatarView;
use redirection_core::*;

fn square() -> PhysicalSpace {
    space::rectangle(10.0, 10.0, ObstacleLayout::None).unwrap().space
}

fn right_wall(space: &PhysicalSpace) -> Segment {
    space
        .boundary_edges()
        .into_iter()
        .find(|s| (s.start.x - 5.0).abs() < 1e-9 && (s.end.x - 5.0).abs() < 1e-9)
        .unwrap()
}

// ============================================================================
// GAIN PROPERTIES
// ============================================================================

#[cfg(test)]
mod gain_properties {
    use super::*;

    proptest! {
        #[test]
        fn applied_gains_within_bounds(
            translation in -10.0_f64..10.0,
            rotation in -10.0_f64..10.0,
            curvature in -5.0_f64..5.0,
            dx in -0.1_f64..0.1,
            dy in -0.1_f64..0.1,
            dtheta in -5.0_f64..5.0,
        ) {
            let config = RedirectionConfig::default();
            let bounds = config.gain_bounds();
            let delta = Vector2D::new(dx, dy);
            let motion = StepMotion::classify(delta, delta, dtheta, config.dt(), &config);
            let request = Gains { translation, rotation, curvature };
            let applied = apply_gains(&request, &motion, &bounds);

            prop_assert!(applied.gains.translation >= bounds.min_translation - 1e-12);
            prop_assert!(applied.gains.translation <= bounds.max_translation + 1e-12);
            prop_assert!(applied.gains.rotation >= bounds.min_rotation - 1e-12);
            prop_assert!(applied.gains.rotation <= bounds.max_rotation + 1e-12);
            prop_assert!(
                applied.gains.curvature.abs() <= bounds.max_curvature() + 1e-12,
                "curvature {} exceeds {}", applied.gains.curvature, bounds.max_curvature()
            );
        }

        #[test]
        fn gains_gated_by_motion(
            rotation in 0.0_f64..3.0,
            curvature in -1.0_f64..1.0,
            dx in -0.1_f64..0.1,
            dtheta in -5.0_f64..5.0,
        ) {
            let config = RedirectionConfig::default();
            let bounds = config.gain_bounds();
            let delta = Vector2D::new(dx, 0.0);
            let motion = StepMotion::classify(delta, delta, dtheta, config.dt(), &config);
            let request = Gains { translation: 1.0, rotation, curvature };
            let applied = apply_gains(&request, &motion, &bounds);

            if !motion.walking {
                prop_assert_eq!(applied.gains.curvature, 0.0);
            }
            if !motion.rotating {
                prop_assert_eq!(applied.gains.rotation, 1.0);
            }
            if !motion.walking && !motion.rotating {
                prop_assert_eq!(applied.rotation, 0.0);
            }
        }
    }
}

// ============================================================================
// COLLISION PREDICTION PROPERTIES
// ============================================================================

#[cfg(test)]
mod collision_properties {
    use super::*;

    proptest! {
        #[test]
        fn straight_distance_shrinks_on_approach(
            x1 in -4.0_f64..4.0,
            x2 in -4.0_f64..4.0,
            y in -4.0_f64..4.0,
            heading in -60.0_f64..60.0,
        ) {
            let space = square();
            let wall = right_wall(&space);
            let dir = Vector2D::from_degrees(heading);
            let (near, far) = if x1 > x2 { (x1, x2) } else { (x2, x1) };
            let d_near = collision_distance_straight(&Point::new(near, y), &dir, &wall, 0.5);
            let d_far = collision_distance_straight(&Point::new(far, y), &dir, &wall, 0.5);
            prop_assert!(d_near.is_finite() && d_far.is_finite());
            prop_assert!(d_near <= d_far + 1e-9, "{} > {}", d_near, d_far);
        }

        #[test]
        fn straight_distance_infinite_when_facing_away(
            x in -4.0_f64..4.0,
            y in -4.0_f64..4.0,
            heading in 91.0_f64..269.0,
        ) {
            let space = square();
            let wall = right_wall(&space);
            let d = collision_distance_straight(&Point::new(x, y), &Vector2D::from_degrees(heading), &wall, 0.5);
            prop_assert!(d.is_infinite());
        }

        #[test]
        fn time_range_is_ordered(
            x in -4.5_f64..4.5,
            y in -4.5_f64..4.5,
            heading in 0.0_f64..360.0,
        ) {
            let config = RedirectionConfig::default();
            let space = square();
            let options = scheduler::collision_options(Point::new(x, y), Vector2D::from_degrees(heading), &space, &config);
            let range = scheduler::time_range(&options, config.translation_speed, &config.gain_bounds());
            prop_assert!(range.min <= range.max);
            prop_assert!(options.iter().all(|o| o.distance >= 0.0));
        }
    }
}

// ============================================================================
// SCHEDULER PROPERTIES
// ============================================================================

#[cfg(test)]
mod scheduler_properties {
    use super::*;

    fn coarse_config() -> RedirectionConfig {
        RedirectionConfig {
            scheduler: SchedulerConfig {
                cell_size: 1.0,
                direction_samples: 12,
                radius_samples: 3,
            },
            ..RedirectionConfig::default()
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn decisions_are_deterministic(
            ax in -4.0_f64..4.0,
            ay in -4.0_f64..4.0,
            ah in 0.0_f64..360.0,
            bx in -4.0_f64..4.0,
            by in -4.0_f64..4.0,
            bh in 0.0_f64..360.0,
            wa in 0.5_f64..15.0,
            wb in 0.5_f64..15.0,
            synchronized in any::<bool>(),
        ) {
            let config = coarse_config();
            let space = square();
            let mut scheduler = ConflictScheduler::new();
            scheduler.register(0, ReachabilityGrid::new(&space, &config));
            scheduler.register(1, ReachabilityGrid::new(&space, &config));

            let a = Pose::facing_degrees(Point::new(ax, ay), ah);
            let b = Pose::facing_degrees(Point::new(bx, by), bh);
            let views = [
                AvatarView {
                    id: 0,
                    space: &space,
                    physical: a,
                    virtual_position: a.position,
                    waypoint: Some(a.position + a.direction * wa),
                    peers: vec![b.position],
                },
                AvatarView {
                    id: 1,
                    space: &space,
                    physical: b,
                    virtual_position: b.position,
                    waypoint: Some(b.position + b.direction * wb),
                    peers: vec![a.position],
                },
            ];
            let trigger = if synchronized {
                ScheduleTrigger::SynchronizedReset
            } else {
                ScheduleTrigger::WaypointReached
            };

            let first = scheduler.decide(trigger, &views, &config);
            let second = scheduler.decide(trigger, &views, &config);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.instructions.len(), 2);

            let key = |id: usize| {
                let a = &first.assessments[id];
                if synchronized { a.reset_time.max } else { a.collision_time.max }
            };
            if let Some(chosen) = first.reset_first {
                prop_assert!(first.must_reset.contains(&chosen));
                for &other in &first.must_reset {
                    prop_assert!(key(chosen) <= key(other));
                }
                prop_assert_eq!(first.budget, Some(key(chosen)));
            } else {
                prop_assert!(first.must_reset.is_empty());
            }
            for instruction in &first.instructions {
                prop_assert!(instruction.params.translation_gain >= config.min_translation_gain);
                prop_assert!(instruction.params.translation_gain <= config.max_translation_gain);
            }
        }
    }
}

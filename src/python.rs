//! Python bindings. Geometry queries take plain tuples; trials are driven
//! end to end from a JSON configuration and strategy names.

use crate::config::{RedirectionConfig, RedirectorKind, ResetterKind};
use crate::error::RdwError;
use crate::geometry::{collision_distance_arc, collision_distance_straight, nearest_distance_to_boundary, Segment};
use crate::space::{rectangle, ObstacleLayout, PhysicalSpace};
use crate::structs::{Point, Pose, SteeringMode, Vector2D};
use crate::trial::{AvatarSetup, Trial, TrialOutcome};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

type Pair = (f64, f64);

impl From<RdwError> for PyErr {
    fn from(err: RdwError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn point(p: Pair) -> Point {
    Point::new(p.0, p.1)
}

fn vector(v: Pair) -> Vector2D {
    Vector2D::new(v.0, v.1)
}

#[pyfunction]
fn nearest_distance_py(boundary: Vec<Pair>, obstacles: Vec<Vec<Pair>>, pos: Pair) -> PyResult<(f64, Pair)> {
    let space = PhysicalSpace::new(
        boundary.into_iter().map(point).collect(),
        obstacles
            .into_iter()
            .map(|o| o.into_iter().map(point).collect())
            .collect(),
    )?;
    let (distance, nearest) = nearest_distance_to_boundary(&point(pos), &space);
    Ok((distance, (nearest.x, nearest.y)))
}

#[pyfunction]
fn collision_distance_straight_py(pos: Pair, dir: Pair, start: Pair, end: Pair, buffer: f64) -> PyResult<f64> {
    let segment = Segment::new(point(start), point(end));
    Ok(collision_distance_straight(&point(pos), &vector(dir), &segment, buffer))
}

/// `left` picks the turning side of the arc.
#[pyfunction]
fn collision_distance_arc_py(
    pos: Pair,
    dir: Pair,
    radius: f64,
    left: bool,
    start: Pair,
    end: Pair,
    buffer: f64,
) -> PyResult<f64> {
    let side = if left { SteeringMode::Left } else { SteeringMode::Right };
    let segment = Segment::new(point(start), point(end));
    Ok(collision_distance_arc(&point(pos), &vector(dir), radius, side, &segment, buffer))
}

/// Single-avatar trial in an empty rectangle, starting at the centre facing +x.
/// Returns (outcome, steps, resets).
#[pyfunction]
#[pyo3(signature = (config_json, redirector, resetter, width, height, waypoints, max_steps))]
fn run_rectangle_trial_py(
    config_json: Option<&str>,
    redirector: &str,
    resetter: &str,
    width: f64,
    height: f64,
    waypoints: Vec<Pair>,
    max_steps: usize,
) -> PyResult<(String, usize, usize)> {
    let config = match config_json {
        Some(json) => RedirectionConfig::from_json(json)?,
        None => RedirectionConfig::default(),
    };
    let redirector: RedirectorKind = redirector.parse()?;
    let resetter: ResetterKind = resetter.parse()?;
    let layout = rectangle(width, height, ObstacleLayout::None)?;

    let setup = AvatarSetup::new(0, Pose::facing_degrees(Point::origin(), 0.0), redirector, resetter)
        .with_waypoints(waypoints.into_iter().map(point).collect());
    let mut trial = Trial::new(config, vec![layout.space], vec![setup])?;
    let outcome = trial.run(max_steps);
    let name = match outcome {
        TrialOutcome::Normal => "normal",
        TrialOutcome::Invalid => "invalid",
        TrialOutcome::Manual => "manual",
    };
    Ok((name.to_string(), trial.step_count(), trial.total_resets()))
}

#[pyfunction]
fn strategy_names() -> PyResult<(Vec<&'static str>, Vec<&'static str>)> {
    Ok((
        RedirectorKind::ALL.iter().map(|k| k.name()).collect(),
        ResetterKind::ALL.iter().map(|k| k.name()).collect(),
    ))
}

#[pymodule]
fn redirection_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Geometry
    m.add_function(wrap_pyfunction!(nearest_distance_py, m)?)?;
    m.add_function(wrap_pyfunction!(collision_distance_straight_py, m)?)?;
    m.add_function(wrap_pyfunction!(collision_distance_arc_py, m)?)?;

    // Trials
    m.add_function(wrap_pyfunction!(run_rectangle_trial_py, m)?)?;
    m.add_function(wrap_pyfunction!(strategy_names, m)?)?;

    Ok(())
}

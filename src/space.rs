//! # Physical Tracking Spaces
//!
//! A [`PhysicalSpace`] is a boundary polygon plus obstacle polygons, validated
//! and normalized once at construction and shared read-only by every avatar
//! assigned to it.
//!
//! ## Winding
//!
//! All polygons are stored counter-clockwise. [`PhysicalSpace::edges`] walks
//! the boundary forward and each obstacle backward, so the walkable side is
//! always on the left of an edge (see [`crate::geometry::Segment`]).
//!
//! ## Generators
//!
//! Common experiment layouts (rectangle, regular polygon, triangle, T shape)
//! with optional obstacles and suggested starting poses.

use crate::error::{RdwError, Result};
use crate::geometry::{point_in_polygon, polygon_signed_area, Segment};
use crate::structs::{Point, Pose, Vector2D};
use serde::{Deserialize, Serialize};

const MIN_AREA: f64 = 1e-6;
/// Side length of a lattice pillar in triangular spaces.
const PILLAR_SIDE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSpace {
    boundary: Vec<Point>,
    obstacles: Vec<Vec<Point>>,
}

impl PhysicalSpace {
    pub fn new(boundary: Vec<Point>, obstacles: Vec<Vec<Point>>) -> Result<Self> {
        let boundary = normalize_polygon(boundary, "boundary")?;
        let obstacles = obstacles
            .into_iter()
            .enumerate()
            .map(|(i, o)| normalize_polygon(o, &format!("obstacle {}", i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(PhysicalSpace {
            boundary,
            obstacles,
        })
    }

    pub fn boundary(&self) -> &[Point] {
        &self.boundary
    }

    pub fn obstacles(&self) -> &[Vec<Point>] {
        &self.obstacles
    }

    pub fn boundary_edges(&self) -> Vec<Segment> {
        let n = self.boundary.len();
        (0..n)
            .map(|i| Segment::new(self.boundary[i], self.boundary[(i + 1) % n]))
            .collect()
    }

    /// Edges of one obstacle, walked clockwise so the walkable side is on the left.
    pub fn obstacle_edges(&self, index: usize) -> Vec<Segment> {
        match self.obstacles.get(index) {
            Some(polygon) => {
                let n = polygon.len();
                (0..n)
                    .map(|i| Segment::new(polygon[(i + 1) % n], polygon[i]))
                    .collect()
            }
            None => Vec::new(),
        }
    }

    /// Every boundary and obstacle edge with consistent orientation.
    pub fn edges(&self) -> Vec<Segment> {
        let mut edges = self.boundary_edges();
        for i in 0..self.obstacles.len() {
            edges.extend(self.obstacle_edges(i));
        }
        edges
    }

    /// All polygon vertices (boundary first).
    pub fn vertices(&self) -> impl Iterator<Item = &Point> {
        self.boundary.iter().chain(self.obstacles.iter().flatten())
    }

    /// (min corner, max corner) of the boundary.
    pub fn bounding_box(&self) -> (Point, Point) {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.boundary {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    pub fn center(&self) -> Point {
        let (min, max) = self.bounding_box();
        min.midpoint(&max)
    }

    /// Bounding-box width and height.
    pub fn size(&self) -> (f64, f64) {
        let (min, max) = self.bounding_box();
        (max.x - min.x, max.y - min.y)
    }

    /// Inside the boundary and outside every obstacle.
    pub fn contains(&self, point: &Point) -> bool {
        point_in_polygon(point, &self.boundary)
            && !self.obstacles.iter().any(|o| point_in_polygon(point, o))
    }
}

fn normalize_polygon(mut polygon: Vec<Point>, label: &str) -> Result<Vec<Point>> {
    if polygon.len() < 3 {
        return Err(RdwError::DegeneratePolygon(format!(
            "{} has {} vertices",
            label,
            polygon.len()
        )));
    }
    let area = polygon_signed_area(&polygon);
    if area.abs() < MIN_AREA {
        return Err(RdwError::DegeneratePolygon(format!("{} has zero area", label)));
    }
    if area < 0.0 {
        polygon.reverse();
    }
    Ok(polygon)
}

/// Obstacle arrangement used by the space generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleLayout {
    #[default]
    None,
    CenterBlock,
    Pillars,
}

/// A generated space together with suggested starting poses.
#[derive(Debug, Clone)]
pub struct SpaceLayout {
    pub space: PhysicalSpace,
    pub initial_poses: Vec<Pose>,
}

fn square_at(center: Point, half: f64) -> Vec<Point> {
    vec![
        Point::new(center.x + half, center.y + half),
        Point::new(center.x - half, center.y + half),
        Point::new(center.x - half, center.y - half),
        Point::new(center.x + half, center.y - half),
    ]
}

fn facing_center(position: Point) -> Pose {
    Pose::new(position, -position.to_vector())
}

/// Axis-aligned rectangle centred at the origin.
pub fn rectangle(width: f64, height: f64, layout: ObstacleLayout) -> Result<SpaceLayout> {
    if width <= 0.0 || height <= 0.0 {
        return Err(RdwError::InvalidParameter {
            name: "rectangle size",
            value: width.min(height),
        });
    }
    let boundary = vec![
        Point::new(width / 2.0, height / 2.0),
        Point::new(-width / 2.0, height / 2.0),
        Point::new(-width / 2.0, -height / 2.0),
        Point::new(width / 2.0, -height / 2.0),
    ];
    let inset = 0.1 * width;
    let mut initial_poses = Vec::new();
    for x in [-width / 2.0 + inset, width / 2.0 - inset] {
        for y in [-height / 2.0 + inset, height / 2.0 - inset] {
            initial_poses.push(facing_center(Point::new(x, y)));
        }
    }

    let scale = width.min(height);
    let obstacles = match layout {
        ObstacleLayout::None => vec![],
        ObstacleLayout::CenterBlock => vec![square_at(Point::origin(), scale * 0.15)],
        ObstacleLayout::Pillars => {
            let offset = scale * 0.2;
            let half = scale * 0.05;
            // Pillars sit on the diagonals, so start from the edge midpoints instead
            initial_poses = [
                Point::new(0.0, height / 2.0 - inset),
                Point::new(0.0, -height / 2.0 + inset),
                Point::new(-width / 2.0 + inset, 0.0),
                Point::new(width / 2.0 - inset, 0.0),
            ]
            .into_iter()
            .map(facing_center)
            .collect();
            [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)]
                .iter()
                .map(|(sx, sy)| square_at(Point::new(sx * offset, sy * offset), half))
                .collect()
        }
    };

    Ok(SpaceLayout {
        space: PhysicalSpace::new(boundary, obstacles)?,
        initial_poses,
    })
}

/// Vertices of a regular polygon centred at the origin, counter-clockwise.
/// Odd polygons put a vertex on +y; even polygons put an edge on top.
pub fn regular_polygon_points(sides: usize, radius: f64) -> Vec<Point> {
    let step = 360.0 / sides as f64;
    let start = if sides % 2 == 1 {
        Vector2D::new(0.0, radius)
    } else {
        Vector2D::new(0.0, radius).rotate(step / 2.0)
    };
    (0..sides)
        .map(|i| Point::origin() + start.rotate(step * i as f64))
        .collect()
}

fn spoke_poses(vertices: &[Point], fractions: &[f64]) -> Vec<Pose> {
    let mut poses = Vec::new();
    for fraction in fractions {
        for v in vertices {
            poses.push(facing_center(Point::origin() + v.to_vector() * *fraction));
        }
    }
    poses
}

pub fn regular_polygon(sides: usize, radius: f64) -> Result<SpaceLayout> {
    if sides < 3 {
        return Err(RdwError::DegeneratePolygon(format!(
            "regular polygon needs 3 sides, got {}",
            sides
        )));
    }
    if radius <= 0.0 {
        return Err(RdwError::InvalidParameter {
            name: "polygon radius",
            value: radius,
        });
    }
    let boundary = regular_polygon_points(sides, radius);
    let initial_poses = spoke_poses(&boundary, &[0.5, 0.75]);
    Ok(SpaceLayout {
        space: PhysicalSpace::new(boundary, vec![])?,
        initial_poses,
    })
}

/// Equilateral triangle with circumradius `radius`, apex on +y.
pub fn triangle(radius: f64, layout: ObstacleLayout) -> Result<SpaceLayout> {
    let SpaceLayout {
        space,
        mut initial_poses,
    } = regular_polygon(3, radius)?;

    let obstacles = match layout {
        ObstacleLayout::None => vec![],
        ObstacleLayout::CenterBlock => {
            let k = radius / (5.0 * 3f64.sqrt());
            vec![vec![
                Point::new(radius / 5.0, k),
                Point::new(-radius / 5.0, k),
                Point::new(0.0, -2.0 * k),
            ]]
        }
        ObstacleLayout::Pillars => {
            // Triangular lattice of 1 + 2 + 3 + 4 pillars
            let seg = radius * 3f64.sqrt() / 6.0;
            let row_step = seg * 3f64.sqrt() / 2.0;
            let mut pillars = Vec::new();
            let mut y = seg * 3f64.sqrt();
            for row in 0..4 {
                for j in 0..=row {
                    let x = -(row as f64) * seg / 2.0 + j as f64 * seg;
                    pillars.push(square_at(Point::new(x, y), PILLAR_SIDE / 2.0));
                }
                y -= row_step;
            }
            let lane = y / 2.0;
            let vertices: Vec<Point> = [
                Point::new(0.0, lane),
                Point::new(-seg, lane),
                Point::new(seg, lane),
            ]
            .to_vec();
            initial_poses = (0..3)
                .flat_map(|i| {
                    vertices
                        .iter()
                        .map(move |p| Point::origin() + p.to_vector().rotate(120.0 * i as f64))
                })
                .map(facing_center)
                .collect();
            pillars
        }
    };

    Ok(SpaceLayout {
        space: PhysicalSpace::new(space.boundary().to_vec(), obstacles)?,
        initial_poses,
    })
}

/// T-shaped space: a `w1` square at the origin, arms of `w2` on both sides
/// and a stem of `w3` below.
pub fn t_shape(w1: f64, w2: f64, w3: f64, layout: ObstacleLayout) -> Result<SpaceLayout> {
    for (name, value) in [("t_shape w1", w1), ("t_shape w2", w2), ("t_shape w3", w3)] {
        if value <= 0.0 {
            return Err(RdwError::InvalidParameter { name, value });
        }
    }
    let boundary = vec![
        Point::new(w1 / 2.0 + w2, w1 / 2.0),
        Point::new(-w1 / 2.0 - w2, w1 / 2.0),
        Point::new(-w1 / 2.0 - w2, -w1 / 2.0),
        Point::new(-w1 / 2.0, -w1 / 2.0),
        Point::new(-w1 / 2.0, -w1 / 2.0 - w3),
        Point::new(w1 / 2.0, -w1 / 2.0 - w3),
        Point::new(w1 / 2.0, -w1 / 2.0),
        Point::new(w1 / 2.0 + w2, -w1 / 2.0),
    ];
    let up = Vector2D::new(0.0, 1.0);
    let initial_poses = vec![
        Pose::new(Point::new(w1 / 2.0 + w2 * 0.75, 0.0), Vector2D::new(-1.0, 0.0)),
        Pose::new(Point::new(-w1 / 2.0 - w2 * 0.75, 0.0), Vector2D::new(1.0, 0.0)),
        Pose::new(Point::new(0.0, -w1 / 2.0 - w3 / 4.0), up),
        Pose::new(Point::new(0.0, -w1 / 2.0 - w3 * 0.75), up),
    ];
    let obstacles = match layout {
        ObstacleLayout::None => vec![],
        ObstacleLayout::CenterBlock => vec![square_at(Point::origin(), w1 / 4.0)],
        ObstacleLayout::Pillars => [
            Point::new(0.0, -w1 / 2.0 - w3 / 2.0),
            Point::new(-w1 / 2.0 - w2 / 4.0, 0.0),
            Point::new(w1 / 2.0 + w2 / 4.0, 0.0),
        ]
        .into_iter()
        .map(|c| square_at(c, w1 / 6.0))
        .collect(),
    };
    Ok(SpaceLayout {
        space: PhysicalSpace::new(boundary, obstacles)?,
        initial_poses,
    })
}

pub fn t_shape_default(layout: ObstacleLayout) -> Result<SpaceLayout> {
    t_shape(4.0, 2.0, 8.0, layout)
}

//! A bounded planar domain with obstacles and targets.

use std::sync::Arc;

use nalgebra::Point2;

use super::distance::DistanceFunction;
use super::shapes::{Rect, Shape};
use crate::error::ConfigError;

/// The navigable region: a bounding rectangle minus obstacle shapes, plus the
/// target shapes that potential fields are measured from.
#[derive(Debug, Clone)]
pub struct Domain {
    /// Outer bounds.
    pub bounds: Rect,
    /// Regions removed from the free space.
    pub obstacles: Vec<Shape>,
    /// Regions where the potential is zero.
    pub targets: Vec<Shape>,
}

impl Domain {
    /// Create a domain with no obstacles or targets.
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            obstacles: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Add an obstacle.
    pub fn with_obstacle(mut self, shape: impl Into<Shape>) -> Self {
        self.obstacles.push(shape.into());
        self
    }

    /// Add a target.
    pub fn with_target(mut self, shape: impl Into<Shape>) -> Self {
        self.targets.push(shape.into());
        self
    }

    /// Check bounds, shapes and target placement.
    ///
    /// Targets must overlap the bounds and must not be swallowed by a single
    /// obstacle. Having no targets at all is allowed here; solvers check that
    /// separately since meshing does not need targets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bounds.validate()?;
        for shape in self.obstacles.iter().chain(&self.targets) {
            shape.validate()?;
        }
        for (index, target) in self.targets.iter().enumerate() {
            if !self.bounds.intersects(&target.bounds()) {
                return Err(ConfigError::TargetOutsideDomain { index });
            }
            for (obstacle_index, obstacle) in self.obstacles.iter().enumerate() {
                if target_inside(target, obstacle) {
                    return Err(ConfigError::TargetInsideObstacle {
                        target: index,
                        obstacle: obstacle_index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate and additionally require at least one target.
    pub fn validate_for_solve(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        self.validate()
    }

    /// Signed distance to the border of the free space.
    pub fn signed_distance(&self, p: &Point2<f64>) -> f64 {
        self.obstacles
            .iter()
            .fold(self.bounds.signed_distance(p), |d, obstacle| {
                d.max(-obstacle.signed_distance(p))
            })
    }

    /// The free space as a shareable [`DistanceFunction`].
    pub fn distance_function(&self) -> DistanceFunction {
        let domain = self.clone();
        Arc::new(move |p| domain.signed_distance(p))
    }

    /// Whether `p` lies inside an obstacle (border included).
    pub fn in_obstacle(&self, p: &Point2<f64>) -> bool {
        self.obstacles.iter().any(|o| o.signed_distance(p) <= 0.0)
    }

    /// Whether `p` lies in the free space (border included).
    pub fn is_free(&self, p: &Point2<f64>) -> bool {
        self.signed_distance(p) <= 0.0
    }

    /// Distance to the nearest target (zero inside a target).
    pub fn target_distance(&self, p: &Point2<f64>) -> f64 {
        self.targets
            .iter()
            .map(|t| t.distance(p))
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether `p` lies inside any target.
    pub fn in_target(&self, p: &Point2<f64>) -> bool {
        self.targets.iter().any(|t| t.contains(p))
    }
}

fn target_inside(target: &Shape, obstacle: &Shape) -> bool {
    let samples: Vec<Point2<f64>> = match target {
        Shape::Point(p) => vec![*p],
        Shape::Circle { center, radius } => (0..16)
            .map(|k| {
                let a = k as f64 * std::f64::consts::TAU / 16.0;
                Point2::new(center.x + radius * a.cos(), center.y + radius * a.sin())
            })
            .chain(std::iter::once(*center))
            .collect(),
        Shape::Rect(r) => r.corners().to_vec(),
        Shape::Polygon(poly) => poly.vertices().to_vec(),
    };
    samples
        .iter()
        .all(|p| obstacle.signed_distance(p) < 0.0)
}

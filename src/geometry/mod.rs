//! Planar geometry kernel.
//!
//! Points and vectors are `nalgebra::Point2<f64>` / `Vector2<f64>`. This module
//! provides the floating-point predicates used by the mesh code, the shapes
//! that describe a navigation [`Domain`], and signed-distance callbacks.

pub mod distance;
mod domain;
pub mod predicates;
mod shapes;

pub use distance::{DistanceFunction, EdgeLengthFunction, TimeCostFunction};
pub use domain::Domain;
pub use predicates::{
    barycentric, circumcenter, in_circle, in_circle_strict, min_angle, orient2d,
    point_segment_distance, triangle_area, triangle_quality,
};
pub use shapes::{Polygon, Rect, Shape};

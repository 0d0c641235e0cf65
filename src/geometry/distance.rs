//! Signed-distance and edge-length callbacks.
//!
//! A [`DistanceFunction`] is negative inside the free domain, zero on its
//! border and positive inside obstacles or outside the bounds. The
//! combinators here build such functions from shapes.

use std::sync::Arc;

use nalgebra::{Point2, Vector2};

use super::shapes::{Polygon, Rect};

/// Signed distance to the free-space border.
pub type DistanceFunction = Arc<dyn Fn(&Point2<f64>) -> f64 + Send + Sync>;

/// Desired local edge length (strictly positive).
pub type EdgeLengthFunction = Arc<dyn Fn(&Point2<f64>) -> f64 + Send + Sync>;

/// Local travel speed `F` (strictly positive; time per unit length is `1/F`).
pub type TimeCostFunction = Arc<dyn Fn(&Point2<f64>) -> f64 + Send + Sync>;

/// Distance function of the interior of a rectangle.
pub fn rect(r: Rect) -> DistanceFunction {
    Arc::new(move |p| r.signed_distance(p))
}

/// Distance function of the interior of a disk.
pub fn circle(center: Point2<f64>, radius: f64) -> DistanceFunction {
    Arc::new(move |p| (p - center).norm() - radius)
}

/// Distance function of the interior of a polygon.
pub fn polygon(poly: Polygon) -> DistanceFunction {
    Arc::new(move |p| poly.signed_distance(p))
}

/// Union of two regions.
pub fn union(a: DistanceFunction, b: DistanceFunction) -> DistanceFunction {
    Arc::new(move |p| a(p).min(b(p)))
}

/// Intersection of two regions.
pub fn intersection(a: DistanceFunction, b: DistanceFunction) -> DistanceFunction {
    Arc::new(move |p| a(p).max(b(p)))
}

/// Region `a` with region `b` cut out.
pub fn difference(a: DistanceFunction, b: DistanceFunction) -> DistanceFunction {
    Arc::new(move |p| a(p).max(-b(p)))
}

/// A constant edge length.
pub fn uniform(h: f64) -> EdgeLengthFunction {
    Arc::new(move |_| h)
}

/// Edge length growing linearly with the distance to the free-space border:
/// `h_min + growth * |d(p)|`.
pub fn graded(distance: DistanceFunction, h_min: f64, growth: f64) -> EdgeLengthFunction {
    Arc::new(move |p| h_min + growth * distance(p).abs())
}

/// A constant travel speed.
pub fn constant_speed(f: f64) -> TimeCostFunction {
    Arc::new(move |_| f)
}

/// Central-difference gradient of `f` at `p` with step `deps`.
pub fn numerical_gradient<F>(f: &F, p: &Point2<f64>, deps: f64) -> Vector2<f64>
where
    F: Fn(&Point2<f64>) -> f64 + ?Sized,
{
    let dx = Vector2::new(deps, 0.0);
    let dy = Vector2::new(0.0, deps);
    Vector2::new(
        (f(&(p + dx)) - f(&(p - dx))) / (2.0 * deps),
        (f(&(p + dy)) - f(&(p - dy))) / (2.0 * deps),
    )
}

/// Project `p` onto the zero level set of `f` with one Newton step
/// `p - f(p) * grad f(p)`.
pub fn project<F>(f: &F, p: &Point2<f64>, deps: f64) -> Point2<f64>
where
    F: Fn(&Point2<f64>) -> f64 + ?Sized,
{
    let d = f(p);
    let g = numerical_gradient(f, p, deps);
    let g2 = g.norm_squared();
    if g2 <= f64::EPSILON {
        return *p;
    }
    p - g * (d / g2)
}

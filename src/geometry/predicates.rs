//! Floating-point geometric predicates and triangle measures.
//!
//! Predicates are evaluated in plain `f64`. Callers that need a decision
//! (Delaunay legalization, convexity tests) use the tolerance-aware variants
//! [`in_circle_strict`] and [`orient2d_sign`], which compare the determinant
//! against a bound scaled by the magnitude of the inputs.

use nalgebra::{Point2, Vector2};

/// Relative tolerance applied to predicate determinants.
pub const PREDICATE_EPSILON: f64 = 1e-10;

/// Twice the signed area of triangle `abc`; positive when `abc` is CCW.
#[inline]
pub fn orient2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Sign of [`orient2d`] with a relative tolerance: `1`, `-1` or `0`.
pub fn orient2d_sign(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> i8 {
    let det = orient2d(a, b, c);
    let detleft = (b.x - a.x) * (c.y - a.y);
    let detright = (b.y - a.y) * (c.x - a.x);
    let bound = PREDICATE_EPSILON * (detleft.abs() + detright.abs());
    if det > bound {
        1
    } else if det < -bound {
        -1
    } else {
        0
    }
}

/// In-circle determinant: positive iff `d` lies inside the circumcircle of the
/// CCW triangle `abc`.
pub fn in_circle(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> f64 {
    let (adx, ady) = (a.x - d.x, a.y - d.y);
    let (bdx, bdy) = (b.x - d.x, b.y - d.y);
    let (cdx, cdy) = (c.x - d.x, c.y - d.y);

    let alift = adx * adx + ady * ady;
    let blift = bdx * bdx + bdy * bdy;
    let clift = cdx * cdx + cdy * cdy;

    alift * (bdx * cdy - cdx * bdy) + blift * (cdx * ady - adx * cdy) + clift * (adx * bdy - bdx * ady)
}

/// Whether `d` lies strictly inside the circumcircle of the CCW triangle `abc`.
///
/// Co-circular points (determinant within tolerance of zero) are reported as
/// outside, so legalization never flips on ties.
pub fn in_circle_strict(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>, d: &Point2<f64>) -> bool {
    let (adx, ady) = (a.x - d.x, a.y - d.y);
    let (bdx, bdy) = (b.x - d.x, b.y - d.y);
    let (cdx, cdy) = (c.x - d.x, c.y - d.y);

    let alift = adx * adx + ady * ady;
    let blift = bdx * bdx + bdy * bdy;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdx * cdy - cdx * bdy)
        + blift * (cdx * ady - adx * cdy)
        + clift * (adx * bdy - bdx * ady);
    let permanent = ((bdx * cdy).abs() + (cdx * bdy).abs()) * alift
        + ((cdx * ady).abs() + (adx * cdy).abs()) * blift
        + ((adx * bdy).abs() + (bdx * ady).abs()) * clift;

    det > PREDICATE_EPSILON * permanent
}

/// Circumcenter of triangle `abc`, or `None` if the points are collinear.
pub fn circumcenter(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> Option<Point2<f64>> {
    let ab = b - a;
    let ac = c - a;
    let d = 2.0 * (ab.x * ac.y - ab.y * ac.x);
    if d.abs() <= f64::EPSILON * (ab.norm_squared() + ac.norm_squared()) {
        return None;
    }
    let ab2 = ab.norm_squared();
    let ac2 = ac.norm_squared();
    let ux = (ac.y * ab2 - ab.y * ac2) / d;
    let uy = (ab.x * ac2 - ac.x * ab2) / d;
    Some(Point2::new(a.x + ux, a.y + uy))
}

/// Signed area of triangle `abc`.
#[inline]
pub fn triangle_area(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    0.5 * orient2d(a, b, c)
}

/// Triangle quality `(b+c-a)(c+a-b)(a+b-c) / (abc)`.
///
/// Equals 1 for an equilateral triangle and 0 for a degenerate one.
pub fn triangle_quality(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let la = (b - c).norm();
    let lb = (c - a).norm();
    let lc = (a - b).norm();
    let denom = la * lb * lc;
    if denom <= 0.0 {
        return 0.0;
    }
    ((lb + lc - la) * (lc + la - lb) * (la + lb - lc) / denom).max(0.0)
}

/// Smallest interior angle of triangle `abc` in radians.
pub fn min_angle(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let angle = |p: &Point2<f64>, q: &Point2<f64>, r: &Point2<f64>| -> f64 {
        let u = q - p;
        let v = r - p;
        let cross = u.x * v.y - u.y * v.x;
        cross.abs().atan2(u.dot(&v))
    };
    angle(a, b, c).min(angle(b, c, a)).min(angle(c, a, b))
}

/// Barycentric coordinates of `p` with respect to triangle `abc`.
///
/// Returns `None` for a degenerate triangle.
pub fn barycentric(
    p: &Point2<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
) -> Option<[f64; 3]> {
    let total = orient2d(a, b, c);
    if total.abs() < f64::MIN_POSITIVE {
        return None;
    }
    let wa = orient2d(p, b, c) / total;
    let wb = orient2d(a, p, c) / total;
    Some([wa, wb, 1.0 - wa - wb])
}

/// Euclidean distance from `p` to the segment `ab`.
pub fn point_segment_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (p - closest_point_on_segment(p, a, b)).norm()
}

/// The point of segment `ab` closest to `p`.
pub fn closest_point_on_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Whether `p` lies strictly inside the diametral circle of segment `ab`.
#[inline]
pub fn in_diametral_circle(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> bool {
    let pa: Vector2<f64> = a - p;
    let pb: Vector2<f64> = b - p;
    pa.dot(&pb) < -PREDICATE_EPSILON * pa.norm() * pb.norm()
}

/// Midpoint of segment `ab`.
#[inline]
pub fn midpoint(a: &Point2<f64>, b: &Point2<f64>) -> Point2<f64> {
    Point2::from((a.coords + b.coords) * 0.5)
}

//! Local upwind updates.
//!
//! Grid nodes solve the Godunov discretization
//! `sum_k alpha_k (T - v_k)^2 = (h / F)^2` over the upwind axes, where a
//! first-order axis has `alpha = 1, v = T1` and a second-order axis has
//! `alpha = 9/4, v = (4 T1 - T2) / 3`. Axes whose value is not below the
//! candidate are dropped, down to the 1-D update.
//!
//! Mesh vertices use the planar wavefront update across a triangle, with
//! unfolding for obtuse angles (see [`vertex_update`]).

use nalgebra::{Point2, Vector2};

use crate::geometry::predicates::orient2d;
use crate::mesh::{HalfEdgeId, PlanarMesh, VertexId};

/// Finite-difference order of the grid update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateOrder {
    /// One upwind neighbour per axis.
    #[default]
    First,
    /// Two upwind neighbours per axis where both are known and monotone,
    /// first order otherwise.
    Second,
}

/// One upwind axis term `alpha * (T - value)^2`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AxisTerm {
    pub alpha: f64,
    pub value: f64,
}

impl AxisTerm {
    pub fn first(t1: f64) -> Self {
        Self { alpha: 1.0, value: t1 }
    }

    /// Second-order term, falling back to first order unless `t2 <= t1`.
    pub fn second(t1: f64, t2: f64) -> Self {
        if t2.is_finite() && t2 <= t1 {
            Self {
                alpha: 2.25,
                value: (4.0 * t1 - t2) / 3.0,
            }
        } else {
            Self::first(t1)
        }
    }
}

/// Solve `sum alpha_k (T - v_k)^2 = fh^2` for the largest root that is not
/// below any participating `v_k`, dropping the largest values as needed.
pub(crate) fn solve_axes(terms: &mut [AxisTerm], fh: f64) -> f64 {
    terms.sort_by(|a, b| a.value.total_cmp(&b.value));
    let finite = terms.iter().take_while(|t| t.value.is_finite()).count();
    if finite == 0 {
        return f64::INFINITY;
    }

    for k in (1..=finite).rev() {
        let used = &terms[..k];
        let sa: f64 = used.iter().map(|t| t.alpha).sum();
        let sv: f64 = used.iter().map(|t| t.alpha * t.value).sum();
        let svv: f64 = used.iter().map(|t| t.alpha * t.value * t.value).sum();
        let disc = sv * sv - sa * (svv - fh * fh);
        if disc < 0.0 {
            continue;
        }
        let t = (sv + disc.sqrt()) / sa;
        if t >= used[k - 1].value {
            return t;
        }
    }
    terms[0].value + fh / terms[0].alpha.sqrt()
}

/// First-order 2-D update from the smaller neighbour per axis.
///
/// `a` and `b` may be infinite.
pub fn solve_2d(a: f64, b: f64, fh: f64) -> f64 {
    solve_axes(&mut [AxisTerm::first(a), AxisTerm::first(b)], fh)
}

/// Upwind update of a vertex from one triangle with known vertices `a`, `b`.
///
/// Minimizes `T(P) + s |C - P|` over points `P` on segment `ab`, with `T`
/// linear along the segment. Returns `None` when the minimizer is not
/// strictly inside the segment or the result would violate causality
/// (`T_c < max(T_a, T_b)`); callers then use edge updates.
pub fn triangle_update(
    c: &Point2<f64>,
    a: &Point2<f64>,
    ta: f64,
    b: &Point2<f64>,
    tb: f64,
    slowness: f64,
) -> Option<f64> {
    if !(ta.is_finite() && tb.is_finite()) {
        return None;
    }
    let e: Vector2<f64> = b - a;
    let w: Vector2<f64> = c - a;
    let len = e.norm();
    if len <= f64::EPSILON {
        return None;
    }
    let u = tb - ta;
    let r = u / (slowness * len);
    if r.abs() >= 1.0 {
        return None;
    }
    let w_par = w.dot(&e) / len;
    let w_perp = (w.x * e.y - w.y * e.x).abs() / len;
    if w_perp <= f64::EPSILON * len {
        return None;
    }
    let root = (1.0 - r * r).sqrt();
    let x = w_par - r * w_perp / root;
    let lambda = x / len;
    if !(lambda > 0.0 && lambda < 1.0) {
        return None;
    }
    let t = ta + lambda * u + slowness * w_perp / root;
    (t >= ta.max(tb)).then_some(t)
}

/// Best value for vertex `v` from every incident interior triangle.
///
/// `value` returns the usable arrival time of a vertex (infinity when
/// unknown). For each triangle with two known vertices the planar update is
/// tried. At an obtuse angle, up to `max_unfoldings` triangles across the
/// opposite edge are also searched for a known vertex inside the angle,
/// which splits it into two narrower virtual triangles and adds a virtual
/// edge. Edge updates `T_w + s |vw|` always participate.
pub fn vertex_update<V>(
    mesh: &PlanarMesh,
    v: VertexId,
    slowness: f64,
    value: &V,
    max_unfoldings: usize,
) -> f64
where
    V: Fn(VertexId) -> f64,
{
    let pc = mesh.position(v);
    let mut best = f64::INFINITY;

    for he in mesh.vertex_halfedges(v) {
        let w = mesh.dest(he);
        let tw = value(w);
        if tw.is_finite() {
            best = best.min(tw + slowness * mesh.edge_length(he));
        }
        if mesh.is_boundary_halfedge(he) {
            continue;
        }
        // Face of he is (v, w, x) counter-clockwise; the opposite edge is w -> x
        let opposite = mesh.next(he);
        let x = mesh.dest(opposite);
        let tx = value(x);
        if !(tw.is_finite() && tx.is_finite()) {
            continue;
        }
        let pw = mesh.position(w);
        let px = mesh.position(x);
        if let Some(t) = triangle_update(pc, pw, tw, px, tx, slowness) {
            best = best.min(t);
        }
        if is_obtuse(pc, pw, px) {
            if let Some(t) = unfold(mesh, v, opposite, slowness, value, max_unfoldings) {
                best = best.min(t);
            }
        }
    }
    best
}

fn is_obtuse(c: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> bool {
    (a - c).dot(&(b - c)) < 0.0
}

/// Search across `window` (an edge `a -> b` of a triangle `(a, b, c)`) for a
/// known vertex inside the angle at `c`.
fn unfold<V>(
    mesh: &PlanarMesh,
    c: VertexId,
    window: HalfEdgeId,
    slowness: f64,
    value: &V,
    max_unfoldings: usize,
) -> Option<f64>
where
    V: Fn(VertexId) -> f64,
{
    let pc = mesh.position(c);
    let a = mesh.origin(window);
    let b = mesh.dest(window);
    let pa = mesh.position(a);
    let pb = mesh.position(b);
    let (ta, tb) = (value(a), value(b));

    // Walk from the far side of the window; `edge` runs from the b side to the a side
    let mut edge = mesh.twin(window);
    for _ in 0..max_unfoldings {
        if mesh.is_boundary_halfedge(edge) {
            return None;
        }
        let d = mesh.opposite_vertex(edge);
        let pd = mesh.position(d);
        let past_a = orient2d(pc, pa, pd) <= 0.0;
        let past_b = orient2d(pc, pd, pb) <= 0.0;
        match (past_a, past_b) {
            (false, false) => {
                let td = value(d);
                if !td.is_finite() {
                    return None;
                }
                let mut best = td + slowness * (pd - pc).norm();
                if let Some(t) = triangle_update(pc, pa, ta, pd, td, slowness) {
                    best = best.min(t);
                }
                if let Some(t) = triangle_update(pc, pd, td, pb, tb, slowness) {
                    best = best.min(t);
                }
                return Some(best);
            }
            // d lies beyond the ray through a; the angle leaves through d -> b
            (true, false) => edge = mesh.twin(mesh.prev(edge)),
            // d lies beyond the ray through b; the angle leaves through a -> d
            (false, true) => edge = mesh.twin(mesh.next(edge)),
            (true, true) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_2d_cases() {
        // Diagonal plane wave: both neighbours equal
        let t = solve_2d(1.0, 1.0, 1.0);
        assert_relative_eq!(t, 1.0 + 0.5f64.sqrt(), epsilon = 1e-12);
        // Large difference falls back to 1-D
        assert_relative_eq!(solve_2d(0.0, 5.0, 1.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(solve_2d(f64::INFINITY, 2.0, 0.5), 2.5, epsilon = 1e-12);
        assert!(solve_2d(f64::INFINITY, f64::INFINITY, 1.0).is_infinite());
    }

    #[test]
    fn test_second_order_plane_wave_is_exact() {
        // T = x with h = 1: neighbours T1 = 2, T2 = 1, candidate 3
        let mut terms = [AxisTerm::second(2.0, 1.0), AxisTerm::first(f64::INFINITY)];
        assert_relative_eq!(solve_axes(&mut terms, 1.0), 3.0, epsilon = 1e-12);
        // Non-monotone second neighbour falls back to first order
        let term = AxisTerm::second(2.0, 3.0);
        assert_eq!(term.alpha, 1.0);
    }

    #[test]
    fn test_triangle_update_plane_wave() {
        // Wave travelling along +y, T = y
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        let c = Point2::new(0.4, 0.8);
        let t = triangle_update(&c, &a, 0.0, &b, 0.0, 1.0).unwrap();
        assert_relative_eq!(t, 0.8, epsilon = 1e-12);

        // Wave along +x: characteristic leaves the segment, no interior solution
        assert!(triangle_update(&c, &a, 0.0, &b, 1.0, 1.0).is_none());

        // Oblique wave T = (x + y) / sqrt 2; the characteristic through
        // (0.9, 0.4) meets ab at x = 0.5
        let n = Vector2::new(1.0, 1.0).normalize();
        let tt = |p: &Point2<f64>| p.coords.dot(&n);
        let c = Point2::new(0.9, 0.4);
        let t = triangle_update(&c, &a, tt(&a), &b, tt(&b), 1.0).unwrap();
        assert_relative_eq!(t, tt(&c), epsilon = 1e-12);

        // Same wave at (0.4, 0.8): the foot lies at x = -0.4, outside ab
        let c = Point2::new(0.4, 0.8);
        assert!(triangle_update(&c, &a, tt(&a), &b, tt(&b), 1.0).is_none());
    }

    #[test]
    fn test_vertex_update_uses_edges_and_faces() {
        let mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        // Corner at the origin has value 0; others unknown
        let origin = mesh
            .vertex_ids()
            .find(|&v| *mesh.position(v) == Point2::origin())
            .unwrap();
        let value = |v: VertexId| if v == origin { 0.0 } else { f64::INFINITY };
        let far = mesh
            .vertex_ids()
            .find(|&v| *mesh.position(v) == Point2::new(1.0, 1.0))
            .unwrap();
        let t = vertex_update(&mesh, far, 1.0, &value, 8);
        assert_relative_eq!(t, 2f64.sqrt(), epsilon = 1e-12);
        let t = vertex_update(&mesh, far, 0.5, &value, 8);
        assert_relative_eq!(t, 2f64.sqrt() * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_unfolding_reaches_across_obtuse_angle() {
        // Flat obtuse triangle (a, b, c) over a vertex d; point source below d
        let points = vec![
            Point2::new(-1.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 0.1),
            Point2::new(0.0, -1.0),
        ];
        let mesh = crate::mesh::build_from_triangles(&points, &[[0, 1, 2], [1, 0, 3]]).unwrap();
        let source = Point2::new(0.0, -3.0);
        let value = |v: VertexId| {
            if v.index() == 2 {
                f64::INFINITY
            } else {
                (points[v.index()] - source).norm()
            }
        };

        let c = VertexId::new(2);
        let folded = vertex_update(&mesh, c, 1.0, &value, 0);
        assert_relative_eq!(folded, 10f64.sqrt() + 0.1, epsilon = 1e-12);

        // d sits on the ray from the source to c
        let unfolded = vertex_update(&mesh, c, 1.0, &value, 8);
        assert_relative_eq!(unfolded, 3.1, epsilon = 1e-12);
    }
}

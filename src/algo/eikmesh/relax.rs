//! Spring-force relaxation.
//!
//! Every mesh edge acts as a purely repulsive 1-D spring with rest length
//! `h(midpoint) * scale`, where `scale` makes the desired lengths slightly
//! larger than the current ones on average so the mesh pushes outwards
//! against the domain border. Vertices move by `force * dt`, capped by a
//! per-vertex travel limit.
//!
//! The force and integration step works on a flattened [`RelaxProblem`]
//! (positions plus a CSR adjacency with desired lengths) so that compute
//! devices can run it without touching the mesh.

use nalgebra::{Point2, Vector2};
use rayon::prelude::*;

use crate::geometry::distance::{numerical_gradient, project};
use crate::mesh::{FaceId, PlanarMesh, VertexId};

const MAX_REPAIR_ROUNDS: usize = 8;

/// Flattened input of one relaxation step.
///
/// Arrays are indexed by vertex slot (`VertexId::index()`); destroyed slots
/// are present but not movable and have no neighbours.
#[derive(Debug, Clone, Default)]
pub struct RelaxProblem {
    /// Current positions.
    pub positions: Vec<Point2<f64>>,
    /// Whether the vertex may move.
    pub movable: Vec<bool>,
    /// Maximum travel distance in one step.
    pub max_travel: Vec<f64>,
    /// CSR offsets into `neighbors`/`desired`, one more than the slot count.
    pub offsets: Vec<u32>,
    /// Neighbour slots.
    pub neighbors: Vec<u32>,
    /// Desired length of the edge to each neighbour.
    pub desired: Vec<f64>,
    /// Time step.
    pub delta_t: f64,
}

impl RelaxProblem {
    /// Flatten `mesh` for one step.
    ///
    /// `scale` multiplies every `edge_length(midpoint)`; `travel_fraction`
    /// caps each vertex's motion at that fraction of its shortest incident
    /// edge.
    pub fn from_mesh<H>(
        mesh: &PlanarMesh,
        edge_length: &H,
        scale: f64,
        travel_fraction: f64,
        delta_t: f64,
    ) -> Self
    where
        H: Fn(&Point2<f64>) -> f64 + ?Sized,
    {
        let n = mesh.vertex_capacity();
        let mut problem = Self {
            positions: Vec::with_capacity(n),
            movable: Vec::with_capacity(n),
            max_travel: Vec::with_capacity(n),
            offsets: Vec::with_capacity(n + 1),
            neighbors: Vec::new(),
            desired: Vec::new(),
            delta_t,
        };
        problem.offsets.push(0);

        for i in 0..n {
            let v = VertexId::new(i);
            let alive = mesh.is_vertex_alive(v);
            if !alive {
                problem.positions.push(Point2::origin());
                problem.movable.push(false);
                problem.max_travel.push(0.0);
                problem.offsets.push(problem.neighbors.len() as u32);
                continue;
            }
            let p = *mesh.position(v);
            let vertex = mesh.vertex(v);
            let mut shortest = f64::INFINITY;
            for he in mesh.vertex_halfedges(v) {
                let w = mesh.dest(he);
                let len = mesh.edge_length(he);
                shortest = shortest.min(len);
                problem.neighbors.push(w.index() as u32);
                problem.desired.push(edge_length(&mesh.edge_midpoint(he)) * scale);
            }
            problem.positions.push(p);
            problem.movable.push(!vertex.fixed && shortest.is_finite());
            problem.max_travel.push(if shortest.is_finite() {
                travel_fraction * shortest
            } else {
                0.0
            });
            problem.offsets.push(problem.neighbors.len() as u32);
        }
        problem
    }

    /// Number of vertex slots.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether there are no vertex slots.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Net spring force on slot `i`.
    pub fn force(&self, i: usize) -> Vector2<f64> {
        let p = self.positions[i];
        let (start, end) = (self.offsets[i] as usize, self.offsets[i + 1] as usize);
        let mut force = Vector2::zeros();
        for k in start..end {
            let q = self.positions[self.neighbors[k] as usize];
            let d = p - q;
            let len = d.norm();
            if len <= f64::EPSILON {
                continue;
            }
            let push = (self.desired[k] - len).max(0.0);
            force += d * (push / len);
        }
        force
    }

    /// Position of slot `i` after one capped explicit Euler step.
    pub fn advance(&self, i: usize) -> Point2<f64> {
        let p = self.positions[i];
        if !self.movable[i] {
            return p;
        }
        let mut step = self.force(i) * self.delta_t;
        let len = step.norm();
        if len > self.max_travel[i] && len > 0.0 {
            step *= self.max_travel[i] / len;
        }
        p + step
    }
}

/// Run one relaxation step on the host.
pub fn relax_cpu(problem: &RelaxProblem, parallel: bool) -> Vec<Point2<f64>> {
    if parallel {
        (0..problem.len())
            .into_par_iter()
            .map(|i| problem.advance(i))
            .collect()
    } else {
        (0..problem.len()).map(|i| problem.advance(i)).collect()
    }
}

/// Scale making desired lengths match the current mesh in the mean-square
/// sense, times `f_scale`: `f_scale * sqrt(sum len^2 / sum h(mid)^2)`.
pub fn scale_factor<H>(mesh: &PlanarMesh, edge_length: &H, f_scale: f64) -> f64
where
    H: Fn(&Point2<f64>) -> f64 + ?Sized,
{
    let (actual, desired) = mesh.edges().fold((0.0, 0.0), |(a, d), he| {
        let h = edge_length(&mesh.edge_midpoint(he));
        (a + mesh.edge_length(he).powi(2), d + h * h)
    });
    if desired <= 0.0 {
        return f_scale;
    }
    f_scale * (actual / desired).sqrt()
}

/// Move mesh vertices to `targets`, restricting sliding vertices to the
/// border tangent and projecting escaped or border vertices back onto the
/// zero level set of `distance`.
///
/// Returns the largest displacement.
pub fn apply_motion<D>(
    mesh: &mut PlanarMesh,
    targets: &[Point2<f64>],
    distance: &D,
    deps: f64,
) -> f64
where
    D: Fn(&Point2<f64>) -> f64 + ?Sized,
{
    let ids: Vec<VertexId> = mesh.vertex_ids().collect();
    let mut max_move: f64 = 0.0;
    for v in ids {
        let Some(&target) = targets.get(v.index()) else {
            continue;
        };
        let vertex = mesh.vertex(v);
        if vertex.fixed {
            continue;
        }
        let old = vertex.position;
        let mut p = target;
        if vertex.slide {
            let normal = numerical_gradient(distance, &old, deps);
            let n2 = normal.norm_squared();
            if n2 > f64::EPSILON {
                let step = p - old;
                p = old + (step - normal * (step.dot(&normal) / n2));
            }
        }
        if mesh.is_boundary_vertex(v) || distance(&p) > 0.0 {
            p = project(distance, &p, deps);
        }
        max_move = max_move.max((p - old).norm());
        mesh.set_position(v, p);
    }
    max_move
}

/// Repair inverted triangles after vertex motion.
///
/// Each round first tries to flip an edge of every inverted triangle into
/// two positive triangles, then moves the vertices of triangles that are
/// still inverted back to `previous`. Returns the number of flips.
pub fn repair_inversions(mesh: &mut PlanarMesh, previous: &[Point2<f64>]) -> usize {
    let mut flips = 0;
    for _ in 0..MAX_REPAIR_ROUNDS {
        for f in mesh.inverted_faces() {
            if mesh.is_interior_face(f) && mesh.face_area(f) <= 0.0 && try_flip_out(mesh, f) {
                flips += 1;
            }
        }
        let inverted = mesh.inverted_faces();
        if inverted.is_empty() {
            return flips;
        }
        tracing::debug!(count = inverted.len(), "reverting vertices of inverted triangles");
        for f in inverted {
            for v in mesh.face_triangle(f) {
                if let Some(&p) = previous.get(v.index()) {
                    mesh.set_position(v, p);
                }
            }
        }
    }
    if !mesh.inverted_faces().is_empty() {
        tracing::warn!("inverted triangles remain after repair");
    }
    flips
}

fn try_flip_out(mesh: &mut PlanarMesh, f: FaceId) -> bool {
    let edges: Vec<_> = mesh.face_halfedges(f).collect();
    edges
        .into_iter()
        .any(|he| mesh.is_flippable(he) && mesh.flip_edge(he).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{distance, Rect};
    use approx::assert_relative_eq;

    fn fan() -> PlanarMesh {
        let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 2.0, 2.0));
        let f = mesh.interior_faces().next().unwrap();
        mesh.split_triangle(f, Point2::new(1.4, 0.6)).unwrap();
        mesh
    }

    #[test]
    fn test_forces_push_apart_only() {
        let mesh = fan();
        let short = RelaxProblem::from_mesh(&mesh, &|_: &Point2<f64>| 0.1, 1.0, 1.0, 0.2);
        for i in 0..short.len() {
            assert_eq!(short.force(i), Vector2::zeros());
        }

        let long = RelaxProblem::from_mesh(&mesh, &|_: &Point2<f64>| 5.0, 1.0, 1.0, 0.2);
        let centre = mesh.vertex_ids().last().unwrap().index();
        assert!(long.force(centre).norm() > 0.0);
    }

    #[test]
    fn test_travel_cap_and_fixed() {
        let mut mesh = fan();
        let corner = VertexId::new(0);
        mesh.vertex_mut(corner).fixed = true;
        let problem = RelaxProblem::from_mesh(&mesh, &|_: &Point2<f64>| 50.0, 1.0, 0.25, 10.0);
        let moved = relax_cpu(&problem, false);
        assert_eq!(moved[0], problem.positions[0]);
        for i in 1..problem.len() {
            let step = (moved[i] - problem.positions[i]).norm();
            assert!(step <= problem.max_travel[i] + 1e-12);
        }
        assert_eq!(moved, relax_cpu(&problem, true));
    }

    #[test]
    fn test_scale_factor_matches_mean_square() {
        let mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        // Edges: four of length 1, one of sqrt 2
        let s = scale_factor(&mesh, &|_: &Point2<f64>| 1.0, 1.2);
        assert_relative_eq!(s, 1.2 * (6.0f64 / 5.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_apply_motion_projects_escaped_vertices() {
        let bounds = Rect::new(0.0, 0.0, 2.0, 2.0);
        let mut mesh = fan();
        let d = distance::rect(bounds);
        let centre = mesh.vertex_ids().last().unwrap();
        let mut targets: Vec<_> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();
        for v in 0..4 {
            mesh.vertex_mut(VertexId::new(v)).fixed = true;
        }
        targets[centre.index()] = Point2::new(1.4, 0.6);
        let moved = apply_motion(&mut mesh, &targets, d.as_ref(), 1e-6);
        assert_relative_eq!(moved, 0.0, epsilon = 1e-12);

        // A border vertex pushed outside comes back onto the border
        let mut mesh = PlanarMesh::from_rect(&bounds);
        let bottom = mesh
            .edges()
            .find(|&he| mesh.is_boundary_edge(he) && mesh.edge_midpoint(he) == Point2::new(1.0, 0.0))
            .unwrap();
        let (first, _) = mesh.split_edge(bottom, Point2::new(1.0, 0.0)).unwrap();
        let m = mesh.dest(first);
        let mut targets: Vec<_> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();
        targets[m.index()] = *mesh.position(m) + Vector2::new(0.1, -0.3);
        apply_motion(&mut mesh, &targets, d.as_ref(), 1e-6);
        assert_relative_eq!(d(mesh.position(m)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(mesh.position(m).x, 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_repair_reverts_inversion() {
        let mut mesh = fan();
        let centre = mesh.vertex_ids().last().unwrap();
        let previous: Vec<_> = mesh.vertex_ids().map(|v| *mesh.position(v)).collect();
        // Push the centre vertex across the diagonal
        mesh.set_position(centre, Point2::new(0.6, 1.4));
        assert!(!mesh.inverted_faces().is_empty());
        repair_inversions(&mut mesh, &previous);
        assert!(mesh.inverted_faces().is_empty());
        assert!(mesh.is_valid());
    }
}

//! Fast Marching on a triangulation.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use nalgebra::{Point2, Vector2};

use super::fmm::BandEntry;
use super::update::vertex_update;
use super::{mesh_fim, EikonalSolver, FieldCache, PotentialField, SolveReport};
use crate::algo::delaunay::{locate_from, Location};
use crate::error::{ConfigError, Result};
use crate::geometry::predicates::barycentric;
use crate::geometry::{Domain, TimeCostFunction};
use crate::mesh::{FaceId, PlanarMesh, VertexId};

/// Options for mesh solvers.
#[derive(Debug, Clone)]
pub struct MeshSolverOptions {
    /// Triangles searched across the opposite edge of an obtuse angle.
    pub max_unfoldings: usize,
    /// Convergence threshold on per-vertex change (iterative method).
    pub tolerance: f64,
    /// Iteration cap (iterative method).
    pub max_iterations: usize,
    /// Run data-parallel passes on rayon.
    pub parallel: bool,
}

impl Default for MeshSolverOptions {
    fn default() -> Self {
        Self {
            max_unfoldings: 8,
            tolerance: 1e-9,
            max_iterations: 10_000,
            parallel: true,
        }
    }
}

impl MeshSolverOptions {
    /// Set the unfolding cap.
    pub fn with_max_unfoldings(mut self, max_unfoldings: usize) -> Self {
        self.max_unfoldings = max_unfoldings;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable rayon.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Single-threaded passes.
    pub fn sequential(self) -> Self {
        self.with_parallel(false)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.tolerance >= 0.0) {
            return Err(ConfigError::invalid_param("tolerance", self.tolerance, "must be non-negative"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid_param("max_iterations", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Per-vertex values on a shared mesh, interpolated linearly per triangle.
#[derive(Debug)]
pub struct MeshField {
    mesh: Arc<PlanarMesh>,
    values: Vec<f64>,
    hint: AtomicU32,
}

impl Clone for MeshField {
    fn clone(&self) -> Self {
        Self {
            mesh: Arc::clone(&self.mesh),
            values: self.values.clone(),
            hint: AtomicU32::new(self.hint.load(Ordering::Relaxed)),
        }
    }
}

impl MeshField {
    /// Wrap per-vertex-slot `values`.
    pub fn new(mesh: Arc<PlanarMesh>, values: Vec<f64>) -> Self {
        Self {
            mesh,
            values,
            hint: AtomicU32::new(u32::MAX),
        }
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &Arc<PlanarMesh> {
        &self.mesh
    }

    /// Value at a vertex.
    pub fn value(&self, v: VertexId) -> f64 {
        self.values.get(v.index()).copied().unwrap_or(f64::INFINITY)
    }

    /// All values by vertex slot.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn locate(&self, p: &Point2<f64>) -> Option<FaceId> {
        let raw = self.hint.load(Ordering::Relaxed);
        let hint = if raw == u32::MAX {
            FaceId::invalid()
        } else {
            FaceId::new(raw as usize)
        };
        let (location, last) = locate_from(&self.mesh, p, hint);
        if last.is_valid() {
            self.hint.store(last.index() as u32, Ordering::Relaxed);
        }
        match location {
            Location::Outside => None,
            other => other.face(&self.mesh),
        }
    }
}

impl PotentialField for MeshField {
    fn potential(&self, p: &Point2<f64>) -> f64 {
        let Some(f) = self.locate(p) else {
            return f64::INFINITY;
        };
        let [a, b, c] = self.mesh.face_triangle(f);
        let [pa, pb, pc] = self.mesh.face_positions(f);
        let t = [self.value(a), self.value(b), self.value(c)];
        let Some(w) = barycentric(p, &pa, &pb, &pc) else {
            return t.iter().copied().fold(f64::INFINITY, f64::min);
        };
        if t.iter().all(|v| v.is_finite()) {
            return w[0] * t[0] + w[1] * t[1] + w[2] * t[2];
        }
        let (mut sum, mut weight) = (0.0, 0.0);
        for k in 0..3 {
            if t[k].is_finite() && w[k] > 0.0 {
                sum += w[k] * t[k];
                weight += w[k];
            }
        }
        if weight > 0.0 {
            sum / weight
        } else {
            f64::INFINITY
        }
    }

    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64> {
        let Some(f) = self.locate(p) else {
            return Vector2::zeros();
        };
        let [a, b, c] = self.mesh.face_triangle(f);
        let [pa, pb, pc] = self.mesh.face_positions(f);
        let (ta, tb, tc) = (self.value(a), self.value(b), self.value(c));
        if !(ta.is_finite() && tb.is_finite() && tc.is_finite()) {
            return Vector2::zeros();
        }
        // Solve [e1; e2] g = [tb - ta; tc - ta]
        let e1 = pb - pa;
        let e2 = pc - pa;
        let det = e1.x * e2.y - e1.y * e2.x;
        if det.abs() <= f64::EPSILON {
            return Vector2::zeros();
        }
        let (d1, d2) = (tb - ta, tc - ta);
        Vector2::new((d1 * e2.y - d2 * e1.y) / det, (e1.x * d2 - e2.x * d1) / det)
    }
}

/// Which mesh method a [`MeshSolver`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshMethod {
    /// Fast Marching.
    Fmm,
    /// Fast Iterative Method.
    Fim,
}

/// A mesh solver sharing its triangulation read-only.
#[derive(Debug, Clone)]
pub struct MeshSolver {
    method: MeshMethod,
    options: MeshSolverOptions,
    slowness: Vec<f64>,
    seeds: Vec<(VertexId, f64)>,
    field: MeshField,
    solved: bool,
    report: SolveReport,
}

impl MeshSolver {
    /// Prepare a solve over `mesh` for the targets of `domain`.
    ///
    /// Every vertex of an interior face whose centroid lies in a target is
    /// seeded at zero, as is every vertex inside a target. A target that
    /// seeds nothing that way (a point, or a shape smaller than a triangle)
    /// seeds the vertices of the triangle containing it with the exact
    /// `distance / F`.
    pub fn new(
        method: MeshMethod,
        mesh: Arc<PlanarMesh>,
        domain: &Domain,
        speed: TimeCostFunction,
        options: MeshSolverOptions,
    ) -> Result<Self> {
        domain.validate_for_solve()?;
        options.validate()?;
        if mesh.num_triangles() == 0 {
            return Err(ConfigError::MissingInput {
                kind: "mesh",
                requirement: "at least one interior triangle",
            }
            .into());
        }

        let mut slowness = vec![f64::INFINITY; mesh.vertex_capacity()];
        for (v, vertex) in mesh.vertices() {
            let f = speed(&vertex.position);
            if f > 0.0 && f.is_finite() {
                slowness[v.index()] = 1.0 / f;
            }
        }
        let seeds = seed_targets(&mesh, domain, &slowness);
        tracing::debug!(seeds = seeds.len(), vertices = mesh.num_vertices(), "mesh targets seeded");

        let values = vec![f64::INFINITY; mesh.vertex_capacity()];
        Ok(Self {
            method,
            options,
            slowness,
            seeds,
            field: MeshField::new(mesh, values),
            solved: false,
            report: SolveReport::default(),
        })
    }

    /// The method this solver runs.
    pub fn method(&self) -> MeshMethod {
        self.method
    }

    /// The solved field (all infinite before solving).
    pub fn field(&self) -> &MeshField {
        &self.field
    }

    /// Hand the field to the caller.
    pub fn into_field(self) -> MeshField {
        self.field
    }

    /// Counters from the last solve.
    pub fn report(&self) -> SolveReport {
        self.report
    }

    fn seeded_values(&self) -> Vec<f64> {
        let mut values = vec![f64::INFINITY; self.slowness.len()];
        for &(v, t) in &self.seeds {
            values[v.index()] = t;
        }
        values
    }
}

/// Seed values for the targets of `domain`, by vertex.
fn seed_targets(mesh: &PlanarMesh, domain: &Domain, slowness: &[f64]) -> Vec<(VertexId, f64)> {
    let mut values: Vec<f64> = vec![f64::INFINITY; mesh.vertex_capacity()];
    let mut seed = |v: VertexId, t: f64| {
        let slot = &mut values[v.index()];
        if t < *slot {
            *slot = t;
        }
    };

    for target in &domain.targets {
        let mut hit = false;
        for f in mesh.interior_faces() {
            if target.contains(&mesh.face_centroid(f)) {
                for v in mesh.face_vertices(f) {
                    seed(v, 0.0);
                }
                hit = true;
            }
        }
        for v in mesh.vertex_ids() {
            if target.contains(mesh.position(v)) {
                seed(v, 0.0);
                hit = true;
            }
        }
        if hit {
            continue;
        }

        let anchor = target.anchor();
        let (location, _) = locate_from(mesh, &anchor, FaceId::invalid());
        match location.face(mesh) {
            Some(f) => {
                for v in mesh.face_vertices(f) {
                    seed(v, target.distance(mesh.position(v)) * slowness[v.index()]);
                }
            }
            _ => {
                let nearest = mesh.vertex_ids().min_by(|&a, &b| {
                    let da = (mesh.position(a) - anchor).norm_squared();
                    let db = (mesh.position(b) - anchor).norm_squared();
                    da.total_cmp(&db)
                });
                if let Some(v) = nearest {
                    tracing::warn!(x = anchor.x, y = anchor.y, "target outside the mesh; seeding the nearest vertex");
                    seed(v, target.distance(mesh.position(v)) * slowness[v.index()]);
                }
            }
        }
    }

    values
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_finite())
        .map(|(i, &t)| (VertexId::new(i), t))
        .collect()
}

/// Triangle-based Fast Marching from the seeded `values`.
pub(crate) fn march(mesh: &PlanarMesh, slowness: &[f64], values: &mut [f64], max_unfoldings: usize) -> SolveReport {
    let mut frozen = vec![false; values.len()];
    let mut heap = BinaryHeap::new();
    let mut updates = 0usize;

    let seeds: Vec<VertexId> = mesh.vertex_ids().filter(|v| values[v.index()].is_finite()).collect();
    for &v in &seeds {
        frozen[v.index()] = true;
    }
    for &v in &seeds {
        relax_neighbors(mesh, v, slowness, values, &frozen, max_unfoldings, &mut heap, &mut updates);
    }

    let mut pops = 0usize;
    while let Some(BandEntry { value, node }) = heap.pop() {
        if frozen[node] || value > values[node] {
            continue;
        }
        frozen[node] = true;
        pops += 1;
        relax_neighbors(mesh, VertexId::new(node), slowness, values, &frozen, max_unfoldings, &mut heap, &mut updates);
    }

    tracing::debug!(seeds = seeds.len(), frozen = pops, updates, "mesh fast marching finished");
    SolveReport {
        iterations: pops,
        updates,
        converged: true,
    }
}

#[allow(clippy::too_many_arguments)]
fn relax_neighbors(
    mesh: &PlanarMesh,
    v: VertexId,
    slowness: &[f64],
    values: &mut [f64],
    frozen: &[bool],
    max_unfoldings: usize,
    heap: &mut BinaryHeap<BandEntry>,
    updates: &mut usize,
) {
    let neighbors: Vec<VertexId> = mesh.vertex_neighbors(v).collect();
    for w in neighbors {
        let wi = w.index();
        if frozen[wi] || slowness[wi].is_infinite() {
            continue;
        }
        let candidate = {
            let snapshot: &[f64] = values;
            let known = |k: VertexId| {
                if frozen[k.index()] {
                    snapshot[k.index()]
                } else {
                    f64::INFINITY
                }
            };
            vertex_update(mesh, w, slowness[wi], &known, max_unfoldings)
        };
        if candidate < values[wi] {
            values[wi] = candidate;
            heap.push(BandEntry { value: candidate, node: wi });
            *updates += 1;
        }
    }
}

impl EikonalSolver for MeshSolver {
    fn name(&self) -> &'static str {
        match self.method {
            MeshMethod::Fmm => "mesh-fmm",
            MeshMethod::Fim => "mesh-fim",
        }
    }

    fn solve(&mut self) -> Result<SolveReport> {
        let _span = tracing::debug_span!("mesh_solve", method = self.name()).entered();
        let mut values = self.seeded_values();
        let mesh = Arc::clone(&self.field.mesh);
        let o = &self.options;
        self.report = match self.method {
            MeshMethod::Fmm => march(&mesh, &self.slowness, &mut values, o.max_unfoldings),
            MeshMethod::Fim => mesh_fim::iterate(&mesh, &self.slowness, &mut values, o),
        };
        self.field = MeshField::new(mesh, values);
        self.solved = true;
        let reachable = self.field.values.iter().filter(|v| v.is_finite()).count();
        tracing::info!(
            method = self.name(),
            vertices = self.field.mesh.num_vertices(),
            reachable,
            converged = self.report.converged,
            "eikonal solve finished"
        );
        Ok(self.report)
    }

    fn is_solved(&self) -> bool {
        self.solved
    }

    fn potential(&self, p: &Point2<f64>) -> f64 {
        if !self.solved {
            return f64::INFINITY;
        }
        self.field.potential(p)
    }

    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64> {
        if !self.solved {
            return Vector2::zeros();
        }
        self.field.gradient(p)
    }

    fn values(&self) -> &[f64] {
        &self.field.values
    }

    fn load_cached_field(&mut self, cache: &dyn FieldCache, handle: &str) -> bool {
        let Some(mut values) = cache.load(handle) else {
            return false;
        };
        if values.len() != self.slowness.len() {
            tracing::warn!(handle, expected = self.slowness.len(), found = values.len(), "cached field has the wrong size");
            return false;
        }
        for &(v, t) in &self.seeds {
            values[v.index()] = t;
        }
        self.field = MeshField::new(Arc::clone(&self.field.mesh), values);
        self.solved = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikmesh::refine::refine_to_length;
    use crate::geometry::{distance, Rect, Shape};
    use approx::assert_relative_eq;

    fn refined_square(h: f64) -> Arc<PlanarMesh> {
        let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        refine_to_length(&mut mesh, |_| h, usize::MAX).unwrap();
        Arc::new(mesh)
    }

    fn point_domain(p: Point2<f64>) -> Domain {
        Domain::new(Rect::new(0.0, 0.0, 1.0, 1.0)).with_target(Shape::Point(p))
    }

    #[test]
    fn test_agrees_with_euclidean_distance() {
        let mesh = refined_square(0.1);
        let source = Point2::new(0.0, 0.0);
        let mut solver = MeshSolver::new(
            MeshMethod::Fmm,
            Arc::clone(&mesh),
            &point_domain(source),
            distance::constant_speed(1.0),
            MeshSolverOptions::default(),
        )
        .unwrap();
        solver.solve().unwrap();
        for v in mesh.vertex_ids() {
            let exact = (mesh.position(v) - source).norm();
            let t = solver.field().value(v);
            assert!((t - exact).abs() < 0.05, "{v:?}: {t} vs {exact}");
        }
        let g = solver.gradient(&Point2::new(0.6, 0.3));
        assert_relative_eq!(g.norm(), 1.0, epsilon = 0.25);
    }

    #[test]
    fn test_speed_scales_arrival_time() {
        let mesh = refined_square(0.2);
        let domain = point_domain(Point2::new(0.0, 0.0));
        let solve = |f: f64| {
            let mut s = MeshSolver::new(
                MeshMethod::Fmm,
                Arc::clone(&mesh),
                &domain,
                distance::constant_speed(f),
                MeshSolverOptions::default(),
            )
            .unwrap();
            s.solve().unwrap();
            s
        };
        let slow = solve(1.0);
        let fast = solve(4.0);
        let q = Point2::new(1.0, 1.0);
        assert_relative_eq!(slow.potential(&q), 4.0 * fast.potential(&q), epsilon = 1e-9);
    }

    #[test]
    fn test_region_target_seeds_faces() {
        let mesh = refined_square(0.2);
        let domain = Domain::new(Rect::new(0.0, 0.0, 1.0, 1.0)).with_target(Rect::new(0.0, 0.0, 1.0, 0.3));
        let mut solver = MeshSolver::new(
            MeshMethod::Fmm,
            Arc::clone(&mesh),
            &domain,
            distance::constant_speed(1.0),
            MeshSolverOptions::default(),
        )
        .unwrap();
        solver.solve().unwrap();
        assert_eq!(solver.potential(&Point2::new(0.5, 0.1)), 0.0);
        let top = solver.potential(&Point2::new(0.5, 1.0));
        assert!(top > 0.5 && top < 1.0, "{top}");
    }

    #[test]
    fn test_outside_queries_and_unsolved() {
        let mesh = refined_square(0.5);
        let solver = MeshSolver::new(
            MeshMethod::Fmm,
            mesh,
            &point_domain(Point2::new(0.5, 0.5)),
            distance::constant_speed(1.0),
            MeshSolverOptions::default(),
        )
        .unwrap();
        assert!(solver.potential(&Point2::new(0.5, 0.5)).is_infinite());
        let field = MeshField::new(Arc::clone(solver.field().mesh()), vec![1.0; solver.values().len()]);
        assert_relative_eq!(field.potential(&Point2::new(0.25, 0.75)), 1.0, epsilon = 1e-12);
        assert!(field.potential(&Point2::new(2.0, 2.0)).is_infinite());
        assert_eq!(field.gradient(&Point2::new(0.25, 0.75)), Vector2::zeros());
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let result = MeshSolver::new(
            MeshMethod::Fmm,
            Arc::new(PlanarMesh::new()),
            &point_domain(Point2::new(0.5, 0.5)),
            distance::constant_speed(1.0),
            MeshSolverOptions::default(),
        );
        assert!(result.is_err());
    }
}

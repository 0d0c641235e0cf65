//! EikMesh: adaptive mesh generation from a distance and an edge-length field.
//!
//! The generator is a small state machine ([`EikMeshState`]):
//!
//! 1. **Uniform refinement.** The two-triangle mesh of the bounding box is
//!    bisected along longest edges until every edge is at most
//!    `h0 * edge_length(midpoint)`. Triangles reaching outside the free space
//!    are removed from the outer border or turned into holes.
//! 2. **Relaxation.** Each edge acts as a repulsive spring; vertices move by
//!    the net force, capped per step. Escaped and border vertices are
//!    projected back onto the zero level set of the distance function.
//! 3. **Retriangulation.** Inverted triangles are repaired, then edges are
//!    flipped until the mesh is Delaunay again.
//! 4. **Termination.** The run converges once the worst triangle quality
//!    reaches `min_quality` and vertices have stopped moving. Hitting the
//!    step cap is not an error: the best mesh seen is returned.
//!
//! # Example
//!
//! ```
//! use eikmesh::algo::eikmesh::{EikMesh, EikMeshOptions};
//! use eikmesh::geometry::{distance, Rect};
//!
//! let bounds = Rect::new(0.0, 0.0, 1.0, 1.0);
//! let options = EikMeshOptions::with_h0(0.25)
//!     .with_max_steps(20)
//!     .with_min_quality(0.3);
//! let generator = EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options).unwrap();
//! let result = generator.generate().unwrap();
//! assert!(result.quality.min > 0.3);
//! ```

mod quality;
pub(crate) mod refine;
mod relax;

use nalgebra::Point2;

pub use quality::QualityStats;
pub use relax::{apply_motion, relax_cpu, repair_inversions, scale_factor, RelaxProblem};

use crate::algo::delaunay::{legalize_all, Triangulation};
use crate::algo::Progress;
use crate::error::{ConfigError, Result};
use crate::geometry::{DistanceFunction, Domain, EdgeLengthFunction, Rect};
use crate::mesh::{FaceId, PlanarMesh, VertexId};

/// Lifecycle of an [`EikMesh`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EikMeshState {
    /// Nothing has been built yet.
    Uninitialized,
    /// The uniformly refined starting mesh exists.
    UniformRefined,
    /// At least one relaxation step ran.
    Relaxing,
    /// The quality threshold is exceeded and the border lies on the zero
    /// level set.
    Converged,
}

/// Options for [`EikMesh`].
#[derive(Debug, Clone)]
pub struct EikMeshOptions {
    /// Base edge length; the edge-length function is relative to it.
    pub h0: f64,

    /// Maximum number of relaxation steps.
    pub max_steps: usize,

    /// Minimum triangle quality must exceed this for convergence.
    pub min_quality: f64,

    /// Optional extra criterion: largest vertex motion, relative to `h0`,
    /// still counted as converged. Off by default.
    pub move_tolerance: Option<f64>,

    /// Time step of the force integration.
    pub delta_t: f64,

    /// Factor by which desired edge lengths exceed the current ones.
    pub f_scale: f64,

    /// Per-step motion cap as a fraction of the shortest incident edge.
    pub travel_fraction: f64,

    /// Maximum legalization sweeps per step.
    pub legalize_passes: usize,

    /// Remove border triangles that drift outside the domain.
    pub cleanup_boundary: bool,

    /// Points inserted before refinement and never moved.
    pub fixed_points: Vec<Point2<f64>>,

    /// Stop uniform refinement at this many vertices.
    pub max_vertices: usize,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for EikMeshOptions {
    fn default() -> Self {
        Self::with_h0(0.1)
    }
}

impl EikMeshOptions {
    /// Create options with the given base edge length.
    pub fn with_h0(h0: f64) -> Self {
        Self {
            h0,
            max_steps: 100,
            min_quality: 0.1,
            move_tolerance: None,
            delta_t: 0.2,
            f_scale: 1.2,
            travel_fraction: 0.3,
            legalize_passes: 32,
            cleanup_boundary: true,
            fixed_points: Vec::new(),
            max_vertices: 2_000_000,
            parallel: true,
        }
    }

    /// Set the step cap.
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Set the quality required for convergence.
    pub fn with_min_quality(mut self, quality: f64) -> Self {
        self.min_quality = quality;
        self
    }

    /// Also require the largest step motion to stay below `tolerance * h0`.
    pub fn with_move_tolerance(mut self, tolerance: f64) -> Self {
        self.move_tolerance = Some(tolerance);
        self
    }

    /// Set the integration time step.
    pub fn with_delta_t(mut self, delta_t: f64) -> Self {
        self.delta_t = delta_t;
        self
    }

    /// Set the desired-length scale.
    pub fn with_f_scale(mut self, f_scale: f64) -> Self {
        self.f_scale = f_scale;
        self
    }

    /// Add a fixed point.
    pub fn with_fixed_point(mut self, p: Point2<f64>) -> Self {
        self.fixed_points.push(p);
        self
    }

    /// Set whether border triangles outside the domain are removed.
    pub fn with_cleanup_boundary(mut self, cleanup: bool) -> Self {
        self.cleanup_boundary = cleanup;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let positive = [
            ("h0", self.h0),
            ("delta_t", self.delta_t),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::invalid_param(name, value, "must be positive and finite"));
            }
        }
        if let Some(tolerance) = self.move_tolerance {
            if !(tolerance > 0.0 && tolerance.is_finite()) {
                return Err(ConfigError::invalid_param(
                    "move_tolerance",
                    tolerance,
                    "must be positive and finite",
                ));
            }
        }
        if !(self.f_scale >= 1.0) {
            return Err(ConfigError::invalid_param("f_scale", self.f_scale, "must be at least 1"));
        }
        if !(self.travel_fraction > 0.0 && self.travel_fraction <= 1.0) {
            return Err(ConfigError::invalid_param(
                "travel_fraction",
                self.travel_fraction,
                "must be in (0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_quality) {
            return Err(ConfigError::invalid_param(
                "min_quality",
                self.min_quality,
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Statistics of one relaxation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// One-based step number.
    pub step: usize,
    /// Quality after the step.
    pub quality: QualityStats,
    /// Largest vertex displacement.
    pub max_move: f64,
    /// Largest `|distance|` over movable border vertices.
    pub boundary_error: f64,
    /// Edge flips during repair and legalization.
    pub flips: usize,
    /// Border triangles removed by clean-up.
    pub removed: usize,
}

/// Output of [`EikMesh::generate`].
#[derive(Debug, Clone)]
pub struct EikMeshResult {
    /// The generated mesh, compacted.
    pub mesh: PlanarMesh,
    /// Relaxation steps executed.
    pub steps: usize,
    /// Whether the convergence criteria were met.
    pub converged: bool,
    /// Quality of the returned mesh.
    pub quality: QualityStats,
}

/// Adaptive mesh generator.
pub struct EikMesh {
    bounds: Rect,
    distance: DistanceFunction,
    edge_length: EdgeLengthFunction,
    options: EikMeshOptions,
    mesh: PlanarMesh,
    state: EikMeshState,
    steps: usize,
    quality: QualityStats,
    best: Option<Candidate>,
}

/// A relaxed mesh kept in case the step cap is reached.
#[derive(Debug, Clone)]
struct Candidate {
    fits_boundary: bool,
    quality: QualityStats,
    mesh: PlanarMesh,
}

impl std::fmt::Debug for EikMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EikMesh")
            .field("bounds", &self.bounds)
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl EikMesh {
    /// Create a generator for the region `distance < 0` inside `bounds`.
    ///
    /// # Errors
    /// Invalid bounds or options, and edge-length functions that are not
    /// positive at the centre of the bounds.
    pub fn new(
        bounds: Rect,
        distance: DistanceFunction,
        edge_length: EdgeLengthFunction,
        options: EikMeshOptions,
    ) -> std::result::Result<Self, ConfigError> {
        bounds.validate()?;
        options.validate()?;
        let at_center = edge_length(&bounds.center());
        if !(at_center > 0.0 && at_center.is_finite()) {
            return Err(ConfigError::invalid_param(
                "edge_length",
                at_center,
                "must be positive inside the domain",
            ));
        }
        Ok(Self {
            bounds,
            distance,
            edge_length,
            options,
            mesh: PlanarMesh::new(),
            state: EikMeshState::Uninitialized,
            steps: 0,
            quality: QualityStats::default(),
            best: None,
        })
    }

    /// Create a generator for the free space of `domain`.
    pub fn for_domain(
        domain: &Domain,
        edge_length: EdgeLengthFunction,
        options: EikMeshOptions,
    ) -> std::result::Result<Self, ConfigError> {
        domain.validate()?;
        Self::new(domain.bounds, domain.distance_function(), edge_length, options)
    }

    /// Current state.
    pub fn state(&self) -> EikMeshState {
        self.state
    }

    /// The current mesh (empty before initialization).
    pub fn mesh(&self) -> &PlanarMesh {
        &self.mesh
    }

    /// Quality of the current mesh.
    pub fn quality(&self) -> QualityStats {
        self.quality
    }

    /// Relaxation steps run so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The options in use.
    pub fn options(&self) -> &EikMeshOptions {
        &self.options
    }

    fn deps(&self) -> f64 {
        1e-3 * self.options.h0
    }

    /// Build the uniformly refined starting mesh. Does nothing if the mesh
    /// already exists.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != EikMeshState::Uninitialized {
            return Ok(());
        }
        let h0 = self.options.h0;
        let geps = self.deps();

        let mut tri = Triangulation::new(self.bounds)?;
        let mut fixed = Vec::new();
        for &p in &self.options.fixed_points {
            if self.bounds.contains(&p) {
                fixed.push(tri.insert_or_find(p)?);
            } else {
                tracing::warn!(x = p.x, y = p.y, "fixed point outside the bounds ignored");
            }
        }
        let mut mesh = tri.into_mesh();
        for v in fixed {
            mesh.vertex_mut(v).fixed = true;
        }

        let edge_length = &self.edge_length;
        let inserted = refine::refine_to_length(
            &mut mesh,
            |p| h0 * edge_length(p),
            self.options.max_vertices,
        )?;

        let distance = &self.distance;
        let outside = |mesh: &PlanarMesh, f: FaceId| {
            distance(&mesh.face_centroid(f)) > 0.0
                || mesh.face_vertices(f).any(|v| distance(mesh.position(v)) > geps)
        };
        let trimmed = mesh.remove_boundary_faces(outside);
        let enclosed: std::collections::HashSet<FaceId> =
            mesh.interior_faces().filter(|&f| outside(&mesh, f)).collect();
        let holes = enclosed.len();
        mesh.merge_faces(&enclosed);

        // from_rect creates the bounding-box corners first
        for i in 0..4 {
            let v = VertexId::new(i);
            if mesh.is_vertex_alive(v) && distance(mesh.position(v)) <= geps {
                mesh.vertex_mut(v).fixed = true;
            }
        }
        let border: Vec<VertexId> = mesh
            .vertex_ids()
            .filter(|&v| mesh.is_boundary_vertex(v) && distance(mesh.position(v)).abs() <= geps)
            .collect();
        for v in border {
            mesh.vertex_mut(v).slide = true;
        }

        tracing::debug!(
            vertices = mesh.num_vertices(),
            triangles = mesh.num_triangles(),
            inserted,
            trimmed,
            holes,
            "uniform refinement done"
        );

        self.quality = QualityStats::of(&mesh);
        self.best = None;
        self.mesh = mesh;
        self.state = EikMeshState::UniformRefined;
        Ok(())
    }

    /// Flatten the current mesh for one relaxation step.
    pub fn relax_problem(&self) -> RelaxProblem {
        let h = self.edge_length.as_ref();
        let scale = scale_factor(&self.mesh, h, self.options.f_scale);
        RelaxProblem::from_mesh(
            &self.mesh,
            h,
            scale,
            self.options.travel_fraction,
            self.options.delta_t,
        )
    }

    /// Run one relaxation step followed by retriangulation.
    ///
    /// Initializes first if needed. Once converged, further calls leave the
    /// mesh untouched.
    pub fn step(&mut self) -> Result<StepStats> {
        self.initialize()?;
        if self.state == EikMeshState::Converged {
            return Ok(StepStats {
                step: self.steps,
                quality: self.quality,
                max_move: 0.0,
                boundary_error: boundary_error(&self.mesh, self.distance.as_ref()),
                flips: 0,
                removed: 0,
            });
        }
        let problem = self.relax_problem();
        let targets = relax_cpu(&problem, self.options.parallel);
        Ok(self.finish_step(&problem.positions, &targets))
    }

    /// Apply relaxed positions computed elsewhere, then project, repair,
    /// legalize and measure.
    pub(crate) fn finish_step(
        &mut self,
        previous: &[Point2<f64>],
        targets: &[Point2<f64>],
    ) -> StepStats {
        let deps = self.deps();
        let distance = self.distance.as_ref();
        let mesh = &mut self.mesh;

        let max_move = apply_motion(mesh, targets, distance, deps);
        let repaired = repair_inversions(mesh, previous);
        let legalized = legalize_all(mesh, self.options.legalize_passes);

        let removed = if self.options.cleanup_boundary {
            mesh.remove_boundary_faces(|m, f| distance(&m.face_centroid(f)) > -deps)
        } else {
            0
        };

        self.steps += 1;
        self.quality = QualityStats::of(mesh);
        let boundary_error = boundary_error(mesh, distance);
        let fits_boundary = boundary_error <= deps;
        // Meshes on the zero level set win; quality breaks ties
        let better = self.best.as_ref().map_or(true, |best| {
            (fits_boundary, self.quality.min) > (best.fits_boundary, best.quality.min)
        });
        if better {
            self.best = Some(Candidate {
                fits_boundary,
                quality: self.quality,
                mesh: mesh.clone(),
            });
        }

        let settled = self
            .options
            .move_tolerance
            .map_or(true, |tolerance| max_move < tolerance * self.options.h0);
        let converged = self.quality.min > self.options.min_quality && fits_boundary && settled;
        self.state = if converged {
            EikMeshState::Converged
        } else {
            EikMeshState::Relaxing
        };

        tracing::debug!(
            step = self.steps,
            min_quality = self.quality.min,
            mean_quality = self.quality.mean,
            max_move,
            boundary_error,
            flips = repaired + legalized.flips,
            removed,
            "relaxation step"
        );

        StepStats {
            step: self.steps,
            quality: self.quality,
            max_move,
            boundary_error,
            flips: repaired + legalized.flips,
            removed,
        }
    }

    /// Run to convergence or the step cap.
    pub fn generate(self) -> Result<EikMeshResult> {
        self.generate_internal(None)
    }

    /// Run to convergence or the step cap, reporting each step.
    pub fn generate_with_progress(self, progress: &Progress) -> Result<EikMeshResult> {
        self.generate_internal(Some(progress))
    }

    fn generate_internal(mut self, progress: Option<&Progress>) -> Result<EikMeshResult> {
        let total = self.options.max_steps + 1;
        if let Some(p) = progress {
            p.report(0, total, "Uniform refinement");
        }
        self.initialize()?;

        while self.steps < self.options.max_steps && self.state != EikMeshState::Converged {
            self.step()?;
            if let Some(p) = progress {
                p.report(self.steps, total, "Relaxing");
            }
        }
        if let Some(p) = progress {
            p.report(total, total, "EikMesh complete");
        }
        Ok(self.finish())
    }

    /// Stop and hand out the result: the current mesh when converged,
    /// otherwise the best relaxed one seen. Before any step has run this is
    /// the uniformly refined mesh.
    pub fn finish(self) -> EikMeshResult {
        let converged = self.state == EikMeshState::Converged;
        let (quality, mut mesh) = match self.best {
            Some(best) if !converged => {
                tracing::info!(
                    steps = self.steps,
                    min_quality = best.quality.min,
                    fits_boundary = best.fits_boundary,
                    "step cap reached; returning best mesh"
                );
                (best.quality, best.mesh)
            }
            _ => (self.quality, self.mesh),
        };
        mesh.compact();
        tracing::info!(
            vertices = mesh.num_vertices(),
            triangles = mesh.num_triangles(),
            min_quality = quality.min,
            converged,
            "mesh generated"
        );
        EikMeshResult {
            mesh,
            steps: self.steps,
            converged,
            quality,
        }
    }
}

/// Generate a mesh of the free space of `domain`.
pub fn generate(
    domain: &Domain,
    edge_length: EdgeLengthFunction,
    options: EikMeshOptions,
) -> Result<EikMeshResult> {
    EikMesh::for_domain(domain, edge_length, options)?.generate()
}

/// Largest `|distance|` over movable border vertices of `mesh`.
fn boundary_error<D>(mesh: &PlanarMesh, distance: &D) -> f64
where
    D: Fn(&Point2<f64>) -> f64 + ?Sized,
{
    mesh.vertices()
        .filter(|(v, vertex)| !vertex.fixed && mesh.is_boundary_vertex(*v))
        .map(|(_, vertex)| distance(&vertex.position).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::delaunay::is_delaunay;
    use crate::geometry::distance;
    use crate::geometry::Shape;

    fn unit_square() -> Rect {
        Rect::new(0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn test_state_machine() {
        let bounds = unit_square();
        let mut gen = EikMesh::new(
            bounds,
            distance::rect(bounds),
            distance::uniform(1.0),
            EikMeshOptions::with_h0(0.2).sequential(),
        )
        .unwrap();
        assert_eq!(gen.state(), EikMeshState::Uninitialized);
        gen.initialize().unwrap();
        assert_eq!(gen.state(), EikMeshState::UniformRefined);
        assert!(gen.mesh().is_valid());
        let corners = (0..4)
            .filter(|&i| gen.mesh().vertex(VertexId::new(i)).fixed)
            .count();
        assert_eq!(corners, 4);

        let stats = gen.step().unwrap();
        assert_eq!(stats.step, 1);
        assert!(matches!(
            gen.state(),
            EikMeshState::Relaxing | EikMeshState::Converged
        ));
        assert!(gen.mesh().is_valid());
        assert!(gen.mesh().inverted_faces().is_empty());
    }

    #[test]
    fn test_unit_square_quality() {
        let bounds = unit_square();
        let options = EikMeshOptions::with_h0(0.1)
            .with_max_steps(60)
            .with_min_quality(0.5);
        let result = EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options)
            .unwrap()
            .generate()
            .unwrap();

        assert!(result.steps <= 60);
        assert!(result.quality.min >= 0.5);
        assert!(result.mesh.is_valid());
        assert!(result.mesh.inverted_faces().is_empty());
        assert!((result.mesh.interior_area() - 1.0).abs() < 1e-2);
        assert!(is_delaunay(&result.mesh));
    }

    #[test]
    fn test_disk_quality_improves() {
        let bounds = Rect::new(-1.0, -1.0, 1.0, 1.0);
        let options = EikMeshOptions::with_h0(0.15).with_max_steps(80);
        let mut gen = EikMesh::new(
            bounds,
            distance::circle(Point2::origin(), 1.0),
            distance::uniform(1.0),
            options,
        )
        .unwrap();
        let first = gen.step().unwrap();
        let mut last = first;
        for _ in 0..60 {
            last = gen.step().unwrap();
        }
        assert!(last.quality.mean >= first.quality.mean - 0.02);
        assert!(gen.mesh().is_valid());

        // Every vertex lies in (or on) the disk
        for v in gen.mesh().vertex_ids() {
            assert!(gen.mesh().position(v).coords.norm() <= 1.0 + 1e-3);
        }
        let area = gen.mesh().interior_area();
        assert!(area > 0.9 * std::f64::consts::PI && area <= std::f64::consts::PI + 1e-2);
    }

    fn box_with_disc() -> Domain {
        Domain::new(Rect::new(0.0, 0.0, 4.0, 4.0)).with_obstacle(Shape::Circle {
            center: Point2::new(2.0, 2.0),
            radius: 0.8,
        })
    }

    #[test]
    fn test_quality_alone_converges_on_curved_border() {
        let domain = box_with_disc();
        let options = EikMeshOptions::with_h0(0.2).with_max_steps(100);
        let result = generate(&domain, distance::uniform(1.0), options).unwrap();

        assert!(result.converged);
        assert!(result.steps < 100);
        assert!(result.quality.min > 0.1);
        let d = domain.distance_function();
        assert!(boundary_error(&result.mesh, d.as_ref()) <= 1e-3 * 0.2);
    }

    #[test]
    fn test_step_cap_returns_relaxed_mesh() {
        let domain = box_with_disc();
        let d = domain.distance_function();
        // Unreachable threshold forces the cap
        let options = EikMeshOptions::with_h0(0.2)
            .with_max_steps(30)
            .with_min_quality(0.99);
        let mut gen = EikMesh::for_domain(&domain, distance::uniform(1.0), options).unwrap();
        gen.initialize().unwrap();
        let staircase = boundary_error(gen.mesh(), d.as_ref());
        assert!(staircase > 1e-2);

        let result = gen.generate().unwrap();
        assert!(!result.converged);
        assert_eq!(result.steps, 30);
        assert!(result.mesh.is_valid());
        assert!(boundary_error(&result.mesh, d.as_ref()) <= 1e-3 * 0.2);
    }

    #[test]
    fn test_zero_steps_returns_uniform_mesh() {
        let domain = box_with_disc();
        let options = EikMeshOptions::with_h0(0.2).with_max_steps(0);
        let mut gen = EikMesh::for_domain(&domain, distance::uniform(1.0), options).unwrap();
        gen.initialize().unwrap();
        let triangles = gen.mesh().num_triangles();

        let result = gen.generate().unwrap();
        assert!(!result.converged);
        assert_eq!(result.steps, 0);
        assert_eq!(result.mesh.num_triangles(), triangles);
    }

    #[test]
    fn test_motion_criterion_is_opt_in() {
        let bounds = unit_square();
        let make = |options| EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options);
        assert_eq!(EikMeshOptions::default().move_tolerance, None);
        assert!(make(EikMeshOptions::with_h0(0.1).with_move_tolerance(0.0)).is_err());
        assert!(make(EikMeshOptions::with_h0(0.1).with_move_tolerance(1e-3)).is_ok());
    }

    #[test]
    fn test_obstacle_becomes_hole() {
        let domain = Domain::new(Rect::new(0.0, 0.0, 4.0, 4.0))
            .with_obstacle(Shape::Rect(Rect::new(1.5, 1.5, 2.5, 2.5)));
        let result = generate(
            &domain,
            distance::uniform(1.0),
            EikMeshOptions::with_h0(0.25).with_max_steps(30),
        )
        .unwrap();
        let mesh = &result.mesh;
        assert!(mesh.is_valid());
        for f in mesh.interior_faces() {
            assert!(!domain.in_obstacle(&mesh.face_centroid(f)));
        }
        assert!(mesh.hole_faces().count() >= 1);
        let area = mesh.interior_area();
        assert!((area - 15.0).abs() < 0.5);
    }

    #[test]
    fn test_fixed_point_is_kept() {
        let bounds = unit_square();
        let p = Point2::new(0.37, 0.61);
        let options = EikMeshOptions::with_h0(0.2).with_max_steps(10).with_fixed_point(p);
        let result = EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options)
            .unwrap()
            .generate()
            .unwrap();
        let mesh = &result.mesh;
        assert!(mesh.vertex_ids().any(|v| *mesh.position(v) == p && mesh.vertex(v).fixed));
    }

    #[test]
    fn test_progress_reports_completion() {
        use std::sync::{Arc, Mutex};
        let bounds = unit_square();
        let last = Arc::new(Mutex::new((0, 0)));
        let sink = Arc::clone(&last);
        let progress = Progress::new(move |c, t, _| *sink.lock().unwrap() = (c, t));
        EikMesh::new(
            bounds,
            distance::rect(bounds),
            distance::uniform(1.0),
            EikMeshOptions::with_h0(0.25).with_max_steps(5),
        )
        .unwrap()
        .generate_with_progress(&progress)
        .unwrap();
        let (c, t) = *last.lock().unwrap();
        assert_eq!(c, t);
    }

    #[test]
    fn test_invalid_options() {
        let bounds = unit_square();
        let make = |options| EikMesh::new(bounds, distance::rect(bounds), distance::uniform(1.0), options);
        assert!(make(EikMeshOptions::with_h0(0.0)).is_err());
        assert!(make(EikMeshOptions::with_h0(0.1).with_f_scale(0.5)).is_err());
        assert!(make(EikMeshOptions::with_h0(0.1).with_min_quality(2.0)).is_err());
        assert!(EikMesh::new(
            bounds,
            distance::rect(bounds),
            distance::uniform(-1.0),
            EikMeshOptions::default()
        )
        .is_err());
    }
}

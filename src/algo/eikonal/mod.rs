//! Eikonal solvers: arrival time `T` with `|grad T| F = 1` and `T = 0` on targets.
//!
//! Two families share one interface, [`EikonalSolver`]:
//!
//! - grid solvers over a [`CellGrid`] rasterized from a [`Domain`]:
//!   Fast Marching (causal, heap driven), Fast Sweeping (Gauss-Seidel in
//!   four diagonal orders) and the Fast Iterative Method (data-parallel
//!   active list);
//! - mesh solvers over a triangulation: triangle-based Fast Marching with
//!   obtuse-angle unfolding, and an active-list variant.
//!
//! Obstacles and regions cut off from every target keep an infinite
//! potential. That is a valid result, not an error.
//!
//! # Example
//!
//! ```
//! use eikmesh::algo::eikonal::{build_solver, GridSolverOptions, SolverKind};
//! use eikmesh::geometry::{distance, Domain, Rect, Shape};
//! use nalgebra::Point2;
//!
//! let domain = Domain::new(Rect::new(0.0, 0.0, 10.0, 10.0))
//!     .with_target(Shape::Point(Point2::new(5.0, 5.0)));
//! let options = GridSolverOptions::with_spacing(0.5);
//! let mut solver = build_solver(
//!     SolverKind::GridFmm,
//!     &domain,
//!     distance::constant_speed(1.0),
//!     &options,
//!     None,
//! )
//! .unwrap();
//! solver.solve().unwrap();
//! let t = solver.potential(&Point2::new(0.0, 0.0));
//! assert!((t - 50f64.sqrt()).abs() < 0.5);
//! ```

mod cache;
mod fim;
mod fmm;
mod fsm;
mod grid;
mod mesh_fim;
mod mesh_fmm;
mod update;

use std::sync::Arc;

use nalgebra::{Point2, Vector2};

use crate::error::{ConfigError, Result};
use crate::geometry::{Domain, TimeCostFunction};
use crate::mesh::PlanarMesh;

pub use cache::{FieldCache, MemoryCache};
pub use grid::{CellGrid, CellTag, MAX_GRID_NODES};
pub use mesh_fmm::{MeshField, MeshMethod, MeshSolver, MeshSolverOptions};
pub use update::{solve_2d, triangle_update, vertex_update, UpdateOrder};

pub use fim::FimPass;

pub(crate) use fim::{fim_pass, iterate_with};

/// A scalar field queryable anywhere in the plane.
pub trait PotentialField: Send + Sync {
    /// Interpolated potential at `p`; infinite where unreachable.
    fn potential(&self, p: &Point2<f64>) -> f64;

    /// Interpolated gradient at `p`.
    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64>;
}

/// Counters from one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// Heap pops (marching) or iterations (sweeping, iterative).
    pub iterations: usize,
    /// Accepted value decreases.
    pub updates: usize,
    /// `false` when an iteration cap cut the solve short.
    pub converged: bool,
}

/// One Eikonal method behind a uniform interface.
pub trait EikonalSolver: Send + Sync {
    /// Short method name for logs.
    fn name(&self) -> &'static str;

    /// Run the solve. Calling it again recomputes from the seeds.
    fn solve(&mut self) -> Result<SolveReport>;

    /// Whether [`solve`](Self::solve) has completed or a cached field was loaded.
    fn is_solved(&self) -> bool;

    /// Potential at `p`; infinite before solving.
    fn potential(&self, p: &Point2<f64>) -> f64;

    /// Gradient at `p`; zero before solving.
    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64>;

    /// Node values in solver order.
    fn values(&self) -> &[f64];

    /// Replace the field with a cached copy stored under `handle`.
    ///
    /// Returns `false` when nothing usable is stored.
    fn load_cached_field(&mut self, cache: &dyn FieldCache, handle: &str) -> bool;

    /// Store the solved field under `handle`. Returns `false` before solving.
    fn save_field_to_cache(&self, cache: &dyn FieldCache, handle: &str) -> bool {
        if !self.is_solved() {
            return false;
        }
        cache.store(handle, self.values());
        true
    }
}

/// Which method [`build_solver`] constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    /// Fast Marching on a grid.
    GridFmm,
    /// Fast Sweeping on a grid.
    GridFsm,
    /// Fast Iterative Method on a grid.
    GridFim,
    /// Fast Marching on a triangulation.
    MeshFmm,
    /// Fast Iterative Method on a triangulation.
    MeshFim,
}

impl SolverKind {
    /// Whether the method needs a mesh.
    pub fn needs_mesh(self) -> bool {
        matches!(self, SolverKind::MeshFmm | SolverKind::MeshFim)
    }
}

impl std::str::FromStr for SolverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fmm" | "grid-fmm" => Ok(SolverKind::GridFmm),
            "fsm" | "grid-fsm" => Ok(SolverKind::GridFsm),
            "fim" | "grid-fim" => Ok(SolverKind::GridFim),
            "mesh-fmm" => Ok(SolverKind::MeshFmm),
            "mesh-fim" => Ok(SolverKind::MeshFim),
            _ => Err(ConfigError::invalid_param(
                "solver",
                s,
                "expected fmm, fsm, fim, mesh-fmm or mesh-fim",
            )),
        }
    }
}

/// Options for grid solvers.
#[derive(Debug, Clone)]
pub struct GridSolverOptions {
    /// Node spacing.
    pub spacing: f64,
    /// Finite-difference order.
    pub order: UpdateOrder,
    /// Convergence threshold on per-node change (sweeping, iterative).
    pub tolerance: f64,
    /// Iteration cap (sweeping, iterative).
    pub max_iterations: usize,
    /// Radius of exact initialization around targets; `2 * spacing` if unset.
    pub init_radius: Option<f64>,
    /// Run data-parallel passes on rayon.
    pub parallel: bool,
}

impl Default for GridSolverOptions {
    fn default() -> Self {
        Self::with_spacing(0.1)
    }
}

impl GridSolverOptions {
    /// Default options at the given node spacing.
    pub fn with_spacing(spacing: f64) -> Self {
        Self {
            spacing,
            order: UpdateOrder::First,
            tolerance: 1e-9,
            max_iterations: 10_000,
            init_radius: None,
            parallel: true,
        }
    }

    /// Set the finite-difference order.
    pub fn with_order(mut self, order: UpdateOrder) -> Self {
        self.order = order;
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

    /// Set the exact-initialization radius.
    pub fn with_init_radius(mut self, radius: f64) -> Self {
        self.init_radius = Some(radius);
        self
    }

    /// Enable or disable rayon.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Single-threaded, deterministic passes.
    pub fn sequential(self) -> Self {
        self.with_parallel(false)
    }

    /// Effective exact-initialization radius.
    pub fn effective_init_radius(&self) -> f64 {
        self.init_radius.unwrap_or(2.0 * self.spacing)
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.spacing > 0.0 && self.spacing.is_finite()) {
            return Err(ConfigError::invalid_param("spacing", self.spacing, "must be positive and finite"));
        }
        if !(self.tolerance >= 0.0) {
            return Err(ConfigError::invalid_param("tolerance", self.tolerance, "must be non-negative"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid_param("max_iterations", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Which grid method a [`GridSolver`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMethod {
    /// Fast Marching.
    Fmm,
    /// Fast Sweeping.
    Fsm,
    /// Fast Iterative Method.
    Fim,
}

/// A grid solver owning its [`CellGrid`].
#[derive(Debug, Clone)]
pub struct GridSolver {
    method: GridMethod,
    options: GridSolverOptions,
    seeded: CellGrid,
    grid: CellGrid,
    solved: bool,
    report: SolveReport,
}

impl GridSolver {
    /// Rasterize `domain` with travel speed `speed`.
    pub fn new<S>(method: GridMethod, domain: &Domain, speed: &S, options: GridSolverOptions) -> Result<Self>
    where
        S: Fn(&Point2<f64>) -> f64 + ?Sized,
    {
        options.validate()?;
        let grid = CellGrid::from_domain(domain, speed, options.spacing, options.effective_init_radius())?;
        Ok(Self {
            method,
            options,
            seeded: grid.clone(),
            grid,
            solved: false,
            report: SolveReport::default(),
        })
    }

    /// The method this solver runs.
    pub fn method(&self) -> GridMethod {
        self.method
    }

    /// The grid, solved or not.
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    /// Counters from the last solve.
    pub fn report(&self) -> SolveReport {
        self.report
    }

    /// Hand the grid to the caller.
    pub fn into_grid(self) -> CellGrid {
        self.grid
    }
}

impl EikonalSolver for GridSolver {
    fn name(&self) -> &'static str {
        match self.method {
            GridMethod::Fmm => "grid-fmm",
            GridMethod::Fsm => "grid-fsm",
            GridMethod::Fim => "grid-fim",
        }
    }

    fn solve(&mut self) -> Result<SolveReport> {
        let _span = tracing::debug_span!("grid_solve", method = self.name()).entered();
        self.grid = self.seeded.clone();
        let o = &self.options;
        self.report = match self.method {
            GridMethod::Fmm => fmm::march(&mut self.grid, o.order),
            GridMethod::Fsm => fsm::sweep(&mut self.grid, o.order, o.tolerance, o.max_iterations),
            GridMethod::Fim => fim::iterate(&mut self.grid, o.order, o.tolerance, o.max_iterations, o.parallel),
        };
        self.solved = true;
        let reachable = self.grid.potentials().iter().filter(|v| v.is_finite()).count();
        tracing::info!(
            method = self.name(),
            nodes = self.grid.len(),
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
        PotentialField::potential(&self.grid, p)
    }

    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64> {
        if !self.solved {
            return Vector2::zeros();
        }
        PotentialField::gradient(&self.grid, p)
    }

    fn values(&self) -> &[f64] {
        self.grid.potentials()
    }

    fn load_cached_field(&mut self, cache: &dyn FieldCache, handle: &str) -> bool {
        let Some(values) = cache.load(handle) else {
            return false;
        };
        let mut grid = self.seeded.clone();
        if !grid.restore(&values) {
            tracing::warn!(handle, expected = grid.len(), found = values.len(), "cached field has the wrong size");
            return false;
        }
        self.grid = grid;
        self.solved = true;
        true
    }
}

/// Construct the solver selected by `kind`.
///
/// Mesh methods need `mesh`; they ignore the grid spacing and order and take
/// tolerance, iteration cap and parallelism from `options`.
pub fn build_solver(
    kind: SolverKind,
    domain: &Domain,
    speed: TimeCostFunction,
    options: &GridSolverOptions,
    mesh: Option<Arc<PlanarMesh>>,
) -> Result<Box<dyn EikonalSolver>> {
    let grid = |method| -> Result<Box<dyn EikonalSolver>> {
        Ok(Box::new(GridSolver::new(method, domain, speed.as_ref(), options.clone())?))
    };
    match kind {
        SolverKind::GridFmm => grid(GridMethod::Fmm),
        SolverKind::GridFsm => grid(GridMethod::Fsm),
        SolverKind::GridFim => grid(GridMethod::Fim),
        SolverKind::MeshFmm | SolverKind::MeshFim => {
            let mesh = mesh.ok_or(ConfigError::MissingInput {
                kind: "mesh",
                requirement: "mesh-based solvers need a triangulation",
            })?;
            let method = if kind == SolverKind::MeshFmm {
                MeshMethod::Fmm
            } else {
                MeshMethod::Fim
            };
            let mesh_options = MeshSolverOptions::default()
                .with_tolerance(options.tolerance)
                .with_max_iterations(options.max_iterations)
                .with_parallel(options.parallel);
            Ok(Box::new(MeshSolver::new(method, mesh, domain, speed, mesh_options)?))
        }
    }
}

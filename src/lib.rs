//! # EikMesh
//!
//! Adaptive planar meshing and Eikonal potential fields for navigation
//! around obstacles.
//!
//! The crate builds a half-edge triangulation of a region of the plane and
//! solves the Eikonal equation `|grad T| * F = 1` on it or on a regular grid.
//! The solution `T` is the minimal travel time to a set of targets; agents
//! follow `-grad T`.
//!
//! ## Features
//!
//! - **Half-edge planar mesh** with explicit boundary and hole faces and
//!   type-safe indices
//! - **Incremental Delaunay triangulation** with constrained segments and
//!   Ruppert-style refinement
//! - **EikMesh** adaptive mesh generation from a signed distance function and
//!   a relative edge-length function
//! - **Eikonal solvers**: Fast Marching, Fast Sweeping and the Fast Iterative
//!   Method on grids, Fast Marching and the Fast Iterative Method on meshes
//! - **Compute devices** for relaxation and iterative updates, with an
//!   optional wgpu backend (feature `gpu`)
//!
//! ## Quick Start
//!
//! ```
//! use eikmesh::prelude::*;
//! use nalgebra::Point2;
//!
//! let domain = Domain::new(Rect::new(0.0, 0.0, 10.0, 10.0))
//!     .with_obstacle(Rect::new(4.0, 2.0, 5.0, 8.0))
//!     .with_target(Shape::Point(Point2::new(1.0, 5.0)));
//!
//! let speed = |_: &Point2<f64>| 1.0;
//! let mut solver = GridSolver::new(
//!     GridMethod::Fmm,
//!     &domain,
//!     &speed,
//!     GridSolverOptions::with_spacing(0.25),
//! )
//! .unwrap();
//! solver.solve().unwrap();
//!
//! // Behind the wall the detour is longer than the straight line
//! let t = solver.potential(&Point2::new(9.0, 5.0));
//! assert!(t > 8.0 && t.is_finite());
//! ```
//!
//! ## Meshing a Domain
//!
//! ```
//! use eikmesh::prelude::*;
//! use eikmesh::geometry::distance;
//!
//! let domain = Domain::new(Rect::new(0.0, 0.0, 2.0, 1.0));
//! let options = EikMeshOptions::with_h0(0.2).with_max_steps(30);
//! let result = eikmesh::algo::eikmesh::generate(&domain, distance::uniform(1.0), options).unwrap();
//! assert!(result.mesh.is_valid());
//! assert!(result.quality.min > 0.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// ```
/// use eikmesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::delaunay::Triangulation;
    pub use crate::algo::eikmesh::{EikMesh, EikMeshOptions, EikMeshResult};
    pub use crate::algo::eikonal::{
        build_solver, EikonalSolver, GridMethod, GridSolver, GridSolverOptions, MeshMethod, MeshSolver,
        MeshSolverOptions, PotentialField, SolverKind, UpdateOrder,
    };
    pub use crate::error::{ConfigError, DeviceError, Error, GeometryError, Result};
    pub use crate::geometry::{Domain, Polygon, Rect, Shape};
    pub use crate::mesh::{build_from_triangles, FaceId, HalfEdgeId, PlanarMesh, VertexId};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

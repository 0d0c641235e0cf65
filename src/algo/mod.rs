//! Meshing and field algorithms.
//!
//! - **Delaunay**: incremental constrained triangulation and quality refinement
//! - **EikMesh**: adaptive mesh generation by spring relaxation
//! - **Eikonal**: travel-time solvers on grids and triangulations

pub mod delaunay;
pub mod eikmesh;
pub mod eikonal;
mod progress;

pub use progress::Progress;

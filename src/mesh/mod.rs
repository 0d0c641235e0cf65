//! Planar mesh data structures.
//!
//! The primary type is [`PlanarMesh`], a half-edge (doubly-connected edge
//! list) representation of a triangulated region of the plane with explicit
//! boundary and hole faces.
//!
//! # Index Types
//!
//! Mesh elements are identified by type-safe index wrappers:
//! - [`VertexId`] - Identifies a vertex
//! - [`HalfEdgeId`] - Identifies a half-edge
//! - [`FaceId`] - Identifies a face
//!
//! Algorithms hold ids, never references, across mutation. Destroyed
//! elements keep their slot until [`PlanarMesh::compact`] renumbers the mesh.
//!
//! # Construction
//!
//! ```
//! use eikmesh::geometry::Rect;
//! use eikmesh::mesh::PlanarMesh;
//! use nalgebra::Point2;
//!
//! let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
//! let face = mesh.interior_faces().next().unwrap();
//! let center = mesh.face_centroid(face);
//! mesh.split_triangle(face, center).unwrap();
//! assert_eq!(mesh.num_triangles(), 4);
//! assert!(mesh.is_valid());
//! ```

mod builder;
mod halfedge;
mod index;
mod ops;

pub use builder::{build_from_triangles, to_face_vertex};
pub use halfedge::{
    Face, FaceHalfEdgeIter, FaceKind, HalfEdge, PlanarMesh, Vertex, VertexHalfEdgeIter,
};
pub use index::{FaceId, HalfEdgeId, VertexId};
pub use ops::CompactMap;

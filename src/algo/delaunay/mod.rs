//! Incremental constrained Delaunay triangulation.
//!
//! A [`Triangulation`] starts as the two-triangle triangulation of a bounding
//! rectangle. Points are inserted by splitting the face (or edge) that
//! contains them, followed by legalization: edges opposite the new vertex are
//! flipped while the neighbouring apex lies strictly inside the circumcircle.
//! Co-circular configurations are left alone.
//!
//! Segments are conformed by recursive midpoint insertion and marked
//! constrained, after which they are never flipped. [`Triangulation::refine`]
//! adds Ruppert-style quality refinement.
//!
//! # Example
//!
//! ```
//! use eikmesh::algo::delaunay::Triangulation;
//! use eikmesh::geometry::Rect;
//! use nalgebra::Point2;
//!
//! let mut tri = Triangulation::new(Rect::new(0.0, 0.0, 10.0, 10.0)).unwrap();
//! tri.insert(Point2::new(3.0, 4.0)).unwrap();
//! tri.insert_segment(Point2::new(1.0, 1.0), Point2::new(9.0, 2.0)).unwrap();
//! assert!(tri.is_delaunay());
//! ```

mod locate;
mod refine;

use std::cell::Cell;
use std::collections::HashSet;

use nalgebra::Point2;

pub use locate::{locate_from, Location};
pub use refine::{RefineOptions, RefineReport};

use crate::error::{ConfigError, GeometryError};
use crate::geometry::predicates::{in_circle_strict, midpoint, orient2d_sign};
use crate::geometry::{Polygon, Rect};
use crate::mesh::{FaceId, HalfEdgeId, PlanarMesh, VertexId};

/// Upper bound on midpoint insertions while conforming one segment.
const MAX_SEGMENT_SPLITS: usize = 1 << 16;

/// An incremental constrained Delaunay triangulation over a [`PlanarMesh`].
#[derive(Debug, Clone)]
pub struct Triangulation {
    mesh: PlanarMesh,
    hint: Cell<FaceId>,
}

impl Triangulation {
    /// Triangulate a rectangle with two triangles.
    pub fn new(bounds: Rect) -> Result<Self, ConfigError> {
        bounds.validate()?;
        Ok(Self::from_mesh(PlanarMesh::from_rect(&bounds)))
    }

    /// Wrap an existing mesh. It is not re-legalized.
    pub fn from_mesh(mesh: PlanarMesh) -> Self {
        Self {
            mesh,
            hint: Cell::new(FaceId::invalid()),
        }
    }

    /// Triangulate a rectangle and insert `points`.
    pub fn from_points(bounds: Rect, points: &[Point2<f64>]) -> crate::error::Result<Self> {
        let mut tri = Self::new(bounds)?;
        for &p in points {
            tri.insert(p)?;
        }
        Ok(tri)
    }

    /// The underlying mesh.
    pub fn mesh(&self) -> &PlanarMesh {
        &self.mesh
    }

    /// Mutable access to the underlying mesh.
    ///
    /// Moving vertices through this handle may break the Delaunay property;
    /// call [`legalize_all`](Self::legalize_all) afterwards.
    pub fn mesh_mut(&mut self) -> &mut PlanarMesh {
        &mut self.mesh
    }

    /// Give up the triangulation and keep the mesh.
    pub fn into_mesh(self) -> PlanarMesh {
        self.mesh
    }

    /// Locate a point, starting from the face found by the previous query.
    pub fn locate(&self, p: &Point2<f64>) -> Location {
        let (loc, last) = locate_from(&self.mesh, p, self.hint.get());
        self.hint.set(last);
        loc
    }

    /// Insert a point and restore the Delaunay property around it.
    ///
    /// # Errors
    /// [`GeometryError::CoincidentPoint`] if the point matches an existing
    /// vertex and [`GeometryError::OutsideDomain`] if no interior triangle
    /// covers it.
    pub fn insert(&mut self, p: Point2<f64>) -> Result<VertexId, GeometryError> {
        let v = match self.locate(&p) {
            Location::OnVertex(vertex) => {
                return Err(GeometryError::CoincidentPoint {
                    x: p.x,
                    y: p.y,
                    vertex,
                })
            }
            Location::Outside => return Err(GeometryError::OutsideDomain { x: p.x, y: p.y }),
            Location::InFace(f) => self.mesh.split_triangle(f, p)?,
            Location::OnEdge(he) => {
                let (first, _) = self.mesh.split_edge(he, p)?;
                self.mesh.dest(first)
            }
        };
        legalize_vertex(&mut self.mesh, v);
        self.hint.set(self.mesh.vertex_faces(v).next().unwrap_or_default());
        Ok(v)
    }

    /// Insert a point, or return the vertex it coincides with.
    pub fn insert_or_find(&mut self, p: Point2<f64>) -> Result<VertexId, GeometryError> {
        match self.insert(p) {
            Err(GeometryError::CoincidentPoint { vertex, .. }) => Ok(vertex),
            other => other,
        }
    }

    /// Split the edge of `he` at its midpoint and legalize around the new vertex.
    pub fn split_edge(&mut self, he: HalfEdgeId) -> Result<VertexId, GeometryError> {
        let mid = self.mesh.edge_midpoint(he);
        let (first, _) = self.mesh.split_edge(he, mid)?;
        let v = self.mesh.dest(first);
        legalize_vertex(&mut self.mesh, v);
        Ok(v)
    }

    /// Insert the segment `a`-`b` as a chain of constrained edges.
    ///
    /// Endpoints are inserted (or matched to existing vertices), then the
    /// segment is split at midpoints, or at vertices already lying on it,
    /// until every piece is a mesh edge.
    ///
    /// Returns the constrained half-edges from `a` towards `b`.
    pub fn insert_segment(
        &mut self,
        a: Point2<f64>,
        b: Point2<f64>,
    ) -> Result<Vec<HalfEdgeId>, GeometryError> {
        let va = self.insert_or_find(a)?;
        let vb = self.insert_or_find(b)?;
        self.conform_segment(va, vb)
    }

    /// Conform the segment between two existing vertices.
    pub fn conform_segment(
        &mut self,
        va: VertexId,
        vb: VertexId,
    ) -> Result<Vec<HalfEdgeId>, GeometryError> {
        if va == vb {
            let p = self.mesh.position(va);
            return Err(GeometryError::CoincidentPoint {
                x: p.x,
                y: p.y,
                vertex: va,
            });
        }

        let mut pieces = Vec::new();
        let mut stack = vec![(va, vb)];
        let mut splits = 0usize;
        while let Some((u, w)) = stack.pop() {
            if let Some(he) = self.mesh.halfedge_between(u, w) {
                self.mesh.set_constrained(he, true);
                pieces.push(he);
                continue;
            }
            splits += 1;
            if splits > MAX_SEGMENT_SPLITS {
                return Err(GeometryError::InvalidTopology(format!(
                    "segment {:?}-{:?} could not be conformed",
                    va, vb
                )));
            }
            let m = match self.vertex_on_segment(u, w) {
                Some(x) => x,
                None => {
                    let mid = midpoint(self.mesh.position(u), self.mesh.position(w));
                    self.insert_or_find(mid)?
                }
            };
            if m == u || m == w {
                let length = (self.mesh.position(w) - self.mesh.position(u)).norm();
                return Err(GeometryError::DegenerateEdge {
                    edge: HalfEdgeId::invalid(),
                    length,
                });
            }
            // Pushed in reverse so pieces come out ordered from u to w
            stack.push((m, w));
            stack.push((u, m));
        }
        Ok(pieces)
    }

    /// A neighbour of `u` or `w` lying strictly inside segment `u`-`w`.
    fn vertex_on_segment(&self, u: VertexId, w: VertexId) -> Option<VertexId> {
        let pu = self.mesh.position(u);
        let pw = self.mesh.position(w);
        let dir = pw - pu;
        let len2 = dir.norm_squared();
        let on_segment = |x: &VertexId| {
            let px = self.mesh.position(*x);
            let t = (px - pu).dot(&dir) / len2;
            t > 0.0 && t < 1.0 && orient2d_sign(pu, pw, px) == 0
        };
        self.mesh
            .vertex_neighbors(u)
            .find(on_segment)
            .or_else(|| self.mesh.vertex_neighbors(w).find(on_segment))
    }

    /// Insert the closed boundary of a polygon as constrained segments.
    pub fn insert_polygon(&mut self, polygon: &Polygon) -> Result<Vec<HalfEdgeId>, GeometryError> {
        let vertices: Vec<VertexId> = polygon
            .vertices()
            .iter()
            .map(|&p| self.insert_or_find(p))
            .collect::<Result<_, _>>()?;
        let mut pieces = Vec::new();
        for i in 0..vertices.len() {
            let j = (i + 1) % vertices.len();
            pieces.extend(self.conform_segment(vertices[i], vertices[j])?);
        }
        Ok(pieces)
    }

    /// Turn every interior triangle satisfying `predicate` into hole (or
    /// boundary, when touching the outer border) faces.
    ///
    /// Returns the number of triangles removed.
    pub fn mark_holes<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&PlanarMesh, FaceId) -> bool,
    {
        let doomed: HashSet<FaceId> = self
            .mesh
            .interior_faces()
            .filter(|&f| predicate(&self.mesh, f))
            .collect();
        let count = doomed.len();
        self.mesh.merge_faces(&doomed);
        self.hint.set(FaceId::invalid());
        count
    }

    /// Remove triangles whose centroid lies inside any of `polygons`.
    pub fn mark_polygon_holes(&mut self, polygons: &[Polygon]) -> usize {
        self.mark_holes(|mesh, f| {
            let c = mesh.face_centroid(f);
            polygons.iter().any(|poly| poly.contains(&c))
        })
    }

    /// Whether no unconstrained interior edge violates the empty-circle
    /// property.
    pub fn is_delaunay(&self) -> bool {
        is_delaunay(&self.mesh)
    }

    /// Flip every illegal edge until none remain or `max_passes` sweeps ran.
    pub fn legalize_all(&mut self, max_passes: usize) -> LegalizeStats {
        legalize_all(&mut self.mesh, max_passes)
    }
}

/// Outcome of a global legalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegalizeStats {
    /// Number of flips performed.
    pub flips: usize,
    /// Number of sweeps over all edges.
    pub passes: usize,
    /// Whether the last sweep found nothing to flip.
    pub converged: bool,
}

/// Whether the edge of `he` should be flipped to restore the Delaunay property.
pub fn is_illegal(mesh: &PlanarMesh, he: HalfEdgeId) -> bool {
    if mesh.is_constrained(he) || mesh.is_boundary_edge(he) {
        return false;
    }
    let twin = mesh.twin(he);
    let a = mesh.position(mesh.origin(he));
    let b = mesh.position(mesh.origin(twin));
    let c = mesh.position(mesh.opposite_vertex(he));
    let d = mesh.position(mesh.opposite_vertex(twin));
    in_circle_strict(a, b, c, d)
}

/// Whether every unconstrained interior edge of `mesh` is locally Delaunay.
pub fn is_delaunay(mesh: &PlanarMesh) -> bool {
    mesh.edges().all(|he| !is_illegal(mesh, he))
}

/// Flip edges opposite `v` until its star is locally Delaunay.
///
/// Returns the number of flips.
pub fn legalize_vertex(mesh: &mut PlanarMesh, v: VertexId) -> usize {
    let mut stack: Vec<HalfEdgeId> = mesh
        .vertex_halfedges(v)
        .filter(|&he| !mesh.is_boundary_halfedge(he))
        .map(|he| mesh.next(he))
        .collect();

    let mut flips = 0;
    while let Some(e) = stack.pop() {
        if !mesh.is_halfedge_alive(e) || mesh.opposite_vertex(e) != v {
            continue;
        }
        if !is_illegal(mesh, e) || !mesh.is_flippable(e) {
            continue;
        }
        if mesh.flip_edge(e).is_err() {
            continue;
        }
        flips += 1;
        // e now runs d -> v; the two edges opposite v are prev(e) and next(twin(e))
        stack.push(mesh.prev(e));
        stack.push(mesh.next(mesh.twin(e)));
    }
    flips
}

/// Sweep all edges, flipping illegal ones, until a sweep flips nothing or
/// `max_passes` sweeps ran.
pub fn legalize_all(mesh: &mut PlanarMesh, max_passes: usize) -> LegalizeStats {
    let mut stats = LegalizeStats::default();
    while stats.passes < max_passes {
        stats.passes += 1;
        let mut flipped = 0;
        for he in mesh.edges().collect::<Vec<_>>() {
            if is_illegal(mesh, he) && mesh.flip_edge(he).is_ok() {
                flipped += 1;
            }
        }
        stats.flips += flipped;
        if flipped == 0 {
            stats.converged = true;
            break;
        }
    }
    if !stats.converged {
        tracing::debug!(passes = stats.passes, flips = stats.flips, "legalization hit pass cap");
    }
    stats
}

//! Half-edge planar subdivision.
//!
//! This module provides a half-edge (doubly-connected edge list)
//! representation of a triangulated region of the plane. Every half-edge has a
//! live twin and a face, including the ones along the outer border and around
//! holes: those belong to sentinel faces of kind [`FaceKind::Boundary`] and
//! [`FaceKind::Hole`]. Interior faces are CCW triangles.
//!
//! # Structure
//!
//! - Each edge is split into two **half-edges** pointing in opposite directions
//! - Each half-edge knows its **twin**, **next**, **prev**, **origin vertex**
//!   and **incident face**
//! - Each vertex stores one outgoing half-edge; on the border this is a
//!   half-edge of the boundary or hole face
//! - Each face stores one half-edge of its cycle
//!
//! # Destruction
//!
//! Elements are tombstoned, never moved, so ids stay valid across mutation
//! until [`PlanarMesh::compact`] is called. Iterators only see the current
//! topology; mutating the mesh while holding one is not supported.

use nalgebra::{Point2, Vector2};

use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::GeometryError;
use crate::geometry::{predicates, Rect};

/// A vertex of the planar mesh.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Position in the plane.
    pub position: Point2<f64>,

    /// One outgoing half-edge. For border vertices this is a half-edge of a
    /// boundary or hole face.
    pub halfedge: HalfEdgeId,

    /// The vertex never moves during relaxation.
    pub fixed: bool,

    /// The vertex may only move along the border.
    pub slide: bool,

    pub(crate) removed: bool,
}

impl Vertex {
    /// Create a new, unconnected vertex.
    pub fn new(position: Point2<f64>) -> Self {
        Self {
            position,
            halfedge: HalfEdgeId::invalid(),
            fixed: false,
            slide: false,
            removed: false,
        }
    }
}

/// A half-edge.
#[derive(Debug, Clone, Copy)]
pub struct HalfEdge {
    /// The vertex this half-edge originates from.
    pub origin: VertexId,

    /// The opposite half-edge.
    pub twin: HalfEdgeId,

    /// The next half-edge around the face.
    pub next: HalfEdgeId,

    /// The previous half-edge around the face.
    pub prev: HalfEdgeId,

    /// The face this half-edge belongs to.
    pub face: FaceId,

    /// Part of an input segment; never flipped.
    pub constrained: bool,

    pub(crate) removed: bool,
}

impl HalfEdge {
    /// Create a new unlinked half-edge.
    pub fn new() -> Self {
        Self {
            origin: VertexId::invalid(),
            twin: HalfEdgeId::invalid(),
            next: HalfEdgeId::invalid(),
            prev: HalfEdgeId::invalid(),
            face: FaceId::invalid(),
            constrained: false,
            removed: false,
        }
    }
}

impl Default for HalfEdge {
    fn default() -> Self {
        Self::new()
    }
}

/// What a face represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceKind {
    /// A triangle of the usable domain.
    Interior,
    /// The unbounded face outside the outer border.
    Boundary,
    /// A region removed from the usable domain.
    Hole,
}

/// A face of the planar subdivision.
#[derive(Debug, Clone, Copy)]
pub struct Face {
    /// One half-edge of this face's cycle.
    pub halfedge: HalfEdgeId,

    /// Interior triangle, outer boundary or hole.
    pub kind: FaceKind,

    pub(crate) removed: bool,
}

impl Face {
    /// Create a face record.
    pub fn new(halfedge: HalfEdgeId, kind: FaceKind) -> Self {
        Self {
            halfedge,
            kind,
            removed: false,
        }
    }
}

/// A half-edge representation of a triangulated planar region.
#[derive(Debug, Clone, Default)]
pub struct PlanarMesh {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) halfedges: Vec<HalfEdge>,
    pub(crate) faces: Vec<Face>,
    live_vertices: usize,
    live_halfedges: usize,
    live_faces: usize,
}

impl PlanarMesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh with pre-allocated capacity.
    pub fn with_capacity(num_vertices: usize, num_faces: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(num_vertices),
            halfedges: Vec::with_capacity(num_faces * 3 + num_faces / 2),
            faces: Vec::with_capacity(num_faces + 1),
            ..Self::default()
        }
    }

    // ==================== Accessors ====================

    /// Number of live vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.live_vertices
    }

    /// Number of live half-edges.
    #[inline]
    pub fn num_halfedges(&self) -> usize {
        self.live_halfedges
    }

    /// Number of live faces of every kind.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.live_faces
    }

    /// Number of live interior triangles.
    pub fn num_triangles(&self) -> usize {
        self.interior_faces().count()
    }

    /// Size of the vertex arena, tombstones included.
    ///
    /// Side tables indexed by [`VertexId::index`] should have this length.
    #[inline]
    pub fn vertex_capacity(&self) -> usize {
        self.vertices.len()
    }

    /// Size of the half-edge arena, tombstones included.
    #[inline]
    pub fn halfedge_capacity(&self) -> usize {
        self.halfedges.len()
    }

    /// Size of the face arena, tombstones included.
    #[inline]
    pub fn face_capacity(&self) -> usize {
        self.faces.len()
    }

    /// Get a vertex by ID.
    #[inline]
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.index()]
    }

    /// Get a mutable vertex by ID.
    #[inline]
    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id.index()]
    }

    /// Get a half-edge by ID.
    #[inline]
    pub fn halfedge(&self, id: HalfEdgeId) -> &HalfEdge {
        &self.halfedges[id.index()]
    }

    #[inline]
    pub(crate) fn halfedge_mut(&mut self, id: HalfEdgeId) -> &mut HalfEdge {
        &mut self.halfedges[id.index()]
    }

    /// Get a face by ID.
    #[inline]
    pub fn face(&self, id: FaceId) -> &Face {
        &self.faces[id.index()]
    }

    #[inline]
    pub(crate) fn face_mut(&mut self, id: FaceId) -> &mut Face {
        &mut self.faces[id.index()]
    }

    /// Get the position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> &Point2<f64> {
        &self.vertex(v).position
    }

    /// Set the position of a vertex. Topology is not checked.
    #[inline]
    pub fn set_position(&mut self, v: VertexId, pos: Point2<f64>) {
        self.vertex_mut(v).position = pos;
    }

    /// Whether the vertex is still alive.
    #[inline]
    pub fn is_vertex_alive(&self, v: VertexId) -> bool {
        v.is_valid() && v.index() < self.vertices.len() && !self.vertex(v).removed
    }

    /// Whether the half-edge is still alive.
    #[inline]
    pub fn is_halfedge_alive(&self, he: HalfEdgeId) -> bool {
        he.is_valid() && he.index() < self.halfedges.len() && !self.halfedge(he).removed
    }

    /// Whether the face is still alive.
    #[inline]
    pub fn is_face_alive(&self, f: FaceId) -> bool {
        f.is_valid() && f.index() < self.faces.len() && !self.face(f).removed
    }

    // ==================== Topology Queries ====================

    /// Get the twin (opposite) half-edge.
    #[inline]
    pub fn twin(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.halfedge(he).twin
    }

    /// Get the next half-edge around the face.
    #[inline]
    pub fn next(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.halfedge(he).next
    }

    /// Get the previous half-edge around the face.
    #[inline]
    pub fn prev(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.halfedge(he).prev
    }

    /// Get the origin vertex of a half-edge.
    #[inline]
    pub fn origin(&self, he: HalfEdgeId) -> VertexId {
        self.halfedge(he).origin
    }

    /// Get the destination vertex of a half-edge.
    #[inline]
    pub fn dest(&self, he: HalfEdgeId) -> VertexId {
        self.origin(self.twin(he))
    }

    /// Get the face of a half-edge.
    #[inline]
    pub fn face_of(&self, he: HalfEdgeId) -> FaceId {
        self.halfedge(he).face
    }

    /// Kind of a face.
    #[inline]
    pub fn face_kind(&self, f: FaceId) -> FaceKind {
        self.face(f).kind
    }

    /// Whether the face is a live interior triangle.
    #[inline]
    pub fn is_interior_face(&self, f: FaceId) -> bool {
        self.is_face_alive(f) && self.face(f).kind == FaceKind::Interior
    }

    /// Whether the half-edge belongs to a boundary or hole face.
    #[inline]
    pub fn is_boundary_halfedge(&self, he: HalfEdgeId) -> bool {
        self.face_kind(self.face_of(he)) != FaceKind::Interior
    }

    /// Whether either side of the edge is a boundary or hole face.
    #[inline]
    pub fn is_boundary_edge(&self, he: HalfEdgeId) -> bool {
        self.is_boundary_halfedge(he) || self.is_boundary_halfedge(self.twin(he))
    }

    /// Whether the edge is part of an input segment.
    #[inline]
    pub fn is_constrained(&self, he: HalfEdgeId) -> bool {
        self.halfedge(he).constrained
    }

    /// Mark or unmark both halves of an edge as constrained.
    pub fn set_constrained(&mut self, he: HalfEdgeId, constrained: bool) {
        let twin = self.twin(he);
        self.halfedge_mut(he).constrained = constrained;
        self.halfedge_mut(twin).constrained = constrained;
    }

    /// Whether a vertex lies on the outer border or on a hole.
    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        let start = self.vertex(v).halfedge;
        if !start.is_valid() {
            return true;
        }
        if self.is_boundary_halfedge(start) {
            return true;
        }
        self.vertex_halfedges(v).any(|he| self.is_boundary_halfedge(he))
    }

    /// The vertex opposite `he` in its (triangular) face.
    #[inline]
    pub fn opposite_vertex(&self, he: HalfEdgeId) -> VertexId {
        self.origin(self.prev(he))
    }

    /// The half-edge from `a` to `b`, if the two vertices are adjacent.
    pub fn halfedge_between(&self, a: VertexId, b: VertexId) -> Option<HalfEdgeId> {
        self.vertex_halfedges(a).find(|&he| self.dest(he) == b)
    }

    /// Number of half-edges in a face's cycle.
    pub fn face_degree(&self, f: FaceId) -> usize {
        self.face_halfedges(f).count()
    }

    // ==================== Iteration ====================

    /// Iterate over live vertex IDs.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.removed)
            .map(|(i, _)| VertexId::new(i))
    }

    /// Iterate over live vertices with their IDs.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.removed)
            .map(|(i, v)| (VertexId::new(i), v))
    }

    /// Iterate over live half-edge IDs.
    pub fn halfedge_ids(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.halfedges
            .iter()
            .enumerate()
            .filter(|(_, he)| !he.removed)
            .map(|(i, _)| HalfEdgeId::new(i))
    }

    /// Iterate over live edges, one half-edge per edge.
    pub fn edges(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.halfedge_ids().filter(move |&he| he < self.twin(he))
    }

    /// Iterate over live face IDs of every kind.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.removed)
            .map(|(i, _)| FaceId::new(i))
    }

    /// Iterate over live interior triangles.
    pub fn interior_faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.removed && f.kind == FaceKind::Interior)
            .map(|(i, _)| FaceId::new(i))
    }

    /// Iterate over live hole faces.
    pub fn hole_faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.face_ids()
            .filter(move |&f| self.face_kind(f) == FaceKind::Hole)
    }

    /// Iterate over live boundary faces.
    pub fn boundary_faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.face_ids()
            .filter(move |&f| self.face_kind(f) == FaceKind::Boundary)
    }

    /// Iterate over outgoing half-edges around a vertex.
    pub fn vertex_halfedges(&self, v: VertexId) -> VertexHalfEdgeIter<'_> {
        VertexHalfEdgeIter::new(self, v)
    }

    /// Iterate over vertices adjacent to a vertex.
    pub fn vertex_neighbors(&self, v: VertexId) -> impl Iterator<Item = VertexId> + Clone + '_ {
        self.vertex_halfedges(v).map(move |he| self.dest(he))
    }

    /// Iterate over interior faces around a vertex.
    pub fn vertex_faces(&self, v: VertexId) -> impl Iterator<Item = FaceId> + Clone + '_ {
        self.vertex_halfedges(v)
            .map(move |he| self.face_of(he))
            .filter(move |&f| self.face_kind(f) == FaceKind::Interior)
    }

    /// Iterate over half-edges around a face.
    pub fn face_halfedges(&self, f: FaceId) -> FaceHalfEdgeIter<'_> {
        FaceHalfEdgeIter::new(self, f)
    }

    /// Iterate over vertices of a face.
    pub fn face_vertices(&self, f: FaceId) -> impl Iterator<Item = VertexId> + Clone + '_ {
        self.face_halfedges(f).map(move |he| self.origin(he))
    }

    /// Get the three vertices of a triangular face.
    pub fn face_triangle(&self, f: FaceId) -> [VertexId; 3] {
        let he0 = self.face(f).halfedge;
        let he1 = self.next(he0);
        let he2 = self.next(he1);
        [self.origin(he0), self.origin(he1), self.origin(he2)]
    }

    /// Get the positions of the three vertices of a triangular face.
    pub fn face_positions(&self, f: FaceId) -> [Point2<f64>; 3] {
        let [v0, v1, v2] = self.face_triangle(f);
        [*self.position(v0), *self.position(v1), *self.position(v2)]
    }

    // ==================== Geometry ====================

    /// Signed area of a triangular face (positive when CCW).
    pub fn face_area(&self, f: FaceId) -> f64 {
        let [a, b, c] = self.face_positions(f);
        predicates::triangle_area(&a, &b, &c)
    }

    /// Centroid of a triangular face.
    pub fn face_centroid(&self, f: FaceId) -> Point2<f64> {
        let [p0, p1, p2] = self.face_positions(f);
        Point2::from((p0.coords + p1.coords + p2.coords) / 3.0)
    }

    /// Quality of a triangular face (1 for equilateral).
    pub fn face_quality(&self, f: FaceId) -> f64 {
        let [a, b, c] = self.face_positions(f);
        predicates::triangle_quality(&a, &b, &c)
    }

    /// Smallest angle of a triangular face in radians.
    pub fn face_min_angle(&self, f: FaceId) -> f64 {
        let [a, b, c] = self.face_positions(f);
        predicates::min_angle(&a, &b, &c)
    }

    /// Circumcenter of a triangular face.
    pub fn face_circumcenter(&self, f: FaceId) -> Option<Point2<f64>> {
        let [a, b, c] = self.face_positions(f);
        predicates::circumcenter(&a, &b, &c)
    }

    /// Whether `p` lies inside or on a triangular face.
    pub fn face_contains(&self, f: FaceId, p: &Point2<f64>) -> bool {
        let [a, b, c] = self.face_positions(f);
        predicates::orient2d(&a, &b, p) >= 0.0
            && predicates::orient2d(&b, &c, p) >= 0.0
            && predicates::orient2d(&c, &a, p) >= 0.0
    }

    /// Compute the length of an edge.
    pub fn edge_length(&self, he: HalfEdgeId) -> f64 {
        self.edge_vector(he).norm()
    }

    /// Compute the edge vector (from origin to destination).
    pub fn edge_vector(&self, he: HalfEdgeId) -> Vector2<f64> {
        self.position(self.dest(he)) - self.position(self.origin(he))
    }

    /// Compute the midpoint of an edge.
    pub fn edge_midpoint(&self, he: HalfEdgeId) -> Point2<f64> {
        predicates::midpoint(self.position(self.origin(he)), self.position(self.dest(he)))
    }

    /// Number of edges incident to a vertex.
    pub fn valence(&self, v: VertexId) -> usize {
        self.vertex_halfedges(v).count()
    }

    /// Bounding rectangle of all live vertices.
    pub fn bounding_box(&self) -> Option<Rect> {
        let mut iter = self.vertices().map(|(_, v)| v.position);
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(mut min, mut max), p| {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            (min, max)
        });
        Some(Rect { min, max })
    }

    /// Total area of all interior triangles.
    pub fn interior_area(&self) -> f64 {
        self.interior_faces().map(|f| self.face_area(f)).sum()
    }

    /// Interior faces with non-positive area.
    pub fn inverted_faces(&self) -> Vec<FaceId> {
        self.interior_faces()
            .filter(|&f| self.face_area(f) <= 0.0)
            .collect()
    }

    // ==================== Construction ====================

    /// Add a new unconnected vertex and return its ID.
    pub fn add_vertex(&mut self, position: Point2<f64>) -> VertexId {
        let id = VertexId::new(self.vertices.len());
        self.vertices.push(Vertex::new(position));
        self.live_vertices += 1;
        id
    }

    pub(crate) fn alloc_halfedge(&mut self) -> HalfEdgeId {
        let id = HalfEdgeId::new(self.halfedges.len());
        self.halfedges.push(HalfEdge::new());
        self.live_halfedges += 1;
        id
    }

    pub(crate) fn alloc_face(&mut self, halfedge: HalfEdgeId, kind: FaceKind) -> FaceId {
        let id = FaceId::new(self.faces.len());
        self.faces.push(Face::new(halfedge, kind));
        self.live_faces += 1;
        id
    }

    pub(crate) fn destroy_vertex(&mut self, v: VertexId) {
        let vertex = self.vertex_mut(v);
        if !vertex.removed {
            vertex.removed = true;
            vertex.halfedge = HalfEdgeId::invalid();
            self.live_vertices -= 1;
        }
    }

    pub(crate) fn destroy_halfedge(&mut self, he: HalfEdgeId) {
        let halfedge = self.halfedge_mut(he);
        if !halfedge.removed {
            halfedge.removed = true;
            self.live_halfedges -= 1;
        }
    }

    pub(crate) fn destroy_face(&mut self, f: FaceId) {
        let face = self.face_mut(f);
        if !face.removed {
            face.removed = true;
            self.live_faces -= 1;
        }
    }

    /// Link `a -> b` inside a face cycle.
    #[inline]
    pub(crate) fn link(&mut self, a: HalfEdgeId, b: HalfEdgeId) {
        self.halfedge_mut(a).next = b;
        self.halfedge_mut(b).prev = a;
    }

    /// Make `a` and `b` twins.
    #[inline]
    pub(crate) fn pair(&mut self, a: HalfEdgeId, b: HalfEdgeId) {
        self.halfedge_mut(a).twin = b;
        self.halfedge_mut(b).twin = a;
    }

    // ==================== Validation ====================

    /// Check every topological invariant and report the first violation.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let fail = |msg: String| Err(GeometryError::InvalidTopology(msg));

        for (vid, v) in self.vertices() {
            if !self.is_halfedge_alive(v.halfedge) {
                return fail(format!("vertex {:?} has no live half-edge", vid));
            }
            if self.origin(v.halfedge) != vid {
                return fail(format!(
                    "vertex {:?} points at {:?} which starts elsewhere",
                    vid, v.halfedge
                ));
            }
        }

        for heid in self.halfedge_ids() {
            let he = self.halfedge(heid);
            if !self.is_halfedge_alive(he.twin) {
                return fail(format!("{:?} has no live twin", heid));
            }
            if self.twin(he.twin) != heid {
                return fail(format!("twin of twin of {:?} is not itself", heid));
            }
            if he.twin == heid {
                return fail(format!("{:?} is its own twin", heid));
            }
            if !self.is_halfedge_alive(he.next) || !self.is_halfedge_alive(he.prev) {
                return fail(format!("{:?} has dangling next/prev", heid));
            }
            if self.prev(he.next) != heid || self.next(he.prev) != heid {
                return fail(format!("next/prev of {:?} are inconsistent", heid));
            }
            if !self.is_vertex_alive(he.origin) {
                return fail(format!("{:?} starts at a dead vertex", heid));
            }
            if self.origin(he.next) != self.dest(heid) {
                return fail(format!("{:?} and its next do not share a vertex", heid));
            }
            if !self.is_face_alive(he.face) {
                return fail(format!("{:?} belongs to a dead face", heid));
            }
            if self.face_of(he.next) != he.face {
                return fail(format!("{:?} and its next lie in different faces", heid));
            }
            if he.constrained != self.halfedge(he.twin).constrained {
                return fail(format!("{:?} and its twin disagree on constraint", heid));
            }
        }

        for fid in self.face_ids() {
            let face = self.face(fid);
            if !self.is_halfedge_alive(face.halfedge) || self.face_of(face.halfedge) != fid {
                return fail(format!("face {:?} points at a foreign half-edge", fid));
            }
            let mut degree = 0;
            let mut he = face.halfedge;
            loop {
                degree += 1;
                he = self.next(he);
                if he == face.halfedge {
                    break;
                }
                if degree > self.live_halfedges {
                    return fail(format!("face {:?} cycle does not close", fid));
                }
            }
            if face.kind == FaceKind::Interior && degree != 3 {
                return fail(format!("interior face {:?} has degree {}", fid, degree));
            }
        }

        Ok(())
    }

    /// Returns `true` if [`validate`](Self::validate) succeeds.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Iterator over outgoing half-edges around a vertex.
///
/// Restartable by cloning; reflects the topology at the time of each step.
#[derive(Clone)]
pub struct VertexHalfEdgeIter<'a> {
    mesh: &'a PlanarMesh,
    start: HalfEdgeId,
    current: HalfEdgeId,
    done: bool,
}

impl<'a> VertexHalfEdgeIter<'a> {
    fn new(mesh: &'a PlanarMesh, v: VertexId) -> Self {
        let start = mesh.vertex(v).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl Iterator for VertexHalfEdgeIter<'_> {
    type Item = HalfEdgeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;

        // If he goes v -> w, twin(he) goes w -> v and next(twin(he)) leaves v again.
        self.current = self.mesh.next(self.mesh.twin(self.current));

        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

/// Iterator over half-edges around a face.
#[derive(Clone)]
pub struct FaceHalfEdgeIter<'a> {
    mesh: &'a PlanarMesh,
    start: HalfEdgeId,
    current: HalfEdgeId,
    done: bool,
}

impl<'a> FaceHalfEdgeIter<'a> {
    fn new(mesh: &'a PlanarMesh, f: FaceId) -> Self {
        let start = mesh.face(f).halfedge;
        Self {
            mesh,
            start,
            current: start,
            done: !start.is_valid(),
        }
    }
}

impl Iterator for FaceHalfEdgeIter<'_> {
    type Item = HalfEdgeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;
        self.current = self.mesh.next(self.current);

        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

//! Topological mutation of a [`PlanarMesh`].
//!
//! All operations keep the half-edge invariants intact: every live half-edge
//! has a live twin, face cycles close, and interior faces are triangles.
//! Geometrically invalid requests are rejected before anything is modified.

use std::collections::{HashSet, VecDeque};

use nalgebra::Point2;

use super::builder::cycle_signed_area;
use super::halfedge::{FaceKind, PlanarMesh};
use super::index::{FaceId, HalfEdgeId, VertexId};
use crate::error::GeometryError;
use crate::geometry::predicates::{orient2d, orient2d_sign};

/// Relative distance below which a point is considered to coincide with a vertex.
const COINCIDENCE_TOLERANCE: f64 = 1e-10;

/// Old-to-new id mapping produced by [`PlanarMesh::compact`].
///
/// Entries for removed elements are invalid ids.
#[derive(Debug, Clone, Default)]
pub struct CompactMap {
    /// New id of each old vertex.
    pub vertices: Vec<VertexId>,
    /// New id of each old half-edge.
    pub halfedges: Vec<HalfEdgeId>,
    /// New id of each old face.
    pub faces: Vec<FaceId>,
}

impl CompactMap {
    /// New id for an old vertex id.
    pub fn vertex(&self, v: VertexId) -> VertexId {
        self.vertices.get(v.index()).copied().unwrap_or_default()
    }

    /// New id for an old half-edge id.
    pub fn halfedge(&self, he: HalfEdgeId) -> HalfEdgeId {
        self.halfedges.get(he.index()).copied().unwrap_or_default()
    }

    /// New id for an old face id.
    pub fn face(&self, f: FaceId) -> FaceId {
        self.faces.get(f.index()).copied().unwrap_or_default()
    }
}

impl PlanarMesh {
    fn check_halfedge(&self, he: HalfEdgeId) -> Result<(), GeometryError> {
        if self.is_halfedge_alive(he) {
            Ok(())
        } else {
            Err(GeometryError::Destroyed(format!("{:?}", he)))
        }
    }

    fn check_triangle(&self, f: FaceId) -> Result<(), GeometryError> {
        if !self.is_face_alive(f) {
            return Err(GeometryError::Destroyed(format!("{:?}", f)));
        }
        if self.face_kind(f) != FaceKind::Interior {
            return Err(GeometryError::NotATriangle { face: f });
        }
        Ok(())
    }

    fn check_positive(&self, face: FaceId, a: VertexId, b: &Point2<f64>, c: VertexId) -> Result<(), GeometryError> {
        let area = 0.5 * orient2d(self.position(a), b, self.position(c));
        if area > 0.0 {
            Ok(())
        } else {
            Err(GeometryError::DegenerateFace { face, area })
        }
    }

    /// Split the edge of `he` at `point`, splitting the (up to two) adjacent
    /// triangles. Border faces simply gain a vertex.
    ///
    /// Returns the two halves on `he`'s side: `origin -> new` and
    /// `new -> dest`. A constrained edge stays constrained in both halves.
    ///
    /// # Errors
    /// Zero-length edges, points coinciding with an endpoint, and points that
    /// would invert a triangle are rejected without modifying the mesh.
    pub fn split_edge(
        &mut self,
        he: HalfEdgeId,
        point: Point2<f64>,
    ) -> Result<(HalfEdgeId, HalfEdgeId), GeometryError> {
        self.check_halfedge(he)?;

        let twin = self.twin(he);
        let a = self.origin(he);
        let b = self.origin(twin);
        let length = self.edge_length(he);
        if length <= f64::EPSILON * self.position(a).coords.norm().max(1.0) {
            return Err(GeometryError::DegenerateEdge { edge: he, length });
        }
        for v in [a, b] {
            if (self.position(v) - point).norm() <= COINCIDENCE_TOLERANCE * length {
                return Err(GeometryError::CoincidentPoint {
                    x: point.x,
                    y: point.y,
                    vertex: v,
                });
            }
        }

        let f = self.face_of(he);
        let g = self.face_of(twin);
        let f_interior = self.face_kind(f) == FaceKind::Interior;
        let g_interior = self.face_kind(g) == FaceKind::Interior;
        if f_interior {
            let c = self.opposite_vertex(he);
            self.check_positive(f, a, &point, c)?;
            self.check_positive(f, c, &point, b)?;
        }
        if g_interior {
            let d = self.opposite_vertex(twin);
            self.check_positive(g, b, &point, d)?;
            self.check_positive(g, d, &point, a)?;
        }

        let constrained = self.is_constrained(he);
        let m = self.add_vertex(point);
        let he_next = self.next(he);
        let twin_next = self.next(twin);

        // he: a -> m, e2: m -> b, twin: b -> m, t2: m -> a
        let e2 = self.alloc_halfedge();
        let t2 = self.alloc_halfedge();
        {
            let h = self.halfedge_mut(e2);
            h.origin = m;
            h.face = f;
            h.constrained = constrained;
        }
        {
            let h = self.halfedge_mut(t2);
            h.origin = m;
            h.face = g;
            h.constrained = constrained;
        }
        self.pair(he, t2);
        self.pair(twin, e2);
        self.link(he, e2);
        self.link(e2, he_next);
        self.link(twin, t2);
        self.link(t2, twin_next);
        self.vertex_mut(m).halfedge = e2;

        if f_interior {
            // Cycle he, e2, n, nn  ->  (a, m, c) and (m, b, c)
            let n = he_next;
            let nn = self.next(n);
            let c = self.origin(nn);
            let to_c = self.alloc_halfedge();
            let from_c = self.alloc_halfedge();
            self.halfedge_mut(to_c).origin = m;
            self.halfedge_mut(from_c).origin = c;
            self.pair(to_c, from_c);

            let f2 = self.alloc_face(e2, FaceKind::Interior);
            self.link(he, to_c);
            self.link(to_c, nn);
            self.halfedge_mut(to_c).face = f;
            self.link(e2, n);
            self.link(n, from_c);
            self.link(from_c, e2);
            for h in [e2, n, from_c] {
                self.halfedge_mut(h).face = f2;
            }
        }
        self.face_mut(f).halfedge = he;

        if g_interior {
            // Cycle twin, t2, tn, tnn  ->  (b, m, d) and (m, a, d)
            let tn = twin_next;
            let tnn = self.next(tn);
            let d = self.origin(tnn);
            let to_d = self.alloc_halfedge();
            let from_d = self.alloc_halfedge();
            self.halfedge_mut(to_d).origin = m;
            self.halfedge_mut(from_d).origin = d;
            self.pair(to_d, from_d);

            let g2 = self.alloc_face(t2, FaceKind::Interior);
            self.link(twin, to_d);
            self.link(to_d, tnn);
            self.halfedge_mut(to_d).face = g;
            self.link(t2, tn);
            self.link(tn, from_d);
            self.link(from_d, t2);
            for h in [t2, tn, from_d] {
                self.halfedge_mut(h).face = g2;
            }
        } else if f_interior {
            self.vertex_mut(m).halfedge = t2;
        }
        self.face_mut(g).halfedge = twin;

        Ok((he, e2))
    }

    /// Split an interior triangle into three at `point`.
    ///
    /// # Errors
    /// The point must lie strictly inside the triangle.
    pub fn split_triangle(&mut self, face: FaceId, point: Point2<f64>) -> Result<VertexId, GeometryError> {
        self.check_triangle(face)?;

        let h0 = self.face(face).halfedge;
        let hs = [h0, self.next(h0), self.next(self.next(h0))];
        let vs = hs.map(|h| self.origin(h));
        for i in 0..3 {
            let area = 0.5 * orient2d(self.position(vs[i]), self.position(vs[(i + 1) % 3]), &point);
            if area <= 0.0 {
                return Err(GeometryError::DegenerateFace { face, area });
            }
        }

        let m = self.add_vertex(point);
        // Triangle i: hs[i] (v_i -> v_{i+1}), inward[i] (v_{i+1} -> m), outward[i] (m -> v_i)
        let inward: [HalfEdgeId; 3] = [(); 3].map(|_| self.alloc_halfedge());
        let outward: [HalfEdgeId; 3] = [(); 3].map(|_| self.alloc_halfedge());
        let faces = [
            face,
            self.alloc_face(hs[1], FaceKind::Interior),
            self.alloc_face(hs[2], FaceKind::Interior),
        ];

        for i in 0..3 {
            let j = (i + 1) % 3;
            self.halfedge_mut(inward[i]).origin = vs[j];
            self.halfedge_mut(outward[i]).origin = m;
            self.pair(inward[i], outward[j]);
            self.link(hs[i], inward[i]);
            self.link(inward[i], outward[i]);
            self.link(outward[i], hs[i]);
            for h in [hs[i], inward[i], outward[i]] {
                self.halfedge_mut(h).face = faces[i];
            }
            self.face_mut(faces[i]).halfedge = hs[i];
        }
        self.vertex_mut(m).halfedge = outward[0];

        Ok(m)
    }

    /// Whether the edge of `he` can be flipped.
    pub fn is_flippable(&self, he: HalfEdgeId) -> bool {
        self.flip_check(he).is_ok()
    }

    fn flip_check(&self, he: HalfEdgeId) -> Result<(), GeometryError> {
        self.check_halfedge(he)?;
        let not_flippable = |reason| Err(GeometryError::NotFlippable { edge: he, reason });
        if self.is_constrained(he) {
            return not_flippable("edge is constrained");
        }
        let twin = self.twin(he);
        if self.face_kind(self.face_of(he)) != FaceKind::Interior
            || self.face_kind(self.face_of(twin)) != FaceKind::Interior
        {
            return not_flippable("edge lies on the border");
        }
        let a = self.position(self.origin(he));
        let b = self.position(self.origin(twin));
        let c = self.position(self.opposite_vertex(he));
        let d = self.position(self.opposite_vertex(twin));
        if self.opposite_vertex(he) == self.opposite_vertex(twin) {
            return not_flippable("adjacent triangles share all vertices");
        }
        if orient2d_sign(c, a, d) <= 0 || orient2d_sign(d, b, c) <= 0 {
            return not_flippable("quadrilateral is not strictly convex");
        }
        Ok(())
    }

    /// Swap the diagonal of the two triangles sharing `he`'s edge.
    ///
    /// After the flip `he` runs from the vertex opposite its twin to the
    /// vertex that was opposite `he`.
    ///
    /// # Errors
    /// Constrained edges, border edges and edges whose quadrilateral is not
    /// strictly convex cannot be flipped.
    pub fn flip_edge(&mut self, he: HalfEdgeId) -> Result<(), GeometryError> {
        self.flip_check(he)?;

        let twin = self.twin(he);
        let f = self.face_of(he);
        let g = self.face_of(twin);

        // f: he (a -> b), f1 (b -> c), f2 (c -> a)
        // g: twin (b -> a), g1 (a -> d), g2 (d -> b)
        let f1 = self.next(he);
        let f2 = self.next(f1);
        let g1 = self.next(twin);
        let g2 = self.next(g1);
        let a = self.origin(he);
        let b = self.origin(twin);
        let c = self.origin(f2);
        let d = self.origin(g2);

        // f: he (d -> c), f2 (c -> a), g1 (a -> d)
        // g: twin (c -> d), g2 (d -> b), f1 (b -> c)
        self.halfedge_mut(he).origin = d;
        self.halfedge_mut(twin).origin = c;

        self.link(he, f2);
        self.link(f2, g1);
        self.link(g1, he);
        self.link(twin, g2);
        self.link(g2, f1);
        self.link(f1, twin);

        self.halfedge_mut(g1).face = f;
        self.halfedge_mut(f1).face = g;
        self.face_mut(f).halfedge = he;
        self.face_mut(g).halfedge = twin;

        if self.vertex(a).halfedge == he {
            self.vertex_mut(a).halfedge = g1;
        }
        if self.vertex(b).halfedge == twin {
            self.vertex_mut(b).halfedge = f1;
        }

        Ok(())
    }

    /// Flood-fill interior faces satisfying `predicate` starting at `face`
    /// and merge them into hole faces, one per resulting border cycle.
    ///
    /// Returns the new hole (or boundary, if the region reached the outer
    /// border) faces. Nothing happens if `face` fails the predicate.
    pub fn create_hole<P>(&mut self, face: FaceId, mut predicate: P) -> Result<Vec<FaceId>, GeometryError>
    where
        P: FnMut(&PlanarMesh, FaceId) -> bool,
    {
        self.check_triangle(face)?;
        if !predicate(self, face) {
            return Ok(Vec::new());
        }

        let mut region = HashSet::from([face]);
        let mut queue = VecDeque::from([face]);
        while let Some(f) = queue.pop_front() {
            for he in self.face_halfedges(f).collect::<Vec<_>>() {
                let neighbor = self.face_of(self.twin(he));
                if self.face_kind(neighbor) == FaceKind::Interior
                    && !region.contains(&neighbor)
                    && predicate(self, neighbor)
                {
                    region.insert(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }

        Ok(self.merge_faces(&region))
    }

    /// Repeatedly merge interior faces that touch the outer boundary and
    /// satisfy `predicate` into the boundary face.
    ///
    /// Returns the number of triangles removed.
    pub fn remove_boundary_faces<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&PlanarMesh, FaceId) -> bool,
    {
        let mut rejected: HashSet<FaceId> = HashSet::new();
        let mut removed = 0;
        loop {
            let mut batch = HashSet::new();
            for f in self.interior_faces().collect::<Vec<_>>() {
                if rejected.contains(&f) {
                    continue;
                }
                let on_boundary = self
                    .face_halfedges(f)
                    .any(|he| self.face_kind(self.face_of(self.twin(he))) == FaceKind::Boundary);
                if !on_boundary {
                    continue;
                }
                if predicate(self, f) {
                    batch.insert(f);
                } else {
                    rejected.insert(f);
                }
            }
            if batch.is_empty() {
                break;
            }
            removed += batch.len();
            self.merge_faces(&batch);
        }
        removed
    }

    /// Merge a set of interior faces, together with every border face they
    /// touch along an edge, into new border faces.
    ///
    /// Half-edges with both sides inside the merged set are destroyed, as are
    /// vertices left without edges. Cycles running clockwise become
    /// [`FaceKind::Boundary`]; counter-clockwise ones become [`FaceKind::Hole`].
    pub(crate) fn merge_faces(&mut self, interior: &HashSet<FaceId>) -> Vec<FaceId> {
        if interior.is_empty() {
            return Vec::new();
        }

        let mut merged: HashSet<FaceId> = interior.clone();
        for &f in interior {
            for he in self.face_halfedges(f) {
                let other = self.face_of(self.twin(he));
                if self.face_kind(other) != FaceKind::Interior {
                    merged.insert(other);
                }
            }
        }

        let mut inside: Vec<HalfEdgeId> = Vec::new();
        for &f in &merged {
            inside.extend(self.face_halfedges(f));
        }
        let destroyed: HashSet<HalfEdgeId> = inside
            .iter()
            .copied()
            .filter(|&he| merged.contains(&self.face_of(self.twin(he))))
            .collect();
        let kept: Vec<HalfEdgeId> = inside
            .iter()
            .copied()
            .filter(|he| !destroyed.contains(he))
            .collect();

        // Successor of each kept half-edge: rotate around its destination
        // past destroyed half-edges.
        let successors: Vec<(HalfEdgeId, HalfEdgeId)> = kept
            .iter()
            .map(|&he| {
                let mut cand = self.next(he);
                while destroyed.contains(&cand) {
                    cand = self.next(self.twin(cand));
                }
                (he, cand)
            })
            .collect();

        let mut touched: HashSet<VertexId> = HashSet::new();
        for &he in &destroyed {
            touched.insert(self.origin(he));
            self.destroy_halfedge(he);
        }
        for &f in &merged {
            self.destroy_face(f);
        }
        for &(he, succ) in &successors {
            self.link(he, succ);
            self.halfedge_mut(he).face = FaceId::invalid();
        }

        let mut new_faces = Vec::new();
        for &start in &kept {
            if self.face_of(start).is_valid() {
                continue;
            }
            let mut cycle = vec![start];
            let mut he = self.next(start);
            while he != start {
                cycle.push(he);
                he = self.next(he);
            }
            let kind = if cycle_signed_area(self, &cycle) < 0.0 {
                FaceKind::Boundary
            } else {
                FaceKind::Hole
            };
            let face = self.alloc_face(start, kind);
            for he in cycle {
                self.halfedge_mut(he).face = face;
            }
            new_faces.push(face);
        }

        let mut on_border: HashSet<VertexId> = HashSet::new();
        for &he in &kept {
            let v = self.origin(he);
            self.vertex_mut(v).halfedge = he;
            on_border.insert(v);
        }
        for v in touched {
            if !on_border.contains(&v) {
                self.destroy_vertex(v);
            }
        }

        new_faces
    }

    /// Physically remove tombstoned elements and renumber the rest.
    ///
    /// Returns the old-to-new id mapping; every previously held id must be
    /// translated through it.
    pub fn compact(&mut self) -> CompactMap {
        let mut map = CompactMap {
            vertices: vec![VertexId::invalid(); self.vertices.len()],
            halfedges: vec![HalfEdgeId::invalid(); self.halfedges.len()],
            faces: vec![FaceId::invalid(); self.faces.len()],
        };

        let mut count = 0;
        for (i, v) in self.vertices.iter().enumerate() {
            if !v.removed {
                map.vertices[i] = VertexId::new(count);
                count += 1;
            }
        }
        count = 0;
        for (i, he) in self.halfedges.iter().enumerate() {
            if !he.removed {
                map.halfedges[i] = HalfEdgeId::new(count);
                count += 1;
            }
        }
        count = 0;
        for (i, f) in self.faces.iter().enumerate() {
            if !f.removed {
                map.faces[i] = FaceId::new(count);
                count += 1;
            }
        }

        self.vertices.retain(|v| !v.removed);
        self.halfedges.retain(|he| !he.removed);
        self.faces.retain(|f| !f.removed);

        for v in &mut self.vertices {
            v.halfedge = map.halfedge(v.halfedge);
        }
        for he in &mut self.halfedges {
            he.origin = map.vertex(he.origin);
            he.twin = map.halfedge(he.twin);
            he.next = map.halfedge(he.next);
            he.prev = map.halfedge(he.prev);
            he.face = map.face(he.face);
        }
        for f in &mut self.faces {
            f.halfedge = map.halfedge(f.halfedge);
        }

        map
    }

    /// Live interior faces grouped by connected component across
    /// unconstrained edges, starting from `face`.
    pub fn flood_region(&self, face: FaceId, cross_constrained: bool) -> HashSet<FaceId> {
        let mut region = HashSet::new();
        if !self.is_interior_face(face) {
            return region;
        }
        region.insert(face);
        let mut queue = VecDeque::from([face]);
        while let Some(f) = queue.pop_front() {
            for he in self.face_halfedges(f) {
                if !cross_constrained && self.is_constrained(he) {
                    continue;
                }
                let neighbor = self.face_of(self.twin(he));
                if self.is_interior_face(neighbor) && region.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        region
    }

    /// Count of edges per vertex pair, used by tests to detect duplicates.
    #[cfg(test)]
    pub(crate) fn edge_multiset(&self) -> std::collections::HashMap<(VertexId, VertexId), usize> {
        let mut counts = std::collections::HashMap::new();
        for he in self.halfedge_ids() {
            *counts.entry((self.origin(he), self.dest(he))).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::mesh::build_from_triangles;

    fn unit_square() -> PlanarMesh {
        PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0))
    }

    fn diagonal(mesh: &PlanarMesh) -> HalfEdgeId {
        mesh.halfedge_ids()
            .find(|&he| !mesh.is_boundary_edge(he))
            .unwrap()
    }

    fn grid(n: usize) -> PlanarMesh {
        let mut points = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                points.push(Point2::new(i as f64, j as f64));
            }
        }
        let mut tris = Vec::new();
        for j in 0..n {
            for i in 0..n {
                let a = j * (n + 1) + i;
                tris.push([a, a + 1, a + n + 2]);
                tris.push([a, a + n + 2, a + n + 1]);
            }
        }
        build_from_triangles(&points, &tris).unwrap()
    }

    #[test]
    fn test_split_interior_edge() {
        let mut mesh = unit_square();
        let he = diagonal(&mesh);
        let (e1, e2) = mesh.split_edge(he, Point2::new(0.5, 0.5)).unwrap();

        assert!(mesh.is_valid());
        assert_eq!(mesh.num_triangles(), 4);
        assert_eq!(mesh.num_vertices(), 5);
        assert_eq!(mesh.dest(e1), mesh.origin(e2));
        let m = mesh.dest(e1);
        assert_eq!(mesh.valence(m), 4);
        assert!(!mesh.is_boundary_vertex(m));
        assert!(mesh.inverted_faces().is_empty());
        assert!((mesh.interior_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_split_boundary_edge() {
        let mut mesh = unit_square();
        let he = mesh
            .halfedge_ids()
            .find(|&he| {
                !mesh.is_boundary_halfedge(he)
                    && mesh.is_boundary_edge(he)
                    && mesh.edge_midpoint(he).y == 0.0
            })
            .unwrap();
        let (e1, _) = mesh.split_edge(he, Point2::new(0.5, 0.0)).unwrap();
        assert!(mesh.is_valid());
        assert_eq!(mesh.num_triangles(), 3);
        let m = mesh.dest(e1);
        assert!(mesh.is_boundary_vertex(m));
        assert!(mesh.is_boundary_halfedge(mesh.vertex(m).halfedge));
        let boundary = mesh.boundary_faces().next().unwrap();
        assert_eq!(mesh.face_degree(boundary), 5);
    }

    #[test]
    fn test_split_keeps_constraint() {
        let mut mesh = unit_square();
        let he = diagonal(&mesh);
        mesh.set_constrained(he, true);
        let (e1, e2) = mesh.split_edge(he, Point2::new(0.5, 0.5)).unwrap();
        assert!(mesh.is_constrained(e1) && mesh.is_constrained(e2));
        assert!(mesh.is_constrained(mesh.twin(e1)));
        assert_eq!(mesh.halfedge_ids().filter(|&h| mesh.is_constrained(h)).count(), 4);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_split_rejects_degenerate() {
        let mut mesh = unit_square();
        let he = diagonal(&mesh);
        let a = *mesh.position(mesh.origin(he));
        assert!(matches!(
            mesh.split_edge(he, a),
            Err(GeometryError::CoincidentPoint { .. })
        ));
        // Point far off the edge would invert a triangle
        assert!(matches!(
            mesh.split_edge(he, Point2::new(2.0, -1.0)),
            Err(GeometryError::DegenerateFace { .. })
        ));
        assert_eq!(mesh.num_vertices(), 4);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_split_triangle() {
        let mut mesh = unit_square();
        let f = mesh.interior_faces().next().unwrap();
        let c = mesh.face_centroid(f);
        let v = mesh.split_triangle(f, c).unwrap();
        assert!(mesh.is_valid());
        assert_eq!(mesh.num_triangles(), 4);
        assert_eq!(mesh.valence(v), 3);
        assert!(mesh.inverted_faces().is_empty());

        let f = mesh.interior_faces().next().unwrap();
        let [a, b, _] = mesh.face_positions(f);
        let on_edge = Point2::from((a.coords + b.coords) * 0.5);
        assert!(mesh.split_triangle(f, on_edge).is_err());
    }

    #[test]
    fn test_flip_edge() {
        let mut mesh = unit_square();
        let he = diagonal(&mesh);
        let before = (mesh.origin(he), mesh.dest(he));
        mesh.flip_edge(he).unwrap();
        assert!(mesh.is_valid());
        let after = (mesh.origin(he), mesh.dest(he));
        assert_ne!(before, after);
        assert!(mesh.inverted_faces().is_empty());
        // Flipping twice restores the diagonal endpoints
        mesh.flip_edge(he).unwrap();
        let again = (mesh.origin(he), mesh.dest(he));
        assert_eq!(again, (before.1, before.0));
    }

    #[test]
    fn test_flip_rejections() {
        let mut mesh = unit_square();
        let boundary = mesh
            .halfedge_ids()
            .find(|&he| mesh.is_boundary_edge(he))
            .unwrap();
        assert!(matches!(
            mesh.flip_edge(boundary),
            Err(GeometryError::NotFlippable { .. })
        ));

        let he = diagonal(&mesh);
        mesh.set_constrained(he, true);
        assert!(!mesh.is_flippable(he));

        // Non-convex quad: a dart shape
        let points = vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(1.0, 0.2),
            Point2::new(1.0, 2.0),
        ];
        let mut dart = build_from_triangles(&points, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        let inner = dart
            .halfedge_ids()
            .find(|&he| !dart.is_boundary_edge(he))
            .unwrap();
        assert!(dart.flip_edge(inner).is_err());
    }

    #[test]
    fn test_create_hole() {
        let mut mesh = grid(4);
        let start = mesh
            .interior_faces()
            .find(|&f| {
                let c = mesh.face_centroid(f);
                (c.x - 1.5).abs() < 0.5 && (c.y - 1.5).abs() < 0.5
            })
            .unwrap();
        let in_center = |m: &PlanarMesh, f: FaceId| {
            let c = m.face_centroid(f);
            c.x > 1.0 && c.x < 3.0 && c.y > 1.0 && c.y < 3.0
        };
        let holes = mesh.create_hole(start, in_center).unwrap();

        assert_eq!(holes.len(), 1);
        assert_eq!(mesh.face_kind(holes[0]), FaceKind::Hole);
        assert!(mesh.is_valid());
        assert_eq!(mesh.num_triangles(), 32 - 8);
        assert_eq!(mesh.face_degree(holes[0]), 8);
        // The center vertex (2, 2) is gone
        assert_eq!(mesh.num_vertices(), 24);
        assert!(mesh.edge_multiset().values().all(|&c| c == 1));
    }

    #[test]
    fn test_create_hole_touching_boundary_becomes_boundary() {
        let mut mesh = grid(2);
        let start = mesh
            .interior_faces()
            .find(|&f| mesh.face_centroid(f).x < 1.0 && mesh.face_centroid(f).y < 1.0)
            .unwrap();
        let faces = mesh
            .create_hole(start, |m, f| {
                let c = m.face_centroid(f);
                c.x < 1.0 && c.y < 1.0
            })
            .unwrap();
        assert!(mesh.is_valid());
        assert_eq!(faces.len(), 1);
        assert_eq!(mesh.face_kind(faces[0]), FaceKind::Boundary);
        assert_eq!(mesh.num_triangles(), 6);
        assert_eq!(mesh.hole_faces().count(), 0);
    }

    #[test]
    fn test_remove_boundary_faces() {
        let mut mesh = grid(4);
        let removed = mesh.remove_boundary_faces(|m, f| m.face_centroid(f).x > 3.0);
        assert_eq!(removed, 8);
        assert!(mesh.is_valid());
        assert_eq!(mesh.num_triangles(), 24);
        assert!((mesh.interior_area() - 12.0).abs() < 1e-12);
        assert_eq!(mesh.boundary_faces().count(), 1);

        // Propagates inward over several rounds
        let removed = mesh.remove_boundary_faces(|m, f| m.face_centroid(f).x > 1.0);
        assert_eq!(removed, 16);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_compact() {
        let mut mesh = grid(2);
        let start = mesh.interior_faces().next().unwrap();
        mesh.create_hole(start, |m, f| m.face_centroid(f).x < 1.0).unwrap();
        let live_vertices = mesh.num_vertices();
        let live_faces = mesh.num_faces();
        let area = mesh.interior_area();
        let tracked = mesh.vertex_ids().last().unwrap();
        let tracked_pos = *mesh.position(tracked);

        let map = mesh.compact();
        assert!(mesh.is_valid());
        assert_eq!(mesh.vertex_capacity(), live_vertices);
        assert_eq!(mesh.face_capacity(), live_faces);
        assert!((mesh.interior_area() - area).abs() < 1e-12);
        assert_eq!(*mesh.position(map.vertex(tracked)), tracked_pos);
    }

    #[test]
    fn test_flood_region_stops_at_constraints() {
        let mut mesh = unit_square();
        let he = diagonal(&mesh);
        let f = mesh.face_of(he);
        assert_eq!(mesh.flood_region(f, false).len(), 2);
        mesh.set_constrained(he, true);
        assert_eq!(mesh.flood_region(f, false).len(), 1);
        assert_eq!(mesh.flood_region(f, true).len(), 2);
    }
}

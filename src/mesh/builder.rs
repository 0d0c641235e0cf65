//! Mesh construction utilities.
//!
//! Builds a [`PlanarMesh`] from a triangle list (the usual render/export
//! representation) and converts back. Border cycles become
//! [`FaceKind::Boundary`] faces when they run clockwise and
//! [`FaceKind::Hole`] faces when they run counter-clockwise.

use std::collections::{HashMap, HashSet};

use nalgebra::Point2;

use super::halfedge::{FaceKind, PlanarMesh};
use super::index::{HalfEdgeId, VertexId};
use crate::error::GeometryError;
use crate::geometry::{orient2d, Rect};

/// Build a planar mesh from vertices and triangles.
///
/// Triangles may be given in either winding; clockwise ones are reversed.
///
/// # Errors
/// Out-of-range indices, repeated vertices within a triangle, zero-area
/// triangles and edges shared by more than two triangles are rejected.
///
/// # Example
/// ```
/// use eikmesh::mesh::build_from_triangles;
/// use nalgebra::Point2;
///
/// let points = vec![
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(0.5, 1.0),
/// ];
/// let mesh = build_from_triangles(&points, &[[0, 1, 2]]).unwrap();
/// assert_eq!(mesh.num_vertices(), 3);
/// assert_eq!(mesh.num_triangles(), 1);
/// ```
pub fn build_from_triangles(
    points: &[Point2<f64>],
    triangles: &[[usize; 3]],
) -> Result<PlanarMesh, GeometryError> {
    if triangles.is_empty() {
        return Err(GeometryError::InvalidTopology("no triangles".into()));
    }

    let mut oriented = Vec::with_capacity(triangles.len());
    let mut directed: HashSet<(usize, usize)> = HashSet::with_capacity(triangles.len() * 3);

    for (ti, tri) in triangles.iter().enumerate() {
        if let Some(&vi) = tri.iter().find(|&&vi| vi >= points.len()) {
            return Err(GeometryError::InvalidTopology(format!(
                "triangle {} references vertex {} of {}",
                ti,
                vi,
                points.len()
            )));
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(GeometryError::InvalidTopology(format!(
                "triangle {} repeats a vertex",
                ti
            )));
        }
        let area = orient2d(&points[tri[0]], &points[tri[1]], &points[tri[2]]);
        if area == 0.0 || !area.is_finite() {
            return Err(GeometryError::DegenerateFace {
                face: ti.into(),
                area: area * 0.5,
            });
        }
        let tri = if area < 0.0 {
            [tri[0], tri[2], tri[1]]
        } else {
            *tri
        };
        for k in 0..3 {
            if !directed.insert((tri[k], tri[(k + 1) % 3])) {
                return Err(GeometryError::InvalidTopology(format!(
                    "edge ({}, {}) is shared by more than two triangles",
                    tri[k],
                    tri[(k + 1) % 3]
                )));
            }
        }
        oriented.push(tri);
    }

    Ok(assemble(points, &oriented))
}

/// Link CCW triangles into a mesh. Input must already be validated.
fn assemble(points: &[Point2<f64>], triangles: &[[usize; 3]]) -> PlanarMesh {
    let mut mesh = PlanarMesh::with_capacity(points.len(), triangles.len());

    let vertex_ids: Vec<VertexId> = points.iter().map(|&p| mesh.add_vertex(p)).collect();

    // Directed edge (v0, v1) -> half-edge
    let mut edge_map: HashMap<(usize, usize), HalfEdgeId> = HashMap::new();
    let mut ordered_edges = Vec::with_capacity(triangles.len() * 3);

    for tri in triangles {
        let hes = [
            mesh.alloc_halfedge(),
            mesh.alloc_halfedge(),
            mesh.alloc_halfedge(),
        ];
        let face = mesh.alloc_face(hes[0], FaceKind::Interior);
        for k in 0..3 {
            let he = mesh.halfedge_mut(hes[k]);
            he.origin = vertex_ids[tri[k]];
            he.face = face;
            mesh.link(hes[k], hes[(k + 1) % 3]);
            mesh.vertex_mut(vertex_ids[tri[k]]).halfedge = hes[k];
            let key = (tri[k], tri[(k + 1) % 3]);
            edge_map.insert(key, hes[k]);
            ordered_edges.push(key);
        }
    }

    // Twins; border edges get a fresh half-edge with no face yet
    let mut border = Vec::new();
    for &(v0, v1) in &ordered_edges {
        let he = edge_map[&(v0, v1)];
        if let Some(&twin) = edge_map.get(&(v1, v0)) {
            mesh.halfedge_mut(he).twin = twin;
        } else {
            let b = mesh.alloc_halfedge();
            mesh.halfedge_mut(b).origin = vertex_ids[v1];
            mesh.pair(he, b);
            border.push(b);
        }
    }

    link_border_cycles(&mut mesh, &border);

    // One sentinel face per border cycle
    for &start in &border {
        if mesh.face_of(start).is_valid() {
            continue;
        }
        let mut cycle = vec![start];
        let mut he = mesh.next(start);
        while he != start {
            cycle.push(he);
            he = mesh.next(he);
        }
        let kind = if cycle_signed_area(&mesh, &cycle) < 0.0 {
            FaceKind::Boundary
        } else {
            FaceKind::Hole
        };
        let face = mesh.alloc_face(start, kind);
        for he in cycle {
            mesh.halfedge_mut(he).face = face;
        }
    }

    for &b in &border {
        let v = mesh.origin(b);
        mesh.vertex_mut(v).halfedge = b;
    }

    mesh
}

/// Set next/prev on border half-edges.
///
/// The successor of a border half-edge arriving at `v` is the border
/// half-edge leaving `v` that comes first clockwise from its twin. Only
/// vertices where several border cycles touch need the angular search.
fn link_border_cycles(mesh: &mut PlanarMesh, border: &[HalfEdgeId]) {
    let mut outgoing: HashMap<VertexId, Vec<HalfEdgeId>> = HashMap::new();
    for &b in border {
        outgoing.entry(mesh.origin(b)).or_default().push(b);
    }

    for &b in border {
        let v = mesh.dest(b);
        let candidates = &outgoing[&v];
        let next = if candidates.len() == 1 {
            candidates[0]
        } else {
            let reference = mesh.edge_vector(mesh.twin(b));
            let ref_angle = reference.y.atan2(reference.x);
            let mut best = candidates[0];
            let mut best_turn = f64::INFINITY;
            for &c in candidates {
                let d = mesh.edge_vector(c);
                let turn = (ref_angle - d.y.atan2(d.x)).rem_euclid(std::f64::consts::TAU);
                let turn = if turn == 0.0 { std::f64::consts::TAU } else { turn };
                if turn < best_turn {
                    best_turn = turn;
                    best = c;
                }
            }
            best
        };
        mesh.link(b, next);
    }
}

pub(crate) fn cycle_signed_area(mesh: &PlanarMesh, cycle: &[HalfEdgeId]) -> f64 {
    let origin = Point2::origin();
    cycle
        .iter()
        .map(|&he| orient2d(&origin, mesh.position(mesh.origin(he)), mesh.position(mesh.dest(he))))
        .sum::<f64>()
        * 0.5
}

impl PlanarMesh {
    /// The two-triangle triangulation of a rectangle.
    ///
    /// Vertices are the corners in CCW order starting at `bounds.min`; the
    /// diagonal runs from `min` to `max`.
    pub fn from_rect(bounds: &Rect) -> Self {
        assemble(&bounds.corners(), &[[0, 1, 2], [0, 2, 3]])
    }
}

/// Convert a mesh to a face-vertex triangle list.
///
/// Only live vertices and interior triangles are emitted; vertex indices are
/// renumbered densely in id order.
pub fn to_face_vertex(mesh: &PlanarMesh) -> (Vec<Point2<f64>>, Vec<[usize; 3]>) {
    let mut remap = vec![usize::MAX; mesh.vertex_capacity()];
    let mut vertices = Vec::with_capacity(mesh.num_vertices());
    for (vid, v) in mesh.vertices() {
        remap[vid.index()] = vertices.len();
        vertices.push(v.position);
    }

    let faces = mesh
        .interior_faces()
        .map(|f| {
            let [v0, v1, v2] = mesh.face_triangle(f);
            [remap[v0.index()], remap[v1.index()], remap[v2.index()]]
        })
        .collect();

    (vertices, faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::FaceId;

    fn single_triangle() -> (Vec<Point2<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 1.0),
        ];
        (vertices, vec![[0, 1, 2]])
    }

    fn two_triangles() -> (Vec<Point2<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 1.0),
            Point2::new(0.5, -1.0),
        ];
        (vertices, vec![[0, 1, 2], [1, 0, 3]])
    }

    /// 3x3 grid of squares with the center square missing.
    fn ring() -> (Vec<Point2<f64>>, Vec<[usize; 3]>) {
        let mut vertices = Vec::new();
        for j in 0..4 {
            for i in 0..4 {
                vertices.push(Point2::new(i as f64, j as f64));
            }
        }
        let mut faces = Vec::new();
        for j in 0..3 {
            for i in 0..3 {
                if i == 1 && j == 1 {
                    continue;
                }
                let a = j * 4 + i;
                faces.push([a, a + 1, a + 5]);
                faces.push([a, a + 5, a + 4]);
            }
        }
        (vertices, faces)
    }

    #[test]
    fn test_single_triangle() {
        let (vertices, faces) = single_triangle();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.num_triangles(), 1);
        // 1 interior + 1 boundary
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.num_halfedges(), 6);
        assert!(mesh.is_valid());

        for v in mesh.vertex_ids() {
            assert!(mesh.is_boundary_vertex(v));
        }
    }

    #[test]
    fn test_two_triangles() {
        let (vertices, faces) = two_triangles();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();

        assert_eq!(mesh.num_triangles(), 2);
        // 6 interior half-edges + 4 boundary half-edges
        assert_eq!(mesh.num_halfedges(), 10);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_clockwise_input_is_reoriented() {
        let (vertices, _) = single_triangle();
        let mesh = build_from_triangles(&vertices, &[[0, 2, 1]]).unwrap();
        let f = mesh.interior_faces().next().unwrap();
        assert!(mesh.face_area(f) > 0.0);
    }

    #[test]
    fn test_ring_has_hole_face() {
        let (vertices, faces) = ring();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert!(mesh.is_valid());
        assert_eq!(mesh.boundary_faces().count(), 1);
        assert_eq!(mesh.hole_faces().count(), 1);
        let hole = mesh.hole_faces().next().unwrap();
        assert_eq!(mesh.face_degree(hole), 4);
        assert!(mesh.is_boundary_vertex(VertexId::new(5)));
    }

    #[test]
    fn test_pinched_vertex() {
        // Two triangles touching at a single vertex
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 0.0),
            Point2::new(-1.0, -1.0),
        ];
        let faces = vec![[0, 1, 2], [0, 3, 4]];
        let mesh = build_from_triangles(&vertices, &faces).unwrap();
        assert!(mesh.is_valid());
        assert_eq!(mesh.valence(VertexId::new(0)), 4);
    }

    #[test]
    fn test_roundtrip() {
        let (vertices, faces) = two_triangles();
        let mesh = build_from_triangles(&vertices, &faces).unwrap();

        let (out_verts, out_faces) = to_face_vertex(&mesh);

        assert_eq!(vertices.len(), out_verts.len());
        assert_eq!(faces.len(), out_faces.len());

        for (v_in, v_out) in vertices.iter().zip(out_verts.iter()) {
            assert!((v_in - v_out).norm() < 1e-10);
        }
    }

    #[test]
    fn test_invalid_vertex_index() {
        let vertices = vec![Point2::new(0.0, 0.0)];
        let result = build_from_triangles(&vertices, &[[0, 1, 2]]);
        assert!(matches!(result, Err(GeometryError::InvalidTopology(_))));
    }

    #[test]
    fn test_degenerate_face() {
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
        ];
        let result = build_from_triangles(&vertices, &[[0, 1, 2]]);
        assert!(matches!(
            result,
            Err(GeometryError::DegenerateFace { face, .. }) if face == FaceId::new(0)
        ));

        let result = build_from_triangles(&vertices, &[[0, 0, 2]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_manifold_edge() {
        let vertices = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 1.0),
            Point2::new(0.5, 2.0),
        ];
        let result = build_from_triangles(&vertices, &[[0, 1, 2], [0, 1, 3]]);
        assert!(matches!(result, Err(GeometryError::InvalidTopology(_))));
    }
}

//! Longest-edge bisection towards a target edge length.
//!
//! A triangle whose longest edge exceeds the local target is bisected at
//! that edge's midpoint. If the neighbour across the edge has a longer edge
//! of its own, the neighbour is bisected first, recursively, so no vertex
//! ever hangs on the middle of an edge. Bisecting a right isosceles triangle
//! this way only ever produces right isosceles triangles.

use crate::error::GeometryError;
use crate::mesh::{FaceId, HalfEdgeId, PlanarMesh};

/// Relative slack below which two edge lengths count as equal.
const LENGTH_TIE: f64 = 1e-12;

/// The longest edge of an interior triangle.
pub(crate) fn longest_edge(mesh: &PlanarMesh, f: FaceId) -> HalfEdgeId {
    let mut best = mesh.face(f).halfedge;
    let mut best_len = mesh.edge_length(best);
    for he in mesh.face_halfedges(f).skip(1) {
        let len = mesh.edge_length(he);
        if len > best_len * (1.0 + LENGTH_TIE) {
            best = he;
            best_len = len;
        }
    }
    best
}

/// Bisect `f` along its longest edge, refining neighbours first as needed.
///
/// Returns the number of vertices inserted.
pub(crate) fn bisect(mesh: &mut PlanarMesh, f: FaceId) -> Result<usize, GeometryError> {
    let mut path = vec![longest_edge(mesh, f)];
    loop {
        let Some(&e) = path.last() else { break };
        let twin = mesh.twin(e);
        let g = mesh.face_of(twin);
        if !mesh.is_interior_face(g) {
            break;
        }
        let candidate = longest_edge(mesh, g);
        if mesh.edge_length(twin) >= mesh.edge_length(candidate) * (1.0 - LENGTH_TIE) {
            break;
        }
        path.push(candidate);
    }

    let mut inserted = 0;
    while let Some(e) = path.pop() {
        let mid = mesh.edge_midpoint(e);
        mesh.split_edge(e, mid)?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Bisect until no interior triangle has an edge longer than `target(midpoint)`.
///
/// Stops early, with a warning, once the mesh holds `max_vertices` vertices.
/// Returns the number of inserted vertices.
pub(crate) fn refine_to_length<H>(
    mesh: &mut PlanarMesh,
    target: H,
    max_vertices: usize,
) -> Result<usize, GeometryError>
where
    H: Fn(&nalgebra::Point2<f64>) -> f64,
{
    let too_long = |mesh: &PlanarMesh, f: FaceId| {
        let he = longest_edge(mesh, f);
        mesh.edge_length(he) > target(&mesh.edge_midpoint(he))
    };

    let mut inserted = 0;
    let mut pass = 0usize;
    loop {
        let pending: Vec<FaceId> = mesh.interior_faces().filter(|&f| too_long(mesh, f)).collect();
        if pending.is_empty() {
            break;
        }
        pass += 1;
        tracing::trace!(pass, pending = pending.len(), "bisection pass");
        for f in pending {
            if mesh.num_vertices() >= max_vertices {
                tracing::warn!(max_vertices, "uniform refinement stopped at the vertex cap");
                return Ok(inserted);
            }
            // Earlier bisections in this pass may already have split f
            if mesh.is_interior_face(f) && too_long(mesh, f) {
                inserted += bisect(mesh, f)?;
            }
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikmesh::QualityStats;
    use crate::geometry::Rect;
    use approx::assert_relative_eq;

    #[test]
    fn test_bisect_propagates_across_diagonal() {
        let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        let f = mesh.interior_faces().next().unwrap();
        let inserted = bisect(&mut mesh, f).unwrap();
        // Both triangles share the diagonal as longest edge
        assert_eq!(inserted, 1);
        assert_eq!(mesh.num_triangles(), 4);
        assert!(mesh.is_valid());
    }

    #[test]
    fn test_refine_to_uniform_length() {
        let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        refine_to_length(&mut mesh, |_| 0.2, usize::MAX).unwrap();
        assert!(mesh.is_valid());
        for he in mesh.edges() {
            assert!(mesh.edge_length(he) <= 0.2 + 1e-12);
        }
        assert_relative_eq!(mesh.interior_area(), 1.0, epsilon = 1e-12);

        let expected = (2.0 - 2f64.sqrt()) * 2f64.sqrt();
        assert_relative_eq!(QualityStats::of(&mesh).min, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_graded_refinement_has_no_hanging_vertices() {
        let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 4.0, 4.0));
        refine_to_length(&mut mesh, |p| 0.1 + 0.3 * p.x, usize::MAX).unwrap();
        assert!(mesh.is_valid());
        // A hanging vertex would leave a degree-4 interior face
        for f in mesh.interior_faces() {
            assert_eq!(mesh.face_degree(f), 3);
        }
        assert!(mesh.inverted_faces().is_empty());
        assert_relative_eq!(mesh.interior_area(), 16.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vertex_cap() {
        let mut mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        refine_to_length(&mut mesh, |_| 1e-3, 50).unwrap();
        assert!(mesh.num_vertices() <= 50 + 16);
        assert!(mesh.is_valid());
    }
}

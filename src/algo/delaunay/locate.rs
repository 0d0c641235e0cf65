//! Point location by visibility walk.
//!
//! Starting from a hint face, the walk repeatedly crosses an edge that has
//! the query point strictly on its far side, until the point lies inside or
//! on the current triangle. Walks are capped; when the cap is hit, or the
//! walk would leave the interior (through the outer border or a hole), a
//! linear scan over all triangles decides.

use nalgebra::Point2;

use crate::geometry::predicates::orient2d_sign;
use crate::mesh::{FaceId, HalfEdgeId, PlanarMesh, VertexId};

/// Relative distance below which a query point snaps to a vertex.
const SNAP_TOLERANCE: f64 = 1e-10;

/// Result of point location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Strictly inside an interior triangle.
    InFace(FaceId),
    /// On an edge; the half-edge belongs to an interior triangle.
    OnEdge(HalfEdgeId),
    /// Coincides with an existing vertex.
    OnVertex(VertexId),
    /// Not covered by any interior triangle.
    Outside,
}

impl Location {
    /// The interior face the point was found in or on, if any.
    pub fn face(&self, mesh: &PlanarMesh) -> Option<FaceId> {
        match *self {
            Location::InFace(f) => Some(f),
            Location::OnEdge(he) => Some(mesh.face_of(he)),
            Location::OnVertex(v) => mesh.vertex_faces(v).next(),
            Location::Outside => None,
        }
    }
}

/// Locate `p` in `mesh`, walking from `hint` when it is a live interior face.
///
/// Returns the location together with the last face visited, which makes a
/// good hint for the next nearby query.
pub fn locate_from(mesh: &PlanarMesh, p: &Point2<f64>, hint: FaceId) -> (Location, FaceId) {
    let start = if mesh.is_interior_face(hint) {
        Some(hint)
    } else {
        mesh.interior_faces().next()
    };
    let Some(mut face) = start else {
        return (Location::Outside, FaceId::invalid());
    };

    let max_steps = 64 + 4 * mesh.face_capacity();
    let mut steps = 0usize;
    'walk: while steps < max_steps {
        let h0 = mesh.face(face).halfedge;
        let hes = [h0, mesh.next(h0), mesh.next(mesh.next(h0))];
        // Rotate the first tested edge so degenerate configurations cannot
        // trap the walk in a fixed cycle.
        for k in 0..3 {
            let he = hes[(k + steps) % 3];
            let a = mesh.position(mesh.origin(he));
            let b = mesh.position(mesh.dest(he));
            if orient2d_sign(a, b, p) < 0 {
                let next = mesh.face_of(mesh.twin(he));
                if !mesh.is_interior_face(next) {
                    break 'walk;
                }
                face = next;
                steps += 1;
                continue 'walk;
            }
        }
        return (classify(mesh, face, p), face);
    }

    if steps >= max_steps {
        tracing::debug!(steps, "point location walk capped; scanning");
    }
    match scan(mesh, p) {
        Some((loc, f)) => (loc, f),
        None => (Location::Outside, face),
    }
}

/// Classify a point known to lie inside or on the closed triangle `face`.
fn classify(mesh: &PlanarMesh, face: FaceId, p: &Point2<f64>) -> Location {
    let h0 = mesh.face(face).halfedge;
    let hes = [h0, mesh.next(h0), mesh.next(mesh.next(h0))];

    let scale = hes
        .iter()
        .map(|&he| mesh.edge_length(he))
        .fold(0.0, f64::max);
    for &he in &hes {
        let v = mesh.origin(he);
        if (mesh.position(v) - p).norm() <= SNAP_TOLERANCE * scale {
            return Location::OnVertex(v);
        }
    }
    for &he in &hes {
        let a = mesh.position(mesh.origin(he));
        let b = mesh.position(mesh.dest(he));
        if orient2d_sign(a, b, p) == 0 {
            return Location::OnEdge(he);
        }
    }
    Location::InFace(face)
}

fn scan(mesh: &PlanarMesh, p: &Point2<f64>) -> Option<(Location, FaceId)> {
    mesh.interior_faces()
        .find(|&f| {
            let [a, b, c] = mesh.face_positions(f);
            orient2d_sign(&a, &b, p) >= 0 && orient2d_sign(&b, &c, p) >= 0 && orient2d_sign(&c, &a, p) >= 0
        })
        .map(|f| (classify(mesh, f, p), f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    #[test]
    fn locate_cases() {
        let mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 2.0, 2.0));
        let hint = FaceId::invalid();

        let (loc, _) = locate_from(&mesh, &Point2::new(1.5, 0.5), hint);
        assert!(matches!(loc, Location::InFace(_)));

        let (loc, _) = locate_from(&mesh, &Point2::new(1.0, 1.0), hint);
        match loc {
            Location::OnEdge(he) => assert!(!mesh.is_boundary_edge(he)),
            other => panic!("expected diagonal, got {:?}", other),
        }

        let (loc, _) = locate_from(&mesh, &Point2::new(1.0, 0.0), hint);
        assert!(matches!(loc, Location::OnEdge(_)));

        let (loc, _) = locate_from(&mesh, &Point2::new(2.0, 2.0), hint);
        assert!(matches!(loc, Location::OnVertex(v) if *mesh.position(v) == Point2::new(2.0, 2.0)));

        let (loc, _) = locate_from(&mesh, &Point2::new(3.0, 1.0), hint);
        assert_eq!(loc, Location::Outside);
    }

    #[test]
    fn walk_result_is_a_good_hint() {
        let mesh = PlanarMesh::from_rect(&Rect::new(0.0, 0.0, 2.0, 2.0));
        let p = Point2::new(0.2, 1.5);
        let (loc, last) = locate_from(&mesh, &p, FaceId::invalid());
        let (again, _) = locate_from(&mesh, &p, last);
        assert_eq!(loc, again);
        assert_eq!(loc.face(&mesh), Some(last));
    }
}

//! Triangle quality statistics.

use crate::mesh::PlanarMesh;

/// Summary of per-triangle quality over the interior faces of a mesh.
///
/// Quality is `(b+c-a)(c+a-b)(a+b-c) / (abc)`: 1 for equilateral triangles,
/// 0 for degenerate ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityStats {
    /// Smallest triangle quality.
    pub min: f64,
    /// Mean triangle quality.
    pub mean: f64,
    /// Smallest interior angle in radians.
    pub min_angle: f64,
    /// Number of interior triangles.
    pub triangles: usize,
}

impl Default for QualityStats {
    fn default() -> Self {
        Self {
            min: 0.0,
            mean: 0.0,
            min_angle: 0.0,
            triangles: 0,
        }
    }
}

impl QualityStats {
    /// Measure every interior triangle of `mesh`.
    ///
    /// An empty mesh has zero quality.
    pub fn of(mesh: &PlanarMesh) -> Self {
        let mut stats = Self {
            min: f64::INFINITY,
            mean: 0.0,
            min_angle: f64::INFINITY,
            triangles: 0,
        };
        let mut sum = 0.0;
        for f in mesh.interior_faces() {
            let q = mesh.face_quality(f);
            stats.min = stats.min.min(q);
            stats.min_angle = stats.min_angle.min(mesh.face_min_angle(f));
            sum += q;
            stats.triangles += 1;
        }
        if stats.triangles == 0 {
            return Self::default();
        }
        stats.mean = sum / stats.triangles as f64;
        stats
    }

    /// Histogram of triangle quality over `bins` equal buckets of `[0, 1]`.
    pub fn histogram(mesh: &PlanarMesh, bins: usize) -> Vec<usize> {
        let mut counts = vec![0; bins];
        if bins == 0 {
            return counts;
        }
        for f in mesh.interior_faces() {
            let q = mesh.face_quality(f).clamp(0.0, 1.0);
            let bin = ((q * bins as f64) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        counts
    }
}

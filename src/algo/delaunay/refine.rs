//! Ruppert-style Delaunay refinement.
//!
//! Segments are the constrained edges plus every edge on the outer border or
//! around a hole. Refinement alternates two rules until neither applies:
//!
//! 1. a segment whose diametral circle strictly contains the apex of an
//!    adjacent triangle is split at its midpoint;
//! 2. a triangle whose smallest angle is below the bound (or whose area
//!    exceeds the optional limit) receives its circumcenter, unless that
//!    point encroaches a segment, in which case the segment is split.
//!
//! A cap on inserted points stops refinement early; this is reported, not
//! treated as an error.

use std::collections::HashSet;

use crate::error::{ConfigError, GeometryError};
use crate::geometry::predicates::in_diametral_circle;
use crate::mesh::{FaceId, HalfEdgeId, PlanarMesh};

use super::Triangulation;

/// Options for [`Triangulation::refine`].
#[derive(Debug, Clone)]
pub struct RefineOptions {
    /// Minimum angle bound in degrees. Values above about 20.7 may not terminate.
    pub min_angle_deg: f64,
    /// Maximum triangle area, if any.
    pub max_area: Option<f64>,
    /// Maximum number of Steiner points to insert.
    pub max_steiner_points: usize,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            min_angle_deg: 20.0,
            max_area: None,
            max_steiner_points: 50_000,
        }
    }
}

impl RefineOptions {
    /// Set the minimum angle bound.
    pub fn with_min_angle(mut self, degrees: f64) -> Self {
        self.min_angle_deg = degrees;
        self
    }

    /// Set the maximum triangle area.
    pub fn with_max_area(mut self, area: f64) -> Self {
        self.max_area = Some(area);
        self
    }

    /// Set the Steiner point cap.
    pub fn with_max_steiner_points(mut self, cap: usize) -> Self {
        self.max_steiner_points = cap;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_angle_deg >= 0.0 && self.min_angle_deg < 60.0) {
            return Err(ConfigError::invalid_param(
                "min_angle_deg",
                self.min_angle_deg,
                "must be in [0, 60)",
            ));
        }
        if let Some(area) = self.max_area {
            if !(area > 0.0) {
                return Err(ConfigError::invalid_param("max_area", area, "must be positive"));
            }
        }
        Ok(())
    }
}

/// Outcome of a refinement run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefineReport {
    /// Vertices inserted at segment midpoints.
    pub segment_splits: usize,
    /// Vertices inserted at circumcenters.
    pub circumcenters: usize,
    /// Whether the Steiner point cap stopped refinement.
    pub capped: bool,
}

impl RefineReport {
    /// Total number of inserted vertices.
    pub fn steiner_points(&self) -> usize {
        self.segment_splits + self.circumcenters
    }
}

impl Triangulation {
    /// Refine until every interior triangle meets the angle (and area) bound.
    pub fn refine(&mut self, options: &RefineOptions) -> Result<RefineReport, ConfigError> {
        options.validate()?;
        let min_angle = options.min_angle_deg.to_radians();
        let mut report = RefineReport::default();
        let mut skipped: HashSet<FaceId> = HashSet::new();

        loop {
            while let Some(seg) = self.find_encroached_segment() {
                if report.steiner_points() >= options.max_steiner_points {
                    report.capped = true;
                    break;
                }
                if self.split_edge(seg).is_err() {
                    break;
                }
                report.segment_splits += 1;
            }
            if report.capped {
                break;
            }

            let bad: Vec<FaceId> = self
                .mesh()
                .interior_faces()
                .filter(|f| !skipped.contains(f) && self.is_bad(*f, min_angle, options.max_area))
                .collect();
            if bad.is_empty() {
                break;
            }
            tracing::debug!(bad = bad.len(), inserted = report.steiner_points(), "refinement pass");

            let mut progressed = false;
            for f in bad {
                if report.steiner_points() >= options.max_steiner_points {
                    report.capped = true;
                    break;
                }
                if !self.mesh().is_interior_face(f) || !self.is_bad(f, min_angle, options.max_area) {
                    continue;
                }
                match self.split_bad_triangle(f) {
                    Ok(Split::Circumcenter) => {
                        report.circumcenters += 1;
                        progressed = true;
                    }
                    Ok(Split::Segment) => {
                        report.segment_splits += 1;
                        progressed = true;
                    }
                    Err(_) => {
                        skipped.insert(f);
                    }
                }
            }
            if report.capped || !progressed {
                break;
            }
        }

        if report.capped {
            tracing::warn!(
                cap = options.max_steiner_points,
                "refinement stopped at the Steiner point cap"
            );
        }
        Ok(report)
    }

    fn is_bad(&self, f: FaceId, min_angle: f64, max_area: Option<f64>) -> bool {
        let mesh = self.mesh();
        mesh.face_min_angle(f) < min_angle || max_area.is_some_and(|a| mesh.face_area(f) > a)
    }

    /// A segment whose diametral circle contains the apex of an adjacent triangle.
    fn find_encroached_segment(&self) -> Option<HalfEdgeId> {
        let mesh = self.mesh();
        mesh.halfedge_ids()
            .filter(|&he| is_segment(mesh, he) && !mesh.is_boundary_halfedge(he))
            .find(|&he| {
                let apex = mesh.position(mesh.opposite_vertex(he));
                in_diametral_circle(
                    apex,
                    mesh.position(mesh.origin(he)),
                    mesh.position(mesh.dest(he)),
                )
            })
    }

    fn split_bad_triangle(&mut self, f: FaceId) -> Result<Split, GeometryError> {
        let Some(cc) = self.mesh().face_circumcenter(f) else {
            return Err(GeometryError::DegenerateFace {
                face: f,
                area: self.mesh().face_area(f),
            });
        };

        let encroached = {
            let mesh = self.mesh();
            mesh.edges().find(|&he| {
                is_segment(mesh, he)
                    && in_diametral_circle(
                        &cc,
                        mesh.position(mesh.origin(he)),
                        mesh.position(mesh.dest(he)),
                    )
            })
            .map(|he| if mesh.is_boundary_halfedge(he) { mesh.twin(he) } else { he })
        };
        if let Some(seg) = encroached {
            self.split_edge(seg)?;
            return Ok(Split::Segment);
        }

        match self.insert(cc) {
            Ok(_) => Ok(Split::Circumcenter),
            Err(GeometryError::OutsideDomain { .. }) => {
                // Circumcenter beyond a segment that does not register as
                // encroached under floating point; split the longest edge.
                let longest = self
                    .mesh()
                    .face_halfedges(f)
                    .max_by(|&a, &b| self.mesh().edge_length(a).total_cmp(&self.mesh().edge_length(b)))
                    .ok_or(GeometryError::NotATriangle { face: f })?;
                self.split_edge(longest)?;
                Ok(Split::Segment)
            }
            Err(e) => Err(e),
        }
    }
}

enum Split {
    Circumcenter,
    Segment,
}

fn is_segment(mesh: &PlanarMesh, he: HalfEdgeId) -> bool {
    mesh.is_constrained(he) || mesh.is_boundary_edge(he)
}

//! Error types for eikmesh.
//!
//! Mesh mutations reject degenerate input with a [`GeometryError`], solver and
//! generator construction fails fast with a [`ConfigError`], and compute
//! devices report [`DeviceError`]s that callers normally turn into a CPU
//! fallback. Non-convergence and unreachable regions are never errors.

use thiserror::Error;

use crate::mesh::{FaceId, HalfEdgeId, VertexId};

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Any error produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A mesh operation was given degenerate geometry or broke topology.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// A generator or solver was configured inconsistently.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A compute device failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors raised by mesh mutation and point location.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// An edge would have (near) zero length.
    #[error("degenerate edge {edge:?} (length {length})")]
    DegenerateEdge {
        /// The offending half-edge.
        edge: HalfEdgeId,
        /// Its length.
        length: f64,
    },

    /// A point coincides with an existing vertex.
    #[error("point ({x}, {y}) coincides with vertex {vertex:?}")]
    CoincidentPoint {
        /// X coordinate of the rejected point.
        x: f64,
        /// Y coordinate of the rejected point.
        y: f64,
        /// The existing vertex.
        vertex: VertexId,
    },

    /// A point lies outside the triangulated region.
    #[error("point ({x}, {y}) lies outside the triangulated region")]
    OutsideDomain {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
    },

    /// A face would end up with zero or negative area.
    #[error("face {face:?} would have non-positive area {area}")]
    DegenerateFace {
        /// The offending face.
        face: FaceId,
        /// Its signed area.
        area: f64,
    },

    /// The edge cannot be flipped.
    #[error("edge {edge:?} cannot be flipped: {reason}")]
    NotFlippable {
        /// The half-edge that was asked to flip.
        edge: HalfEdgeId,
        /// Why the flip was refused.
        reason: &'static str,
    },

    /// The operation requires an interior triangle.
    #[error("face {face:?} is not an interior triangle")]
    NotATriangle {
        /// The offending face.
        face: FaceId,
    },

    /// An element handle refers to a destroyed element.
    #[error("element {0} has been destroyed")]
    Destroyed(String),

    /// The mesh violates one of its invariants.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
}

/// Errors raised while configuring a generator or solver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Domain bounds are empty or not finite.
    #[error("invalid bounds [{min_x}, {max_x}] x [{min_y}, {max_y}]")]
    InvalidBounds {
        /// Lower x bound.
        min_x: f64,
        /// Lower y bound.
        min_y: f64,
        /// Upper x bound.
        max_x: f64,
        /// Upper y bound.
        max_y: f64,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// A polygon has fewer than three distinct vertices or zero area.
    #[error("degenerate polygon with {vertices} vertices")]
    DegeneratePolygon {
        /// Number of vertices supplied.
        vertices: usize,
    },

    /// The solver was given no target.
    #[error("no target shapes were supplied")]
    NoTargets,

    /// A target does not intersect the domain bounds.
    #[error("target {index} lies entirely outside the domain")]
    TargetOutsideDomain {
        /// Index of the target in the domain's target list.
        index: usize,
    },

    /// A target lies entirely inside an obstacle.
    #[error("target {target} lies entirely inside obstacle {obstacle}")]
    TargetInsideObstacle {
        /// Index of the target.
        target: usize,
        /// Index of the obstacle.
        obstacle: usize,
    },

    /// The requested grid would be too large.
    #[error("grid of {nx} x {ny} nodes exceeds the limit of {limit} nodes")]
    GridTooLarge {
        /// Nodes along x.
        nx: usize,
        /// Nodes along y.
        ny: usize,
        /// Maximum node count.
        limit: usize,
    },

    /// The solver kind needs a mesh but none was supplied (or vice versa).
    #[error("solver {kind} requires {requirement}")]
    MissingInput {
        /// Solver kind name.
        kind: &'static str,
        /// What is missing.
        requirement: &'static str,
    },
}

impl ConfigError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        ConfigError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

/// Errors raised by compute devices.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// No suitable adapter was found.
    #[error("no compute adapter available")]
    NoAdapter,

    /// The device could not be created.
    #[error("device request failed: {0}")]
    RequestFailed(String),

    /// A kernel failed to compile or dispatch.
    #[error("kernel failure: {0}")]
    Kernel(String),

    /// Reading results back from the device failed.
    #[error("buffer readback failed: {0}")]
    Readback(String),

    /// A phase transition was requested out of order.
    #[error("phase protocol violation: cannot {action} during {phase}")]
    PhaseViolation {
        /// The attempted action.
        action: &'static str,
        /// The current phase name.
        phase: &'static str,
    },

    /// No state has been uploaded to the device yet.
    #[error("device holds no state; upload before dispatching")]
    NotUploaded,
}

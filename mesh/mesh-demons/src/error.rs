//! Error types for the thin-shell demons metric.

use std::fmt;

use thiserror::Error;

/// Which of the two input surfaces an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshRole {
    /// The reference surface.
    Fixed,
    /// The surface deformed toward the reference.
    Moving,
}

impl fmt::Display for MeshRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("fixed"),
            Self::Moving => f.write_str("moving"),
        }
    }
}

/// An input mesh cannot be used by the metric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMeshError {
    /// Mesh has no points.
    #[error("{role} mesh has no points")]
    EmptyMesh {
        /// Offending mesh.
        role: MeshRole,
    },

    /// Mesh has no cell with three distinct, in-range indices.
    #[error("{role} mesh has no valid triangle cells")]
    NoValidCells {
        /// Offending mesh.
        role: MeshRole,
    },

    /// A cell references a point that does not exist.
    #[error("{role} mesh cell {cell} references point {index}, but the mesh has {point_count} points")]
    CellIndexOutOfRange {
        /// Offending mesh.
        role: MeshRole,
        /// Cell index.
        cell: usize,
        /// The out-of-range point index.
        index: u32,
        /// Number of points in the mesh.
        point_count: usize,
    },

    /// Rest state taken from the fixed mesh needs one fixed point per moving point.
    #[error("fixed mesh has {fixed} points but moving mesh has {moving}")]
    PointCountMismatch {
        /// Fixed mesh point count.
        fixed: usize,
        /// Moving mesh point count.
        moving: usize,
    },
}

/// Errors raised by [`ThinShellDemonsMetric`](crate::ThinShellDemonsMetric).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// An input mesh failed validation.
    #[error(transparent)]
    InvalidMesh(#[from] InvalidMeshError),

    /// The spatial search found no candidate for a moving point.
    #[error("no correspondence found for moving point {point}")]
    CorrespondenceFailure {
        /// Moving point index.
        point: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The virtual domain encloses no volume.
    #[error("virtual domain is empty")]
    EmptyDomain,
}

/// Result type for metric operations.
pub type MetricResult<T> = Result<T, MetricError>;

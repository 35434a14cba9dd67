//! TreeMeshError: Unified error type for tree-mesh public APIs
//!
//! Construction errors are fatal (no partial mesh is produced). Query errors
//! are local to the offending request and never touch cached state.

use thiserror::Error;

/// Unified error type for tree-mesh operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TreeMeshError {
    /// Malformed construction arguments (non power-of-two axis sizing,
    /// wrong dimension, non-positive widths, inconsistent persisted state).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Refinement was requested beyond the deepest level the index codec can represent.
    #[error("cannot refine to level {requested}: the deepest representable level is {max}")]
    LevelOverflow { requested: u32, max: u32 },
    /// Unknown location type string, or a z-entity requested on a 2D mesh.
    #[error("invalid location type `{0}`")]
    InvalidLocationType(String),
    /// A query point lies outside the mesh domain.
    #[error("point #{index} at {point:?} lies outside the mesh domain")]
    OutOfBounds { index: usize, point: Vec<f64> },
    /// A cell index does not refer to a leaf of the current tree.
    #[error("cell index {index} out of range (mesh has {len} cells)")]
    CellIndexOutOfRange { index: usize, len: usize },
    /// A structural invariant (tiling, alignment, 2:1 balance) does not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

//! Geometry of tree meshes.
//!
//! [`grid::TensorGrid`] maps integer tree positions to physical coordinates,
//! [`metrics`] measures cells and entities.

pub mod grid;
pub mod metrics;

pub use grid::TensorGrid;

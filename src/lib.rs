//! # tree-mesh
//!
//! Adaptive QuadTree (2D) and OcTree (3D) meshes for finite-volume PDE codes.
//!
//! A [`TreeMesh`] starts from a tensor base grid with a power-of-two number of
//! cells per axis. Cells are refined and coarsened under a 2:1 balance
//! constraint across faces (and edges in 3D). From the leaf set the mesh
//! derives:
//!
//! - nodes, edges and faces, split into free entities and hanging entities
//!   constrained by the coarser side of a level jump;
//! - sparse operators (face divergence, nodal gradient, edge curl, cell
//!   gradient) over the free entities;
//! - interpolation matrices from any entity kind to arbitrary points;
//! - boundary index sets, permutations to grid order and point location.
//!
//! Derived data is computed lazily and cached until the next mutation.
//!
//! ## Usage
//!
//! ```
//! use tree_mesh::prelude::*;
//!
//! let mut mesh = TreeMesh::uniform(&[8, 8], &[1.0, 1.0])?;
//! let cell = mesh.locate_points(&[[0.5, 0.5]])?[0];
//! mesh.refine_cells(&RefineOptions::default(), &[cell])?;
//! assert_eq!(mesh.n_cells(), 67);
//! assert_eq!(mesh.n_hanging_nodes()?, 4);
//! let div = mesh.face_divergence()?;
//! assert_eq!(div.nrows(), mesh.n_cells());
//! # Ok::<(), TreeMeshError>(())
//! ```
//!
//! ## Determinism
//!
//! Cells are numbered along the Morton curve and entities by their position,
//! so equal leaf sets always produce identical numberings and operators.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and never installs a logger.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod geometry;
pub mod io;
pub mod mesh;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use mesh::TreeMesh;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::inner_product::{FaceInnerProduct, LumpedFaceMass};
    pub use crate::data::hanging_constraints::{
        HangingConstraints, LinearConstraintTerm, apply_hanging_constraints,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::geometry::TensorGrid;
    pub use crate::io::TreeMeshState;
    pub use crate::mesh::{CellInfo, EntityCounts, TreeMesh};
    pub use crate::mesh_error::TreeMeshError;
    pub use crate::topology::cache::InvalidateCache;
    pub use crate::topology::coarsen::{CoarsenRejection, CoarsenReport};
    pub use crate::topology::key::{CellKey, KeyType};
    pub use crate::topology::location::LocationType;
    pub use crate::topology::refine::{RefineOptions, RefineSummary};
    pub use crate::topology::tree::Neighbor;
}

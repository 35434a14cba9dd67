//! Tree topology: cell keys, the leaf set and its mutations, and the
//! enumeration of the nodes, edges and faces the leaves define.
//!
//! - [`key`] encodes cells as `(level, anchor)` keys and Morton indices
//! - [`tree`] stores the leaves and answers neighbor queries
//! - [`refine`] and [`coarsen`] mutate the leaf set under 2:1 balance
//! - [`entities`] numbers free and hanging entities
//! - [`cache`] holds everything derived from a given leaf set

pub mod cache;
pub mod coarsen;
pub mod entities;
pub mod key;
pub mod location;
pub mod refine;
pub mod tree;

pub use cache::InvalidateCache;
pub use coarsen::{CoarsenRejection, CoarsenReport};
pub use key::{CellKey, KeyCodec, KeyType};
pub use location::LocationType;
pub use refine::{RefineOptions, RefineSummary};
pub use tree::{LeafSet, Neighbor};

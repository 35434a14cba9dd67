//! Algorithms over a built mesh: operator assembly, boundary sets,
//! interpolation, point location and renumbering.

pub mod assembly;
pub mod boundary;
pub mod inner_product;
pub mod interpolate;
pub mod locate;
pub mod permute;

pub use inner_product::{FaceInnerProduct, LumpedFaceMass};

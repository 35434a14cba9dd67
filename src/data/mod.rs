//! Data attached to mesh entities.
#![warn(missing_docs)]

pub mod hanging_constraints;

pub use hanging_constraints::{
    HangingConstraints, LinearConstraintTerm, apply_hanging_constraints,
};

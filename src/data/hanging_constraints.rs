//! Hanging constraints: linear relationships between hanging and free entities.
//!
//! Entities of one kind (nodes, edges along an axis, faces normal to an axis)
//! are numbered with the free (non-hanging) entities first, `0..n_free`, and
//! the hanging ones after them. Every hanging entity carries a list of
//! [`LinearConstraintTerm`]s over free indices whose weights sum to one.

use crate::mesh_error::TreeMeshError;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::collections::BTreeMap;

/// A linear term referencing a free entity with a weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearConstraintTerm {
    /// Index of the free entity.
    pub index: usize,
    /// Weight applied to the free entity's value.
    pub weight: f64,
}

impl LinearConstraintTerm {
    /// Create a new linear term.
    pub fn new(index: usize, weight: f64) -> Self {
        Self { index, weight }
    }
}

/// Constraints of all hanging entities of one kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HangingConstraints {
    n_free: usize,
    constraints: BTreeMap<usize, Vec<LinearConstraintTerm>>,
}

impl HangingConstraints {
    /// Empty constraint set over `n_free` free entities.
    pub fn new(n_free: usize) -> Self {
        Self {
            n_free,
            constraints: BTreeMap::new(),
        }
    }

    /// Number of free entities.
    #[inline]
    pub fn n_free(&self) -> usize {
        self.n_free
    }

    /// Number of hanging entities.
    #[inline]
    pub fn n_hanging(&self) -> usize {
        self.constraints.len()
    }

    /// Number of free and hanging entities.
    #[inline]
    pub fn n_total(&self) -> usize {
        self.n_free + self.constraints.len()
    }

    /// Borrow the constraint map, keyed by hanging entity index.
    pub fn constraints(&self) -> &BTreeMap<usize, Vec<LinearConstraintTerm>> {
        &self.constraints
    }

    /// Insert or replace the constraint of a hanging entity.
    pub fn insert_constraint(&mut self, index: usize, terms: Vec<LinearConstraintTerm>) {
        self.constraints.insert(index, terms);
    }

    /// Terms of entity `index`; a free entity maps to itself with weight one.
    pub fn terms(&self, index: usize) -> Vec<LinearConstraintTerm> {
        match self.constraints.get(&index) {
            Some(terms) => terms.clone(),
            None => vec![LinearConstraintTerm::new(index, 1.0)],
        }
    }

    /// Check index ranges and that each constraint is a partition of unity.
    pub fn validate(&self) -> Result<(), TreeMeshError> {
        for (hanging, terms) in &self.constraints {
            if *hanging < self.n_free {
                return Err(TreeMeshError::InvariantViolation(format!(
                    "hanging entity {hanging} is numbered among the {} free entities",
                    self.n_free
                )));
            }
            if let Some(term) = terms.iter().find(|t| t.index >= self.n_free) {
                return Err(TreeMeshError::InvariantViolation(format!(
                    "hanging entity {hanging} references non-free entity {}",
                    term.index
                )));
            }
            let sum: f64 = terms.iter().map(|t| t.weight).sum();
            if (sum - 1.0).abs() > 1e-12 {
                return Err(TreeMeshError::InvariantViolation(format!(
                    "weights of hanging entity {hanging} sum to {sum}"
                )));
            }
        }
        Ok(())
    }

    /// Projection from free values to all values, `n_total x n_free`.
    ///
    /// The upper block is the identity; the rows of hanging entities hold
    /// their constraint weights.
    pub fn projection(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.n_total(), self.n_free);
        for i in 0..self.n_free {
            coo.push(i, i, 1.0);
        }
        for (hanging, terms) in &self.constraints {
            for term in terms {
                coo.push(*hanging, term.index, term.weight);
            }
        }
        CsrMatrix::from(&coo)
    }
}

/// Expand values given on free entities to all entities.
pub fn apply_hanging_constraints(
    free_values: &[f64],
    constraints: &HangingConstraints,
) -> Result<Vec<f64>, TreeMeshError> {
    if free_values.len() != constraints.n_free() {
        return Err(TreeMeshError::Configuration(format!(
            "expected {} free values, got {}",
            constraints.n_free(),
            free_values.len()
        )));
    }
    let mut values = free_values.to_vec();
    values.resize(constraints.n_total(), 0.0);
    for (hanging, terms) in constraints.constraints() {
        values[*hanging] = terms.iter().map(|t| free_values[t.index] * t.weight).sum();
    }
    Ok(values)
}

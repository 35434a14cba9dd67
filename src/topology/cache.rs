//! Cache invalidation for structures holding derived topology and operators.

use crate::topology::entities::Entities;
use nalgebra_sparse::CsrMatrix;
use once_cell::unsync::OnceCell;

/// Anything that caches data derived from the leaf set (entity numbering,
/// assembled operators, boundary index sets) should implement this.
pub trait InvalidateCache {
    /// Invalidate *all* internal caches so future queries recompute correctly.
    fn invalidate_cache(&mut self);
}

// Blanket impl for Box<T>
impl<T: InvalidateCache + ?Sized> InvalidateCache for Box<T> {
    #[inline]
    fn invalidate_cache(&mut self) {
        (**self).invalidate_cache();
    }
}

/// Lazily filled slots for everything derived from one leaf set.
///
/// Each slot is computed on first access. Invalidation replaces the whole
/// struct, so no slot can survive a topology change.
#[derive(Clone, Debug, Default)]
pub struct OperatorCache {
    pub(crate) entities: OnceCell<Entities>,
    pub(crate) cell_volumes: OnceCell<Vec<f64>>,
    pub(crate) face_areas: OnceCell<Vec<f64>>,
    pub(crate) edge_lengths: OnceCell<Vec<f64>>,
    pub(crate) face_divergence: OnceCell<CsrMatrix<f64>>,
    pub(crate) face_divergence_axes: [OnceCell<CsrMatrix<f64>>; 3],
    pub(crate) nodal_gradient: OnceCell<CsrMatrix<f64>>,
    pub(crate) edge_curl: OnceCell<CsrMatrix<f64>>,
    pub(crate) cell_gradient: OnceCell<CsrMatrix<f64>>,
    pub(crate) cell_gradient_axes: [OnceCell<CsrMatrix<f64>>; 3],
    pub(crate) cell_gradient_stencil: OnceCell<CsrMatrix<f64>>,
    pub(crate) cell_gradient_stencil_axes: [OnceCell<CsrMatrix<f64>>; 3],
    pub(crate) face_boundary: OnceCell<Vec<Vec<usize>>>,
}

impl OperatorCache {
    /// `true` if nothing has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.entities.get().is_none()
            && self.cell_volumes.get().is_none()
            && self.face_areas.get().is_none()
            && self.edge_lengths.get().is_none()
            && self.face_divergence.get().is_none()
            && self.face_divergence_axes.iter().all(|c| c.get().is_none())
            && self.nodal_gradient.get().is_none()
            && self.edge_curl.get().is_none()
            && self.cell_gradient.get().is_none()
            && self.cell_gradient_axes.iter().all(|c| c.get().is_none())
            && self.cell_gradient_stencil.get().is_none()
            && self.cell_gradient_stencil_axes.iter().all(|c| c.get().is_none())
            && self.face_boundary.get().is_none()
    }
}

impl InvalidateCache for OperatorCache {
    fn invalidate_cache(&mut self) {
        *self = OperatorCache::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_clears_every_slot() {
        let mut cache = OperatorCache::default();
        assert!(cache.is_empty());
        cache.cell_volumes.set(vec![1.0]).unwrap();
        cache.cell_gradient_axes[1].set(CsrMatrix::identity(2)).unwrap();
        cache.face_divergence_axes[0].set(CsrMatrix::identity(2)).unwrap();
        assert!(!cache.is_empty());
        let mut boxed: Box<OperatorCache> = Box::new(cache);
        boxed.invalidate_cache();
        assert!(boxed.is_empty());
    }
}

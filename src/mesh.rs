//! `TreeMesh`: an adaptive QuadTree (2D) or OcTree (3D) mesh.
//!
//! The mesh owns its leaf set, the cell numbering derived from it and a cache
//! of every derived quantity (entity numbering, geometry arrays, assembled
//! operators). Cells are numbered along the Morton curve of their anchors.
//!
//! # Concurrency
//!
//! A `TreeMesh` has no internal locking and its caches use
//! [`once_cell::unsync::OnceCell`], so the type is `!Sync`. Mutations take
//! `&mut self`; callers sharing a mesh across threads must wrap it in their
//! own lock. Every mutation that changes the leaf set invalidates all caches
//! before it returns, so no operator computed for an older topology is ever
//! observable.

use crate::algs::{assembly, boundary, interpolate, locate, permute};
use crate::algs::inner_product::{FaceInnerProduct, LumpedFaceMass};
use crate::data::hanging_constraints::HangingConstraints;
use crate::debug_invariants::DebugInvariants;
use crate::geometry::grid::TensorGrid;
use crate::geometry::metrics;
use crate::io::TreeMeshState;
use crate::mesh_error::TreeMeshError;
use crate::topology::cache::{InvalidateCache, OperatorCache};
use crate::topology::coarsen::{CoarsenReport, coarsen_where};
use crate::topology::entities::{self, Entities, EntityGroup};
use crate::topology::key::{CellKey, KeyCodec, KeyType};
use crate::topology::location::LocationType;
use crate::topology::refine::{
    RefineOptions, RefineSummary, refine_keys, refine_towards, refine_where,
};
use crate::topology::tree::{LeafSet, Neighbor};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Geometry of one leaf, handed to refinement and coarsening selectors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellInfo {
    pub key: CellKey,
    pub level: u8,
    /// Center coordinates; components beyond the mesh dimension are 0.
    pub center: [f64; 3],
    /// Widths along each axis; components beyond the mesh dimension are 0.
    pub widths: [f64; 3],
}

/// Free, hanging and total counts of one entity group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub free: usize,
    pub hanging: usize,
    pub total: usize,
}

impl From<&EntityGroup> for EntityCounts {
    fn from(group: &EntityGroup) -> Self {
        Self {
            free: group.n_free(),
            hanging: group.n_hanging(),
            total: group.n_total(),
        }
    }
}

/// An adaptive tree mesh over a tensor base grid.
///
/// Serializes through [`TreeMeshState`]; only the base grid and the leaf set
/// are persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "TreeMeshState", into = "TreeMeshState")]
pub struct TreeMesh {
    grid: TensorGrid,
    leaves: LeafSet,
    /// Leaves in Morton order; position is the cell index.
    cells: Vec<CellKey>,
    cell_lookup: HashMap<CellKey, usize>,
    generation: u64,
    cache: OperatorCache,
}

fn trim(x: [f64; 3], dim: usize) -> Vec<f64> {
    x[..dim].to_vec()
}

impl TreeMesh {
    /// Build a mesh whose level 0 cells are the tensor grid given by the
    /// per-axis cell widths `h` and origin `x0` (empty for the zero origin).
    ///
    /// # Errors
    /// [`TreeMeshError::Configuration`] unless there are 2 or 3 axes, every
    /// axis has a power-of-two number of finite positive widths and `x0` has
    /// one component per axis.
    pub fn new(h: Vec<Vec<f64>>, x0: Vec<f64>) -> Result<Self, TreeMeshError> {
        let counts: Vec<usize> = h.iter().map(Vec::len).collect();
        let codec = KeyCodec::new(&counts)?;
        let grid = TensorGrid::try_new(h, x0, codec.depth())?;
        Ok(Self::from_parts(grid, LeafSet::uniform(codec)))
    }

    /// Uniform base grid with `counts[i]` cells spanning `lengths[i]` along axis `i`.
    pub fn uniform(counts: &[usize], lengths: &[f64]) -> Result<Self, TreeMeshError> {
        if counts.len() != lengths.len() {
            return Err(TreeMeshError::Configuration(format!(
                "{} cell counts but {} domain lengths",
                counts.len(),
                lengths.len()
            )));
        }
        let h = counts
            .iter()
            .zip(lengths)
            .map(|(&n, &len)| vec![len / n.max(1) as f64; n])
            .collect();
        Self::new(h, Vec::new())
    }

    /// Rebuild a mesh from persisted `(cell index, level)` pairs.
    ///
    /// The pairs may come in any order but must tile the domain exactly and
    /// satisfy 2:1 balance.
    pub fn from_cells(
        h: Vec<Vec<f64>>,
        x0: Vec<f64>,
        cell_indexes: &[KeyType],
        cell_levels: &[u8],
    ) -> Result<Self, TreeMeshError> {
        if cell_indexes.len() != cell_levels.len() {
            return Err(TreeMeshError::Configuration(format!(
                "{} cell indexes but {} cell levels",
                cell_indexes.len(),
                cell_levels.len()
            )));
        }
        let counts: Vec<usize> = h.iter().map(Vec::len).collect();
        let codec = KeyCodec::new(&counts)?;
        let grid = TensorGrid::try_new(h, x0, codec.depth())?;
        let keys = cell_indexes
            .iter()
            .zip(cell_levels)
            .map(|(&index, &level)| codec.decode(index, level))
            .collect::<Result<Vec<_>, _>>()?;
        let leaves = LeafSet::from_keys(codec, keys)?;
        leaves
            .check_balance()
            .map_err(|e| TreeMeshError::Configuration(e.to_string()))?;
        Ok(Self::from_parts(grid, leaves))
    }

    fn from_parts(grid: TensorGrid, leaves: LeafSet) -> Self {
        let mut mesh = Self {
            grid,
            leaves,
            cells: Vec::new(),
            cell_lookup: HashMap::new(),
            generation: 0,
            cache: OperatorCache::default(),
        };
        mesh.reindex();
        mesh
    }

    fn reindex(&mut self) {
        self.cells = self.leaves.iter().copied().collect();
        self.cell_lookup = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, key)| (*key, i))
            .collect();
    }

    /// Record a topology change: renumber cells, drop caches, bump the generation.
    fn commit(&mut self, context: &str) {
        self.reindex();
        self.invalidate_cache();
        log::debug!(
            "{context}: generation {} with {} cells",
            self.generation,
            self.cells.len()
        );
        crate::debug_invariants!(self.leaves.check_balance(), "TreeMesh::commit");
    }

    // ----- structure -------------------------------------------------------

    #[inline]
    pub fn dim(&self) -> usize {
        self.grid.dim()
    }

    /// Level 0 cell widths per axis.
    pub fn h(&self) -> &[Vec<f64>] {
        self.grid.h()
    }

    pub fn x0(&self) -> &[f64] {
        self.grid.x0()
    }

    pub fn grid(&self) -> &TensorGrid {
        &self.grid
    }

    pub fn codec(&self) -> &KeyCodec {
        self.leaves.codec()
    }

    pub fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    /// Number of leaf-set changes since construction.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Lower and upper corner of the domain.
    pub fn domain(&self) -> (Vec<f64>, Vec<f64>) {
        (0..self.dim()).map(|axis| self.grid.bounds(axis)).unzip()
    }

    /// Deepest level the index codec can represent.
    pub fn max_level(&self) -> u8 {
        self.codec().depth()
    }

    /// Deepest level of any current leaf.
    pub fn max_used_level(&self) -> u8 {
        self.cells.iter().map(|c| c.level).max().unwrap_or(0)
    }

    #[inline]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Leaves in cell index order.
    pub fn cell_keys(&self) -> &[CellKey] {
        &self.cells
    }

    pub fn cell_index_of(&self, key: &CellKey) -> Option<usize> {
        self.cell_lookup.get(key).copied()
    }

    pub fn cell_key(&self, index: usize) -> Result<CellKey, TreeMeshError> {
        self.cells
            .get(index)
            .copied()
            .ok_or(TreeMeshError::CellIndexOutOfRange {
                index,
                len: self.cells.len(),
            })
    }

    /// Persisted index (Morton code of the anchor) of every cell.
    pub fn cell_indexes(&self) -> Vec<KeyType> {
        self.cells.iter().map(|c| self.codec().encode(c)).collect()
    }

    pub fn cell_levels(&self) -> Vec<u8> {
        self.cells.iter().map(|c| c.level).collect()
    }

    /// Number of cells on each level `0..=max_used_level`.
    pub fn cells_per_level(&self) -> Vec<usize> {
        let mut counts = vec![0; usize::from(self.max_used_level()) + 1];
        for cell in &self.cells {
            counts[usize::from(cell.level)] += 1;
        }
        counts
    }

    /// Fraction of the cells a uniform mesh at `max_used_level` would have.
    pub fn fill(&self) -> f64 {
        let base: f64 = self
            .codec()
            .base_counts()
            .iter()
            .take(self.dim())
            .map(|n| f64::from(*n))
            .product();
        let per_base = 2f64.powi(self.dim() as i32 * i32::from(self.max_used_level()));
        self.n_cells() as f64 / (base * per_base)
    }

    // ----- geometry --------------------------------------------------------

    fn size_of(&self, key: &CellKey) -> u32 {
        self.codec().size(key.level)
    }

    /// Key, level, center and widths of cell `index`.
    pub fn cell_info(&self, index: usize) -> Result<CellInfo, TreeMeshError> {
        let key = self.cell_key(index)?;
        Ok(cell_info(&self.grid, self.codec(), &key))
    }

    pub fn cell_centers(&self) -> Vec<Vec<f64>> {
        self.cells
            .iter()
            .map(|c| {
                let center = metrics::cell_center(&self.grid, &c.anchor, self.size_of(c));
                trim(center, self.dim())
            })
            .collect()
    }

    pub fn cell_widths(&self) -> Vec<Vec<f64>> {
        self.cells
            .iter()
            .map(|c| {
                let widths = metrics::cell_widths(&self.grid, &c.anchor, self.size_of(c));
                trim(widths, self.dim())
            })
            .collect()
    }

    pub fn cell_volumes(&self) -> &[f64] {
        self.cache.cell_volumes.get_or_init(|| {
            self.cells
                .iter()
                .map(|c| metrics::cell_volume(&self.grid, &c.anchor, self.size_of(c)))
                .collect()
        })
    }

    /// Entity numbering and hanging constraints of the current leaf set.
    pub fn entities(&self) -> Result<&Entities, TreeMeshError> {
        self.cache.entities.get_or_try_init(|| {
            let entities = Entities::build(&self.leaves)?;
            log::debug!("entities: {}", entities::describe(&entities));
            Ok(entities)
        })
    }

    fn group_points(&self, group: &EntityGroup, hanging: bool) -> Vec<Vec<f64>> {
        let range = if hanging {
            group.n_free()..group.n_total()
        } else {
            0..group.n_free()
        };
        range
            .map(|i| trim(metrics::point(&self.grid, &group.location(i)), self.dim()))
            .collect()
    }

    /// Coordinates of the free entities of `location` (cell centers for
    /// [`LocationType::CellCenters`]).
    pub fn locations(&self, location: LocationType) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        match self.entities()?.group(location)? {
            Some(group) => Ok(self.group_points(group, false)),
            None => Ok(self.cell_centers()),
        }
    }

    /// Coordinates of the hanging entities of `location`; empty for cell centers.
    pub fn hanging_locations(
        &self,
        location: LocationType,
    ) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        match self.entities()?.group(location)? {
            Some(group) => Ok(self.group_points(group, true)),
            None => Ok(Vec::new()),
        }
    }

    pub fn nodes(&self) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        self.locations(LocationType::Nodes)
    }

    pub fn hanging_nodes(&self) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        self.hanging_locations(LocationType::Nodes)
    }

    /// Centers of the free faces normal to `axis`.
    pub fn faces(&self, axis: usize) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        self.locations(LocationType::Faces(axis))
    }

    pub fn hanging_faces(&self, axis: usize) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        self.hanging_locations(LocationType::Faces(axis))
    }

    /// Centers of the free edges along `axis`.
    pub fn edges(&self, axis: usize) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        self.locations(LocationType::Edges(axis))
    }

    pub fn hanging_edges(&self, axis: usize) -> Result<Vec<Vec<f64>>, TreeMeshError> {
        self.hanging_locations(LocationType::Edges(axis))
    }

    /// Areas of the free faces in global face order (lengths in 2D).
    pub fn face_areas(&self) -> Result<&[f64], TreeMeshError> {
        self.cache
            .face_areas
            .get_or_try_init(|| {
                let entities = self.entities()?;
                Ok((0..self.dim())
                    .flat_map(|axis| {
                        let group = entities.faces(axis);
                        (0..group.n_free()).map(move |f| {
                            let loc = group.location(f);
                            metrics::face_area(&self.grid, axis, &loc, group.size(f))
                        })
                    })
                    .collect())
            })
            .map(Vec::as_slice)
    }

    /// Lengths of the free edges in global edge order.
    pub fn edge_lengths(&self) -> Result<&[f64], TreeMeshError> {
        self.cache
            .edge_lengths
            .get_or_try_init(|| {
                let entities = self.entities()?;
                Ok((0..self.dim())
                    .flat_map(|axis| {
                        let group = entities.edges(axis);
                        (0..group.n_free()).map(move |e| {
                            let loc = group.location(e);
                            metrics::edge_length(&self.grid, axis, &loc, group.size(e))
                        })
                    })
                    .collect())
            })
            .map(Vec::as_slice)
    }

    // ----- counts ----------------------------------------------------------

    /// Counts of the entity group of `location` (cells for cell centers).
    pub fn counts(&self, location: LocationType) -> Result<EntityCounts, TreeMeshError> {
        Ok(match self.entities()?.group(location)? {
            Some(group) => group.into(),
            None => EntityCounts {
                free: self.n_cells(),
                hanging: 0,
                total: self.n_cells(),
            },
        })
    }

    pub fn n_nodes(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.nodes().n_free())
    }

    pub fn n_hanging_nodes(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.nodes().n_hanging())
    }

    pub fn n_total_nodes(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.nodes().n_total())
    }

    pub fn n_faces(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.n_faces())
    }

    pub fn n_hanging_faces(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.n_hanging_faces())
    }

    pub fn n_total_faces(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.n_total_faces())
    }

    pub fn n_edges(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.n_edges())
    }

    pub fn n_hanging_edges(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.n_hanging_edges())
    }

    pub fn n_total_edges(&self) -> Result<usize, TreeMeshError> {
        Ok(self.entities()?.n_total_edges())
    }

    /// Free face counts per axis.
    pub fn vn_faces(&self) -> Result<Vec<usize>, TreeMeshError> {
        let entities = self.entities()?;
        Ok((0..self.dim()).map(|a| entities.faces(a).n_free()).collect())
    }

    /// Total (free and hanging) face counts per axis.
    pub fn vn_total_faces(&self) -> Result<Vec<usize>, TreeMeshError> {
        let entities = self.entities()?;
        Ok((0..self.dim()).map(|a| entities.faces(a).n_total()).collect())
    }

    /// Free edge counts per axis.
    pub fn vn_edges(&self) -> Result<Vec<usize>, TreeMeshError> {
        let entities = self.entities()?;
        Ok((0..self.dim()).map(|a| entities.edges(a).n_free()).collect())
    }

    /// Total (free and hanging) edge counts per axis.
    pub fn vn_total_edges(&self) -> Result<Vec<usize>, TreeMeshError> {
        let entities = self.entities()?;
        Ok((0..self.dim()).map(|a| entities.edges(a).n_total()).collect())
    }

    /// Hanging constraints of an entity group.
    pub fn hanging_constraints(
        &self,
        location: LocationType,
    ) -> Result<&HangingConstraints, TreeMeshError> {
        match self.entities()?.group(location)? {
            Some(group) => Ok(group.constraints()),
            None => Err(TreeMeshError::InvalidLocationType(format!(
                "{location} has no hanging entities"
            ))),
        }
    }

    // ----- operators -------------------------------------------------------

    /// Cells x free faces divergence, faces in `[x, y, z]` group order.
    pub fn face_divergence(&self) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        self.cache
            .face_divergence
            .get_or_try_init(|| assembly::face_divergence(self))
    }

    /// Divergence restricted to the faces normal to `axis`.
    pub fn face_divergence_axis(&self, axis: usize) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        LocationType::Faces(axis).check_dim(self.dim())?;
        self.cache.face_divergence_axes[axis].get_or_try_init(|| {
            let offsets = self.entities()?.face_offsets();
            let (start, end) = (offsets[axis], offsets[axis + 1]);
            Ok(assembly::restrict_columns(self.face_divergence()?, start, end))
        })
    }

    /// Free edges x free nodes gradient.
    pub fn nodal_gradient(&self) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        self.cache
            .nodal_gradient
            .get_or_try_init(|| assembly::nodal_gradient(self))
    }

    /// Free faces x free edges curl in 3D; cells x free edges in 2D.
    pub fn edge_curl(&self) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        self.cache
            .edge_curl
            .get_or_try_init(|| assembly::edge_curl(self))
    }

    /// Cell-centered gradient `-Pi Minv Div^T diag(volumes)` with the lumped
    /// face inner product.
    pub fn cell_gradient(&self) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        self.cache
            .cell_gradient
            .get_or_try_init(|| self.cell_gradient_with(&LumpedFaceMass))
    }

    /// Cell gradient onto the faces normal to `axis`.
    pub fn cell_gradient_axis(&self, axis: usize) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        LocationType::Faces(axis).check_dim(self.dim())?;
        self.cache.cell_gradient_axes[axis].get_or_try_init(|| {
            let offsets = self.entities()?.face_offsets();
            let weights = self.gradient_face_weights(&LumpedFaceMass)?;
            Ok(assembly::cell_gradient(
                self.face_divergence_axis(axis)?,
                self.cell_volumes(),
                &weights[offsets[axis]..offsets[axis + 1]],
            ))
        })
    }

    /// Unscaled cell differences onto all free faces, axis blocks stacked in
    /// `[x, y, z]` order.
    pub fn cell_gradient_stencil(&self) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        self.cache.cell_gradient_stencil.get_or_try_init(|| {
            let blocks = (0..self.dim())
                .map(|axis| self.cell_gradient_stencil_axis(axis))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(assembly::stack_rows(&blocks))
        })
    }

    /// Unscaled cell differences onto the free faces normal to `axis`.
    pub fn cell_gradient_stencil_axis(
        &self,
        axis: usize,
    ) -> Result<&CsrMatrix<f64>, TreeMeshError> {
        LocationType::Faces(axis).check_dim(self.dim())?;
        self.cache.cell_gradient_stencil_axes[axis]
            .get_or_try_init(|| assembly::cell_gradient_stencil(self, axis))
    }

    /// Cell gradient with a caller supplied face inner product; not cached.
    pub fn cell_gradient_with(
        &self,
        inner_product: &impl FaceInnerProduct,
    ) -> Result<CsrMatrix<f64>, TreeMeshError> {
        let weights = self.gradient_face_weights(inner_product)?;
        Ok(assembly::cell_gradient(
            self.face_divergence()?,
            self.cell_volumes(),
            &weights,
        ))
    }

    /// `Pi * Minv` as a diagonal over the free faces.
    fn gradient_face_weights(
        &self,
        inner_product: &impl FaceInnerProduct,
    ) -> Result<Vec<f64>, TreeMeshError> {
        let mut weights = inner_product.inverse_face_mass(self)?;
        if weights.len() != self.n_faces()? {
            return Err(TreeMeshError::Configuration(format!(
                "inner product returned {} face weights for {} faces",
                weights.len(),
                self.n_faces()?
            )));
        }
        let mask = boundary::boundary_face_mask(self)?;
        for (w, on_boundary) in weights.iter_mut().zip(mask) {
            if on_boundary {
                *w = 0.0;
            }
        }
        Ok(weights)
    }

    /// Free face indices on each domain side, per axis group:
    /// `[x-, x+, y-, y+, (z-, z+)]`.
    pub fn face_boundary_indices(&self) -> Result<&[Vec<usize>], TreeMeshError> {
        self.cache
            .face_boundary
            .get_or_try_init(|| boundary::face_boundary_indices(self))
            .map(Vec::as_slice)
    }

    /// Diagonal projector over the free faces that zeroes boundary faces.
    pub fn interior_face_projection(&self) -> Result<CsrMatrix<f64>, TreeMeshError> {
        boundary::interior_face_projection(self)
    }

    /// Cell indices touching each domain side: `[x-, x+, y-, y+, (z-, z+)]`.
    pub fn cell_boundary_indices(&self) -> Vec<Vec<usize>> {
        boundary::cell_boundary_indices(self)
    }

    /// Sparse matrix mapping values on `location` to values at `points`.
    ///
    /// # Errors
    /// [`TreeMeshError::InvalidLocationType`] for z entities on a 2D mesh;
    /// [`TreeMeshError::OutOfBounds`] for a point outside the domain unless
    /// `zeros_outside` is set, in which case its row is empty.
    pub fn get_interpolation_matrix<P: AsRef<[f64]>>(
        &self,
        points: &[P],
        location: LocationType,
        zeros_outside: bool,
    ) -> Result<CsrMatrix<f64>, TreeMeshError> {
        interpolate::interpolation_matrix(self, points, location, zeros_outside)
    }

    /// Permutation sorting cells by grid position (x fastest, then y, then z).
    pub fn permute_cells(&self) -> CsrMatrix<f64> {
        permute::permute_cells(self)
    }

    /// Permutation sorting free faces by grid position within each axis group.
    pub fn permute_faces(&self) -> Result<CsrMatrix<f64>, TreeMeshError> {
        permute::permute_faces(self)
    }

    /// Permutation sorting free edges by grid position within each axis group.
    pub fn permute_edges(&self) -> Result<CsrMatrix<f64>, TreeMeshError> {
        permute::permute_edges(self)
    }

    // ----- queries ---------------------------------------------------------

    /// Index of the cell containing each point.
    ///
    /// Cells are half-open boxes, except that the upper domain bound belongs
    /// to the last cell along each axis.
    pub fn locate_points<P: AsRef<[f64]>>(
        &self,
        points: &[P],
    ) -> Result<Vec<usize>, TreeMeshError> {
        locate::locate_points(self, points)?
            .into_iter()
            .enumerate()
            .map(|(index, cell)| {
                cell.ok_or_else(|| TreeMeshError::OutOfBounds {
                    index,
                    point: points[index].as_ref().to_vec(),
                })
            })
            .collect()
    }

    /// Like [`TreeMesh::locate_points`], with `None` for points outside the domain.
    pub fn try_locate_points<P: AsRef<[f64]>>(
        &self,
        points: &[P],
    ) -> Result<Vec<Option<usize>>, TreeMeshError> {
        locate::locate_points(self, points)
    }

    /// Level of each cell.
    pub fn levels_of(&self, indices: &[usize]) -> Result<Vec<u8>, TreeMeshError> {
        indices
            .iter()
            .map(|&i| self.cell_key(i).map(|c| c.level))
            .collect()
    }

    /// Neighbors of cell `index` across its face normal to `axis` on `side`
    /// (0 = minus, 1 = plus).
    pub fn cell_neighbors(
        &self,
        index: usize,
        axis: usize,
        side: usize,
    ) -> Result<Neighbor<usize>, TreeMeshError> {
        LocationType::Faces(axis).check_dim(self.dim())?;
        if side > 1 {
            return Err(TreeMeshError::Configuration(format!(
                "face side must be 0 (minus) or 1 (plus), got {side}"
            )));
        }
        let key = self.cell_key(index)?;
        let mut missing = None;
        let neighbor = self
            .leaves
            .neighbor(&key, axis, side)
            .map(|k| match self.cell_index_of(&k) {
                Some(i) => i,
                None => {
                    missing = Some(k);
                    usize::MAX
                }
            });
        match missing {
            Some(k) => Err(TreeMeshError::InvariantViolation(format!(
                "neighbor {k:?} is not numbered"
            ))),
            None => Ok(neighbor),
        }
    }

    // ----- mutation --------------------------------------------------------

    /// Split every cell for which `select` holds, re-applying `select` to the
    /// children down to `max_level`, then restore 2:1 balance.
    ///
    /// `options.max_level`, when set, lowers the cap further.
    pub fn refine<F>(
        &mut self,
        options: &RefineOptions,
        max_level: u8,
        mut select: F,
    ) -> Result<RefineSummary, TreeMeshError>
    where
        F: FnMut(&CellInfo) -> bool,
    {
        let grid = &self.grid;
        let codec = *self.leaves.codec();
        let summary = refine_where(&mut self.leaves, options, max_level, |key| {
            select(&cell_info(grid, &codec, key))
        })?;
        if !summary.is_empty() {
            self.commit("refine");
        }
        Ok(summary)
    }

    /// Split cells until each reaches the level returned by `target`; the
    /// targets themselves bound the depth.
    pub fn refine_to_level<F>(
        &mut self,
        options: &RefineOptions,
        mut target: F,
    ) -> Result<RefineSummary, TreeMeshError>
    where
        F: FnMut(&CellInfo) -> u8,
    {
        let max_level = self.max_level();
        self.refine(options, max_level, |cell| cell.level < target(cell))
    }

    /// Split each listed cell once, then restore balance.
    pub fn refine_cells(
        &mut self,
        options: &RefineOptions,
        indices: &[usize],
    ) -> Result<RefineSummary, TreeMeshError> {
        let keys = indices
            .iter()
            .map(|&i| self.cell_key(i))
            .collect::<Result<Vec<_>, _>>()?;
        let summary = refine_keys(&mut self.leaves, options, &keys)?;
        if !summary.is_empty() {
            self.commit("refine_cells");
        }
        Ok(summary)
    }

    /// Refine so that the cell containing `points[i]` reaches `levels[i]`.
    pub fn refine_points<P: AsRef<[f64]>>(
        &mut self,
        options: &RefineOptions,
        points: &[P],
        levels: &[u8],
    ) -> Result<RefineSummary, TreeMeshError> {
        if points.len() != levels.len() {
            return Err(TreeMeshError::Configuration(format!(
                "{} points but {} levels",
                points.len(),
                levels.len()
            )));
        }
        let positions = locate::finest_positions(&self.grid, points)?;
        let mut targets = Vec::with_capacity(points.len());
        for (index, (position, level)) in positions.into_iter().zip(levels).enumerate() {
            let position = position.ok_or_else(|| TreeMeshError::OutOfBounds {
                index,
                point: points[index].as_ref().to_vec(),
            })?;
            targets.push((position, *level));
        }
        let summary = refine_towards(&mut self.leaves, options, &targets)?;
        if !summary.is_empty() {
            self.commit("refine_points");
        }
        Ok(summary)
    }

    /// Merge complete sibling groups whose members all satisfy `select`.
    ///
    /// Groups that are incomplete, partially selected or whose merge would
    /// break 2:1 balance are left in place and listed in the report.
    pub fn coarsen<F>(&mut self, mut select: F) -> Result<CoarsenReport, TreeMeshError>
    where
        F: FnMut(&CellInfo) -> bool,
    {
        let grid = &self.grid;
        let codec = *self.leaves.codec();
        let report =
            coarsen_where(&mut self.leaves, |key| select(&cell_info(grid, &codec, key)))?;
        if !report.merged.is_empty() {
            self.commit("coarsen");
        }
        Ok(report)
    }

    /// Merge the sibling groups formed by the listed cells.
    pub fn coarsen_cells(&mut self, indices: &[usize]) -> Result<CoarsenReport, TreeMeshError> {
        let keys = indices
            .iter()
            .map(|&i| self.cell_key(i))
            .collect::<Result<BTreeSet<_>, _>>()?;
        self.coarsen(|cell| keys.contains(&cell.key))
    }
}

fn cell_info(grid: &TensorGrid, codec: &KeyCodec, key: &CellKey) -> CellInfo {
    let size = codec.size(key.level);
    CellInfo {
        key: *key,
        level: key.level,
        center: metrics::cell_center(grid, &key.anchor, size),
        widths: metrics::cell_widths(grid, &key.anchor, size),
    }
}

impl PartialEq for TreeMesh {
    /// Meshes are equal when they share the base grid and leaf set.
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid && self.leaves == other.leaves
    }
}

impl InvalidateCache for TreeMesh {
    fn invalidate_cache(&mut self) {
        self.cache.invalidate_cache();
        self.generation += 1;
    }
}

impl DebugInvariants for TreeMesh {
    fn validate_invariants(&self) -> Result<(), TreeMeshError> {
        self.leaves.check_tiling()?;
        self.leaves.check_balance()?;
        if self.cells.len() != self.leaves.len() || self.cell_lookup.len() != self.cells.len() {
            return Err(TreeMeshError::InvariantViolation(format!(
                "{} numbered cells for {} leaves",
                self.cells.len(),
                self.leaves.len()
            )));
        }
        if let Some(entities) = self.cache.entities.get() {
            entities.validate()?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.dim() == 2 { "QuadTree" } else { "OcTree" };
        writeln!(
            f,
            "{kind}Mesh: {:.2}% filled",
            100.0 * self.fill()
        )?;
        writeln!(f)?;
        writeln!(f, "Level : Number of cells")?;
        writeln!(f, "-----------------------")?;
        for (level, count) in self.cells_per_level().iter().enumerate() {
            if *count > 0 {
                writeln!(f, "{level:>5} : {count}")?;
            }
        }
        writeln!(f, "-----------------------")?;
        writeln!(f, "Total : {}", self.n_cells())?;
        writeln!(f)?;
        let (lo, hi) = self.domain();
        let axes = ['x', 'y', 'z'];
        for axis in 0..self.dim() {
            writeln!(
                f,
                "{}: [{:.4}, {:.4}], {} base cells",
                axes[axis],
                lo[axis],
                hi[axis],
                self.grid.h()[axis].len()
            )?;
        }
        Ok(())
    }
}

//! Entity enumerator: nodes, edges and faces of the leaf set.
//!
//! Entities are identified by the exact integer location of their center in
//! doubled finest units, which is unique across levels. Each group (nodes,
//! edges along one axis, faces normal to one axis) is numbered independently:
//! free entities first, in lexicographic order of location with x as the
//! primary key, then hanging entities in the same order.
//!
//! An entity hangs when a coarser leaf touches it: the finer side's entity is
//! then a sub-entity of (or lies inside) the coarser leaf's entity and its
//! value is reconstructed from that leaf's entities. Chains of hanging
//! entities are resolved down to free entities, so every constraint
//! references free indices only.

use crate::data::hanging_constraints::{HangingConstraints, LinearConstraintTerm};
use crate::mesh_error::TreeMeshError;
use crate::topology::key::{CellKey, KeyCodec};
use crate::topology::location::LocationType;
use crate::topology::tree::LeafSet;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};

/// Center of an entity in doubled finest units.
pub type Location = [u64; 3];

/// Location of corner `corner` (bit `i` set = upper side along axis `i`) of `key`.
pub fn corner_location(codec: &KeyCodec, key: &CellKey, corner: usize) -> Location {
    let size = u64::from(codec.size(key.level));
    let mut loc = [0u64; 3];
    for axis in 0..codec.dim() {
        let offset = if (corner >> axis) & 1 == 1 { size } else { 0 };
        loc[axis] = 2 * (u64::from(key.anchor[axis]) + offset);
    }
    loc
}

/// Location of the face of `key` normal to `axis` on `side` (0 = minus, 1 = plus).
pub fn face_location(codec: &KeyCodec, key: &CellKey, axis: usize, side: usize) -> Location {
    let size = u64::from(codec.size(key.level));
    let mut loc = [0u64; 3];
    for b in 0..codec.dim() {
        let a = u64::from(key.anchor[b]);
        loc[b] = if b == axis {
            2 * (a + side as u64 * size)
        } else {
            2 * a + size
        };
    }
    loc
}

/// Location of the edge of `key` along `axis` at corner `corner`; the bit of
/// `axis` itself is ignored.
pub fn edge_location(codec: &KeyCodec, key: &CellKey, axis: usize, corner: usize) -> Location {
    let size = u64::from(codec.size(key.level));
    let mut loc = [0u64; 3];
    for b in 0..codec.dim() {
        let a = u64::from(key.anchor[b]);
        loc[b] = if b == axis {
            2 * a + size
        } else if (corner >> b) & 1 == 1 {
            2 * (a + size)
        } else {
            2 * a
        };
    }
    loc
}

/// The corner masks of the edges of one cell along `axis`, in order of
/// increasing location (the remaining axes vary with the lowest fastest).
pub fn edge_corners(dim: usize, axis: usize) -> Vec<usize> {
    (0..1usize << dim).filter(|c| (c >> axis) & 1 == 0).collect()
}

/// Numbering and hanging constraints of one entity group.
#[derive(Clone, Debug, Default)]
pub struct EntityGroup {
    /// Locations, free entities first.
    locations: Vec<Location>,
    /// Extent along the entity's tangential axes in finest units (0 for nodes).
    sizes: Vec<u32>,
    lookup: HashMap<Location, usize>,
    constraints: HangingConstraints,
}

impl EntityGroup {
    #[inline]
    pub fn n_total(&self) -> usize {
        self.locations.len()
    }

    /// Number of free (non-hanging) entities.
    #[inline]
    pub fn n_free(&self) -> usize {
        self.constraints.n_free()
    }

    #[inline]
    pub fn n_hanging(&self) -> usize {
        self.constraints.n_hanging()
    }

    #[inline]
    pub fn is_hanging(&self, index: usize) -> bool {
        index >= self.n_free()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    #[inline]
    pub fn location(&self, index: usize) -> Location {
        self.locations[index]
    }

    #[inline]
    pub fn size(&self, index: usize) -> u32 {
        self.sizes[index]
    }

    pub fn index_of(&self, location: &Location) -> Option<usize> {
        self.lookup.get(location).copied()
    }

    /// Index of an entity that must exist, such as the entity of a leaf.
    pub fn require(&self, location: &Location) -> Result<usize, TreeMeshError> {
        self.index_of(location).ok_or_else(|| {
            TreeMeshError::InvariantViolation(format!("no entity at location {location:?}"))
        })
    }

    pub fn constraints(&self) -> &HangingConstraints {
        &self.constraints
    }

    /// Free entities and weights that entity `index` is made of.
    pub fn terms(&self, index: usize) -> Vec<LinearConstraintTerm> {
        self.constraints.terms(index)
    }
}

/// All entity groups of one leaf set.
#[derive(Clone, Debug)]
pub struct Entities {
    dim: usize,
    nodes: EntityGroup,
    /// Edges along x, y (and z).
    edges: Vec<EntityGroup>,
    /// Faces normal to x, y (and z).
    faces: Vec<EntityGroup>,
}

/// An entity found on some leaf, with its direct (unresolved) parents if it hangs.
struct Candidate {
    size: u32,
    parents: Option<Vec<(Location, f64)>>,
}

impl Entities {
    /// Enumerate and classify the entities of a balanced leaf set.
    pub fn build(leaves: &LeafSet) -> Result<Self, TreeMeshError> {
        let codec = *leaves.codec();
        let dim = codec.dim();

        let mut nodes = BTreeMap::new();
        let mut edges = vec![BTreeMap::new(); dim];
        let mut faces = vec![BTreeMap::new(); dim];
        for key in leaves.iter() {
            let size = codec.size(key.level);
            for corner in 0..codec.n_children() {
                nodes.entry(corner_location(&codec, key, corner)).or_insert(0);
            }
            for axis in 0..dim {
                for corner in edge_corners(dim, axis) {
                    edges[axis]
                        .entry(edge_location(&codec, key, axis, corner))
                        .or_insert(size);
                }
                for side in 0..2 {
                    faces[axis]
                        .entry(face_location(&codec, key, axis, side))
                        .or_insert(size);
                }
            }
        }

        let nodes = classify(nodes, |loc, _| node_parents(leaves, loc))?;
        let edges = edges
            .into_iter()
            .enumerate()
            .map(|(axis, group)| {
                classify(group, |loc, size| edge_parents(leaves, axis, loc, size))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let faces = faces
            .into_iter()
            .enumerate()
            .map(|(axis, group)| {
                classify(group, |loc, size| face_parents(leaves, axis, loc, size))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            dim,
            nodes,
            edges,
            faces,
        })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nodes(&self) -> &EntityGroup {
        &self.nodes
    }

    /// Edges along `axis`.
    pub fn edges(&self, axis: usize) -> &EntityGroup {
        &self.edges[axis]
    }

    /// Faces normal to `axis`.
    pub fn faces(&self, axis: usize) -> &EntityGroup {
        &self.faces[axis]
    }

    /// The group values of `location` live on; `None` for cell centers.
    pub fn group(&self, location: LocationType) -> Result<Option<&EntityGroup>, TreeMeshError> {
        Ok(match location.check_dim(self.dim)? {
            LocationType::Nodes => Some(&self.nodes),
            LocationType::CellCenters => None,
            LocationType::Edges(axis) => Some(&self.edges[axis]),
            LocationType::Faces(axis) => Some(&self.faces[axis]),
        })
    }

    /// Start of each face group in the global free face numbering, plus the total.
    pub fn face_offsets(&self) -> Vec<usize> {
        offsets(&self.faces)
    }

    /// Start of each edge group in the global free edge numbering, plus the total.
    pub fn edge_offsets(&self) -> Vec<usize> {
        offsets(&self.edges)
    }

    pub fn n_faces(&self) -> usize {
        self.faces.iter().map(EntityGroup::n_free).sum()
    }

    pub fn n_total_faces(&self) -> usize {
        self.faces.iter().map(EntityGroup::n_total).sum()
    }

    pub fn n_hanging_faces(&self) -> usize {
        self.faces.iter().map(EntityGroup::n_hanging).sum()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.iter().map(EntityGroup::n_free).sum()
    }

    pub fn n_total_edges(&self) -> usize {
        self.edges.iter().map(EntityGroup::n_total).sum()
    }

    pub fn n_hanging_edges(&self) -> usize {
        self.edges.iter().map(EntityGroup::n_hanging).sum()
    }

    /// Check every group's constraints.
    pub fn validate(&self) -> Result<(), TreeMeshError> {
        std::iter::once(&self.nodes)
            .chain(&self.edges)
            .chain(&self.faces)
            .try_for_each(|group| group.constraints.validate())
    }
}

fn offsets(groups: &[EntityGroup]) -> Vec<usize> {
    let mut out = Vec::with_capacity(groups.len() + 1);
    let mut acc = 0;
    out.push(0);
    for group in groups {
        acc += group.n_free();
        out.push(acc);
    }
    out
}

/// Number a group and resolve its hanging entities to free ones.
fn classify<F>(
    found: BTreeMap<Location, u32>,
    mut parents_of: F,
) -> Result<EntityGroup, TreeMeshError>
where
    F: FnMut(&Location, u32) -> Option<Vec<(Location, f64)>>,
{
    let candidates: BTreeMap<Location, Candidate> = found
        .into_iter()
        .map(|(loc, size)| {
            let parents = parents_of(&loc, size);
            (loc, Candidate { size, parents })
        })
        .collect();

    let (free, hanging): (Vec<_>, Vec<_>) = candidates
        .iter()
        .partition(|(_, candidate)| candidate.parents.is_none());
    let n_free = free.len();
    let mut locations = Vec::with_capacity(candidates.len());
    let mut sizes = Vec::with_capacity(candidates.len());
    let mut lookup = HashMap::with_capacity(candidates.len());
    for (loc, candidate) in free.iter().chain(hanging.iter()) {
        lookup.insert(**loc, locations.len());
        locations.push(**loc);
        sizes.push(candidate.size);
    }

    let mut constraints = HangingConstraints::new(n_free);
    let mut memo = HashMap::new();
    for (index, loc) in locations.iter().enumerate().skip(n_free) {
        let terms = resolve(loc, &candidates, &lookup, &mut memo)?;
        constraints.insert_constraint(index, terms);
    }
    Ok(EntityGroup {
        locations,
        sizes,
        lookup,
        constraints,
    })
}

fn resolve(
    loc: &Location,
    candidates: &BTreeMap<Location, Candidate>,
    lookup: &HashMap<Location, usize>,
    memo: &mut HashMap<Location, Vec<LinearConstraintTerm>>,
) -> Result<Vec<LinearConstraintTerm>, TreeMeshError> {
    if let Some(terms) = memo.get(loc) {
        return Ok(terms.clone());
    }
    let missing = || {
        TreeMeshError::InvariantViolation(format!("hanging entity parent {loc:?} does not exist"))
    };
    let candidate = candidates.get(loc).ok_or_else(missing)?;
    let terms = match &candidate.parents {
        None => vec![LinearConstraintTerm::new(*lookup.get(loc).ok_or_else(missing)?, 1.0)],
        Some(parents) => {
            let mut acc: BTreeMap<usize, f64> = BTreeMap::new();
            for (parent, weight) in parents {
                for term in resolve(parent, candidates, lookup, memo)? {
                    *acc.entry(term.index).or_default() += weight * term.weight;
                }
            }
            acc.into_iter()
                .map(|(index, weight)| LinearConstraintTerm::new(index, weight))
                .collect()
        }
    };
    memo.insert(*loc, terms.clone());
    Ok(terms)
}

/// Leaves containing the finest cells around a position: for each axis in
/// `axes`, the cell just below (`q - 1`) and just above (`q`) the coordinate.
fn touching_leaves(leaves: &LeafSet, base: [u64; 3], axes: &[usize]) -> Vec<CellKey> {
    let extent = leaves.codec().extent();
    let mut out: Vec<CellKey> = Vec::new();
    for mask in 0..1usize << axes.len() {
        let mut p = base;
        let mut inside = true;
        for (bit, &axis) in axes.iter().enumerate() {
            if (mask >> bit) & 1 == 0 {
                match p[axis].checked_sub(1) {
                    Some(v) => p[axis] = v,
                    None => inside = false,
                }
            } else if p[axis] >= extent[axis] {
                inside = false;
            }
        }
        if !inside {
            continue;
        }
        if let Some(leaf) = leaves.leaf_at(&p) {
            if !out.contains(&leaf) {
                out.push(leaf);
            }
        }
    }
    out
}

/// Linear weights of the entities of `leaf` spanning position `q` (finest
/// units) along `axes`, where `axes` are the perpendicular directions the
/// child entity may lie strictly inside `leaf` on. Returns `(corner mask, weight)`.
fn multilinear(
    codec: &KeyCodec,
    leaf: &CellKey,
    q: &[u64; 3],
    axes: &[usize],
) -> Vec<(usize, f64)> {
    let size = u64::from(codec.size(leaf.level));
    let mut fixed = 0usize;
    let mut interior = Vec::new();
    for &axis in axes {
        let a = u64::from(leaf.anchor[axis]);
        if q[axis] == a {
            continue;
        } else if q[axis] == a + size {
            fixed |= 1 << axis;
        } else {
            interior.push((axis, (q[axis] - a) as f64 / size as f64));
        }
    }
    (0..1usize << interior.len())
        .map(|mask| {
            let mut corner = fixed;
            let mut weight = 1.0;
            for (bit, (axis, t)) in interior.iter().enumerate() {
                if (mask >> bit) & 1 == 1 {
                    corner |= 1 << axis;
                    weight *= t;
                } else {
                    weight *= 1.0 - t;
                }
            }
            (corner, weight)
        })
        .collect()
}

fn coarsest(candidates: impl IntoIterator<Item = CellKey>) -> Option<CellKey> {
    candidates.into_iter().min_by_key(|leaf| (leaf.level, *leaf))
}

fn node_parents(leaves: &LeafSet, loc: &Location) -> Option<Vec<(Location, f64)>> {
    let codec = leaves.codec();
    let dim = codec.dim();
    let q = [loc[0] / 2, loc[1] / 2, loc[2] / 2];
    let axes: Vec<usize> = (0..dim).collect();
    let is_corner = |leaf: &CellKey| {
        let size = u64::from(codec.size(leaf.level));
        axes.iter().all(|&axis| {
            let a = u64::from(leaf.anchor[axis]);
            q[axis] == a || q[axis] == a + size
        })
    };
    let owner = coarsest(
        touching_leaves(leaves, q, &axes)
            .into_iter()
            .filter(|leaf| !is_corner(leaf)),
    )?;
    Some(
        multilinear(codec, &owner, &q, &axes)
            .into_iter()
            .map(|(corner, w)| (corner_location(codec, &owner, corner), w))
            .collect(),
    )
}

fn edge_parents(
    leaves: &LeafSet,
    axis: usize,
    loc: &Location,
    size: u32,
) -> Option<Vec<(Location, f64)>> {
    let codec = leaves.codec();
    let perp: Vec<usize> = (0..codec.dim()).filter(|b| *b != axis).collect();
    let mut q = [loc[0] / 2, loc[1] / 2, loc[2] / 2];
    q[axis] = (loc[axis] - u64::from(size)) / 2;
    let owner = coarsest(
        touching_leaves(leaves, q, &perp)
            .into_iter()
            .filter(|leaf| codec.size(leaf.level) > size),
    )?;
    Some(
        multilinear(codec, &owner, &q, &perp)
            .into_iter()
            .map(|(corner, w)| (edge_location(codec, &owner, axis, corner), w))
            .collect(),
    )
}

fn face_parents(
    leaves: &LeafSet,
    axis: usize,
    loc: &Location,
    size: u32,
) -> Option<Vec<(Location, f64)>> {
    let codec = leaves.codec();
    let mut q = [0u64; 3];
    for b in 0..codec.dim() {
        q[b] = if b == axis {
            loc[b] / 2
        } else {
            (loc[b] - u64::from(size)) / 2
        };
    }
    let owner = coarsest(
        touching_leaves(leaves, q, &[axis])
            .into_iter()
            .filter(|leaf| codec.size(leaf.level) > size),
    )?;
    let side = usize::from(u64::from(owner.anchor[axis]) != q[axis]);
    Some(vec![(face_location(codec, &owner, axis, side), 1.0)])
}

/// Group sizes in a compact `free/total` form, for logs.
pub(crate) fn describe(entities: &Entities) -> String {
    let axes = ['x', 'y', 'z'];
    let groups = (0..entities.dim)
        .map(|a| {
            format!(
                "E{0} {1}/{2} F{0} {3}/{4}",
                axes[a],
                entities.edges[a].n_free(),
                entities.edges[a].n_total(),
                entities.faces[a].n_free(),
                entities.faces[a].n_total()
            )
        })
        .join(", ");
    format!(
        "N {}/{}, {groups}",
        entities.nodes.n_free(),
        entities.nodes.n_total()
    )
}

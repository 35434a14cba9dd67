//! Location types: the kinds of mesh entities values can live on.

use crate::mesh_error::TreeMeshError;
use std::fmt;
use std::str::FromStr;

/// Where a discrete quantity is located.
///
/// Edges are identified by the axis they run along, faces by their normal axis.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LocationType {
    /// Cell corners.
    Nodes,
    /// Cell centers.
    CellCenters,
    Edges(usize),
    Faces(usize),
}

impl LocationType {
    /// Check that the location exists on a mesh of dimension `dim`.
    pub fn check_dim(self, dim: usize) -> Result<Self, TreeMeshError> {
        match self {
            LocationType::Edges(axis) | LocationType::Faces(axis) if axis >= dim => {
                Err(TreeMeshError::InvalidLocationType(format!("{self} on a {dim}D mesh")))
            }
            _ => Ok(self),
        }
    }
}

const AXES: [char; 3] = ['x', 'y', 'z'];

fn write_axis(f: &mut fmt::Formatter<'_>, kind: char, axis: usize) -> fmt::Result {
    match AXES.get(axis) {
        Some(name) => write!(f, "{kind}{name}"),
        None => write!(f, "{kind}{axis}"),
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationType::Nodes => f.write_str("N"),
            LocationType::CellCenters => f.write_str("CC"),
            LocationType::Edges(axis) => write_axis(f, 'E', *axis),
            LocationType::Faces(axis) => write_axis(f, 'F', *axis),
        }
    }
}

impl FromStr for LocationType {
    type Err = TreeMeshError;

    /// Accepts the short codes `N`, `CC`, `Ex`..`Fz` and the long names
    /// `nodes`, `cell_centers`, `edges_x`..`faces_z`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let axis = |c: &str| match c {
            "x" => Some(0),
            "y" => Some(1),
            "z" => Some(2),
            _ => None,
        };
        let parsed = match s {
            "N" | "nodes" => Some(LocationType::Nodes),
            "CC" | "cell_centers" => Some(LocationType::CellCenters),
            _ => {
                if let Some(rest) = s.strip_prefix("edges_").or_else(|| s.strip_prefix('E')) {
                    axis(rest).map(LocationType::Edges)
                } else if let Some(rest) =
                    s.strip_prefix("faces_").or_else(|| s.strip_prefix('F'))
                {
                    axis(rest).map(LocationType::Faces)
                } else {
                    None
                }
            }
        };
        parsed.ok_or_else(|| TreeMeshError::InvalidLocationType(s.to_string()))
    }
}

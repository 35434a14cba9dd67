//! Geometry metrics of tree entities: centers, widths, volumes, areas, lengths.
//!
//! All inputs are integer tree quantities (anchors and sizes in finest units,
//! locations in doubled finest units); the [`TensorGrid`] maps them to
//! physical space. Components beyond the mesh dimension are returned as 0.

use crate::geometry::grid::TensorGrid;
use crate::topology::entities::Location;

/// Physical coordinates of an entity location.
pub fn point(grid: &TensorGrid, loc: &Location) -> [f64; 3] {
    let mut x = [0.0; 3];
    for (axis, v) in x.iter_mut().enumerate().take(grid.dim()) {
        *v = grid.coordinate(axis, loc[axis]);
    }
    x
}

/// Center of the cell anchored at `anchor` with side `size`.
pub fn cell_center(grid: &TensorGrid, anchor: &[u32; 3], size: u32) -> [f64; 3] {
    let mut loc = [0u64; 3];
    for (axis, l) in loc.iter_mut().enumerate().take(grid.dim()) {
        *l = 2 * u64::from(anchor[axis]) + u64::from(size);
    }
    point(grid, &loc)
}

/// Physical widths of a cell along each axis.
pub fn cell_widths(grid: &TensorGrid, anchor: &[u32; 3], size: u32) -> [f64; 3] {
    let mut w = [0.0; 3];
    for (axis, v) in w.iter_mut().enumerate().take(grid.dim()) {
        *v = grid.length(axis, u64::from(anchor[axis]), u64::from(size));
    }
    w
}

/// Area (3D) or length (2D) of a cell.
pub fn cell_volume(grid: &TensorGrid, anchor: &[u32; 3], size: u32) -> f64 {
    cell_widths(grid, anchor, size)
        .iter()
        .take(grid.dim())
        .product()
}

/// Extent of an entity along `axis`, given its center location and size.
fn span(grid: &TensorGrid, axis: usize, loc: &Location, size: u32) -> f64 {
    let start = (loc[axis] - u64::from(size)) / 2;
    grid.length(axis, start, u64::from(size))
}

/// Area of a face normal to `axis` (a length in 2D).
pub fn face_area(grid: &TensorGrid, axis: usize, loc: &Location, size: u32) -> f64 {
    (0..grid.dim())
        .filter(|b| *b != axis)
        .map(|b| span(grid, b, loc, size))
        .product()
}

/// Length of an edge along `axis`.
pub fn edge_length(grid: &TensorGrid, axis: usize, loc: &Location, size: u32) -> f64 {
    span(grid, axis, loc, size)
}

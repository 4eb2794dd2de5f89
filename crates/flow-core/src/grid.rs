// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Partitioned Grid
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Regular 2D partitioning of a grid and the partitioned container the
//! accumulation engine reads from and writes to.
//!
//! Partitions are laid out row-major: `tiles[row * pcols + col]`. Each
//! partition is placed on a compute node; nodes own contiguous runs of
//! partitions.

use flow_types::config::LayoutConfig;
use flow_types::direction::Offset;
use flow_types::error::{FlowError, FlowResult};
use ndarray::{s, Array2};
use std::sync::Arc;

/// Compute node hosting a set of partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Location-independent name of a partition: the node holding it plus its
/// position in the partition grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionAddress {
    pub node: NodeId,
    pub row: usize,
    pub col: usize,
}

/// Partition descriptor, one per partition in a (prows × pcols) layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionTile {
    /// Linear index (0 .. prows*pcols - 1).
    pub index: usize,
    /// Position in the partition grid.
    pub row: usize,
    pub col: usize,
    /// Partition grid dimensions.
    pub prows: usize,
    pub pcols: usize,
    /// Owned row range [row_start, row_end) in global indexing.
    pub row_start: usize,
    pub row_end: usize,
    /// Owned column range [col_start, col_end) in global indexing.
    pub col_start: usize,
    pub col_end: usize,
    pub node: NodeId,
}

impl PartitionTile {
    pub fn nr_rows(&self) -> usize {
        self.row_end - self.row_start
    }
    pub fn nr_cols(&self) -> usize {
        self.col_end - self.col_start
    }
    pub fn shape(&self) -> (usize, usize) {
        (self.nr_rows(), self.nr_cols())
    }
    pub fn address(&self) -> PartitionAddress {
        PartitionAddress {
            node: self.node,
            row: self.row,
            col: self.col,
        }
    }
    /// Position of the partition at `offset` in the partition grid.
    /// Returns None if out of bounds.
    pub fn neighbour(&self, offset: Offset) -> Option<(usize, usize)> {
        let row = self.row as isize + offset.row as isize;
        let col = self.col as isize + offset.col as isize;
        if row < 0 || row >= self.prows as isize || col < 0 || col >= self.pcols as isize {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// Decompose a grid of shape (nrows × ncols) into (prows × pcols)
/// partitions spread over `nr_nodes` nodes.
///
/// Returns tiles in row-major order.
pub fn decompose_2d(
    nrows: usize,
    ncols: usize,
    prows: usize,
    pcols: usize,
    nr_nodes: usize,
) -> FlowResult<Vec<PartitionTile>> {
    if prows == 0 || pcols == 0 {
        return Err(FlowError::Partitioning(
            "Partition grid dimensions must be >= 1".to_string(),
        ));
    }
    if prows > nrows || pcols > ncols {
        return Err(FlowError::Partitioning(format!(
            "Cannot split ({nrows}×{ncols}) into ({prows}×{pcols}) partitions"
        )));
    }
    if nr_nodes == 0 {
        return Err(FlowError::Partitioning(
            "At least one compute node is required".to_string(),
        ));
    }

    // Distribute rows/columns as evenly as possible.
    let row_splits = balanced_split(nrows, prows);
    let col_splits = balanced_split(ncols, pcols);
    let nr_partitions = prows * pcols;

    let mut tiles = Vec::with_capacity(nr_partitions);
    let mut row_cursor = 0usize;
    for (ir, &nr_local) in row_splits.iter().enumerate() {
        let row_start = row_cursor;
        let row_end = row_start + nr_local;
        row_cursor = row_end;

        let mut col_cursor = 0usize;
        for (ic, &nc_local) in col_splits.iter().enumerate() {
            let col_start = col_cursor;
            let col_end = col_start + nc_local;
            col_cursor = col_end;

            let index = ir * pcols + ic;
            tiles.push(PartitionTile {
                index,
                row: ir,
                col: ic,
                prows,
                pcols,
                row_start,
                row_end,
                col_start,
                col_end,
                node: NodeId(index * nr_nodes / nr_partitions),
            });
        }
    }
    Ok(tiles)
}

/// Helper: split `n` items across `k` buckets as evenly as possible.
fn balanced_split(n: usize, k: usize) -> Vec<usize> {
    let base = n / k;
    let rem = n % k;
    (0..k).map(|i| base + usize::from(i < rem)).collect()
}

/// Shape, partitioning and node placement shared by all grids of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    shape: (usize, usize),
    shape_in_partitions: (usize, usize),
    nr_nodes: usize,
    tiles: Vec<PartitionTile>,
}

impl GridLayout {
    pub fn new(
        shape: (usize, usize),
        shape_in_partitions: (usize, usize),
        nr_nodes: usize,
    ) -> FlowResult<Self> {
        let tiles = decompose_2d(
            shape.0,
            shape.1,
            shape_in_partitions.0,
            shape_in_partitions.1,
            nr_nodes,
        )?;
        Ok(GridLayout {
            shape,
            shape_in_partitions,
            nr_nodes,
            tiles,
        })
    }

    pub fn from_config(cfg: &LayoutConfig) -> FlowResult<Self> {
        cfg.validate()?;
        Self::new(
            (cfg.grid_shape[0], cfg.grid_shape[1]),
            (cfg.partitions[0], cfg.partitions[1]),
            cfg.nodes,
        )
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn shape_in_partitions(&self) -> (usize, usize) {
        self.shape_in_partitions
    }

    pub fn nr_partitions(&self) -> usize {
        self.tiles.len()
    }

    pub fn nr_nodes(&self) -> usize {
        self.nr_nodes
    }

    pub fn tiles(&self) -> &[PartitionTile] {
        &self.tiles
    }

    pub fn tile(&self, row: usize, col: usize) -> Option<&PartitionTile> {
        let (prows, pcols) = self.shape_in_partitions;
        if row >= prows || col >= pcols {
            return None;
        }
        self.tiles.get(row * pcols + col)
    }

    /// Check that `other` has the same shape, partitioning and placement.
    pub fn verify_compatible(&self, other: &GridLayout, what: &str) -> FlowResult<()> {
        if self.shape != other.shape {
            return Err(FlowError::ShapeMismatch(format!(
                "{what} has shape {:?}, expected {:?}",
                other.shape, self.shape
            )));
        }
        if self != other {
            return Err(FlowError::Partitioning(format!(
                "{what} is partitioned {:?} over {} nodes, expected {:?} over {} nodes",
                other.shape_in_partitions, other.nr_nodes, self.shape_in_partitions, self.nr_nodes
            )));
        }
        Ok(())
    }
}

/// A grid split into partitions according to a shared [`GridLayout`].
///
/// Partition data is immutable once created and shared by reference count.
#[derive(Debug, Clone)]
pub struct PartitionedGrid<E> {
    layout: Arc<GridLayout>,
    partitions: Vec<Arc<Array2<E>>>,
}

impl<E> PartitionedGrid<E> {
    /// Assemble from per-partition arrays in row-major partition order.
    pub fn from_partitions(layout: Arc<GridLayout>, partitions: Vec<Array2<E>>) -> FlowResult<Self> {
        if partitions.len() != layout.nr_partitions() {
            return Err(FlowError::Partitioning(format!(
                "{} partitions given for a layout of {}",
                partitions.len(),
                layout.nr_partitions()
            )));
        }
        for (tile, data) in layout.tiles().iter().zip(&partitions) {
            if data.dim() != tile.shape() {
                return Err(FlowError::ShapeMismatch(format!(
                    "Partition ({}, {}) has shape {:?}, expected {:?}",
                    tile.row,
                    tile.col,
                    data.dim(),
                    tile.shape()
                )));
            }
        }
        Ok(PartitionedGrid {
            layout,
            partitions: partitions.into_iter().map(Arc::new).collect(),
        })
    }

    pub(crate) fn from_shared(layout: Arc<GridLayout>, partitions: Vec<Arc<Array2<E>>>) -> Self {
        PartitionedGrid { layout, partitions }
    }

    pub fn layout(&self) -> &Arc<GridLayout> {
        &self.layout
    }

    pub fn shape(&self) -> (usize, usize) {
        self.layout.shape()
    }

    pub fn shape_in_partitions(&self) -> (usize, usize) {
        self.layout.shape_in_partitions()
    }

    pub fn nr_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition(&self, row: usize, col: usize) -> Option<&Arc<Array2<E>>> {
        let tile = self.layout.tile(row, col)?;
        self.partitions.get(tile.index)
    }

    /// Partitions paired with their tiles, row-major.
    pub fn partitions(&self) -> impl Iterator<Item = (&PartitionTile, &Arc<Array2<E>>)> {
        self.layout.tiles().iter().zip(self.partitions.iter())
    }

    pub fn verify_compatible<F>(&self, other: &PartitionedGrid<F>, what: &str) -> FlowResult<()> {
        self.layout.verify_compatible(&other.layout, what)
    }
}

impl<E: Clone> PartitionedGrid<E> {
    /// Split a global array into partitions.
    pub fn from_array(global: &Array2<E>, layout: Arc<GridLayout>) -> FlowResult<Self> {
        if global.dim() != layout.shape() {
            return Err(FlowError::ShapeMismatch(format!(
                "Array shape {:?} doesn't match layout shape {:?}",
                global.dim(),
                layout.shape()
            )));
        }
        let partitions = layout
            .tiles()
            .iter()
            .map(|tile| {
                global
                    .slice(s![tile.row_start..tile.row_end, tile.col_start..tile.col_end])
                    .to_owned()
            })
            .collect();
        Self::from_partitions(layout, partitions)
    }

    /// Grid with every cell set to `value`.
    pub fn filled(layout: Arc<GridLayout>, value: E) -> Self {
        let partitions = layout
            .tiles()
            .iter()
            .map(|tile| Arc::new(Array2::from_elem(tile.shape(), value.clone())))
            .collect();
        PartitionedGrid { layout, partitions }
    }

    /// Stitch all partitions back into one global array.
    pub fn to_array(&self) -> Array2<E> {
        let (_, pcols) = self.layout.shape_in_partitions();
        let tiles = self.layout.tiles();
        let row_owner: Vec<(usize, usize)> = tiles
            .iter()
            .filter(|t| t.col == 0)
            .flat_map(|t| (0..t.nr_rows()).map(move |r| (t.row, r)))
            .collect();
        let col_owner: Vec<(usize, usize)> = tiles
            .iter()
            .filter(|t| t.row == 0)
            .flat_map(|t| (0..t.nr_cols()).map(move |c| (t.col, c)))
            .collect();
        Array2::from_shape_fn(self.shape(), |(r, c)| {
            let (prow, lr) = row_owner[r];
            let (pcol, lc) = col_owner[c];
            self.partitions[prow * pcols + pcol][[lr, lc]].clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grid(nrows: usize, ncols: usize) -> Array2<f64> {
        Array2::from_shape_fn((nrows, ncols), |(i, j)| (i as f64) * 10.0 + j as f64)
    }

    #[test]
    fn test_decompose_2d_covers_full_domain() {
        let tiles = decompose_2d(32, 24, 4, 3, 2).expect("decompose_2d");
        assert_eq!(tiles.len(), 12);
        // Every global (r, c) must be owned by exactly one tile.
        let mut coverage = Array2::<u8>::zeros((32, 24));
        for t in &tiles {
            for r in t.row_start..t.row_end {
                for c in t.col_start..t.col_end {
                    coverage[[r, c]] += 1;
                }
            }
        }
        assert!(coverage.iter().all(|&c| c == 1), "Every cell owned by exactly one tile");
    }

    #[test]
    fn test_decompose_2d_balances_extents() {
        let tiles = decompose_2d(10, 7, 3, 2, 1).expect("decompose_2d");
        let heights: Vec<usize> = tiles.iter().filter(|t| t.col == 0).map(|t| t.nr_rows()).collect();
        let widths: Vec<usize> = tiles.iter().filter(|t| t.row == 0).map(|t| t.nr_cols()).collect();
        assert_eq!(heights, vec![4, 3, 3]);
        assert_eq!(widths, vec![4, 3]);
    }

    #[test]
    fn test_node_placement_is_contiguous() {
        let tiles = decompose_2d(8, 8, 2, 3, 3).expect("decompose_2d");
        let nodes: Vec<usize> = tiles.iter().map(|t| t.node.0).collect();
        assert_eq!(nodes, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(
            tiles[3].address(),
            PartitionAddress { node: NodeId(1), row: 1, col: 0 }
        );
    }

    #[test]
    fn test_decompose_2d_rejects_oversplit() {
        let err = decompose_2d(2, 5, 3, 1, 1).expect_err("more partition rows than rows");
        match err {
            FlowError::Partitioning(msg) => assert!(msg.contains("Cannot split")),
            other => panic!("Unexpected error: {other:?}"),
        }
        assert!(decompose_2d(4, 4, 2, 2, 0).is_err());
        assert!(decompose_2d(4, 4, 0, 2, 1).is_err());
    }

    #[test]
    fn test_single_row_layout() {
        let layout = GridLayout::new((1, 6), (1, 2), 1).expect("layout");
        assert_eq!(layout.nr_partitions(), 2);
        assert_eq!(layout.tile(0, 1).unwrap().shape(), (1, 3));
        assert!(layout.tile(1, 0).is_none());
    }

    #[test]
    fn test_neighbour_positions() {
        let layout = GridLayout::new((9, 9), (3, 3), 1).expect("layout");
        let corner = layout.tile(0, 0).unwrap();
        assert_eq!(corner.neighbour(Offset::NORTH), None);
        assert_eq!(corner.neighbour(Offset::WEST), None);
        assert_eq!(corner.neighbour(Offset::SOUTH_EAST), Some((1, 1)));
        let centre = layout.tile(1, 1).unwrap();
        assert_eq!(centre.neighbour(Offset::NORTH_WEST), Some((0, 0)));
        assert_eq!(centre.neighbour(Offset::SOUTH_EAST), Some((2, 2)));
    }

    #[test]
    fn test_from_array_to_array_roundtrip() {
        let global = sample_grid(11, 7);
        let layout = Arc::new(GridLayout::new((11, 7), (3, 2), 2).expect("layout"));
        let grid = PartitionedGrid::from_array(&global, layout).expect("split");
        assert_eq!(grid.nr_partitions(), 6);
        assert_eq!(grid.partition(1, 1).unwrap().dim(), (4, 3));
        assert_eq!(grid.partition(1, 1).unwrap()[[0, 0]], global[[4, 4]]);
        assert_eq!(grid.to_array(), global);
    }

    #[test]
    fn test_from_array_shape_guard() {
        let layout = Arc::new(GridLayout::new((4, 4), (2, 2), 1).expect("layout"));
        let err = PartitionedGrid::from_array(&sample_grid(4, 5), layout).expect_err("shape mismatch");
        assert!(matches!(err, FlowError::ShapeMismatch(_)));
    }

    #[test]
    fn test_from_partitions_validates_tile_shapes() {
        let layout = Arc::new(GridLayout::new((4, 4), (1, 2), 1).expect("layout"));
        let good = vec![Array2::<f64>::zeros((4, 2)), Array2::zeros((4, 2))];
        assert!(PartitionedGrid::from_partitions(layout.clone(), good).is_ok());

        let bad = vec![Array2::<f64>::zeros((4, 2)), Array2::zeros((4, 3))];
        let err = PartitionedGrid::from_partitions(layout.clone(), bad).expect_err("bad tile");
        assert!(matches!(err, FlowError::ShapeMismatch(_)));

        let short = vec![Array2::<f64>::zeros((4, 2))];
        let err = PartitionedGrid::from_partitions(layout, short).expect_err("missing tile");
        assert!(matches!(err, FlowError::Partitioning(_)));
    }

    #[test]
    fn test_verify_compatible_distinguishes_errors() {
        let a = Arc::new(GridLayout::new((6, 6), (2, 2), 1).expect("layout"));
        let b = Arc::new(GridLayout::new((6, 6), (3, 2), 1).expect("layout"));
        let c = Arc::new(GridLayout::new((6, 7), (2, 2), 1).expect("layout"));
        let d = Arc::new(GridLayout::new((6, 6), (2, 2), 2).expect("layout"));
        let ga = PartitionedGrid::filled(a.clone(), 0.0f64);
        let gb = PartitionedGrid::filled(b, 0.0f64);
        let gc = PartitionedGrid::filled(c, 0.0f64);
        let gd = PartitionedGrid::filled(d, 0.0f64);

        assert!(ga.verify_compatible(&PartitionedGrid::filled(a, 1u8), "other").is_ok());
        assert!(matches!(ga.verify_compatible(&gb, "material"), Err(FlowError::Partitioning(_))));
        assert!(matches!(ga.verify_compatible(&gc, "material"), Err(FlowError::ShapeMismatch(_))));
        assert!(matches!(ga.verify_compatible(&gd, "material"), Err(FlowError::Partitioning(_))));
    }

    #[test]
    fn test_layout_from_config() {
        let cfg = LayoutConfig {
            grid_shape: [20, 10],
            partitions: [4, 2],
            nodes: 2,
        };
        let layout = GridLayout::from_config(&cfg).expect("layout");
        assert_eq!(layout.shape(), (20, 10));
        assert_eq!(layout.shape_in_partitions(), (4, 2));
        assert_eq!(layout.nr_nodes(), 2);
    }
}

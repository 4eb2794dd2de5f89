// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Halo Exchange Builder
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! 3×3 partition neighbourhoods with synthetic halo partitions at the grid
//! border, and the one-cell border ring read from them.
//!
//! A neighbour position outside the partition grid is filled by a halo
//! partition of extent 1 along every axis that leaves the grid, and of the
//! real neighbour's extent along an axis that stays inside it. North/south
//! halos are therefore 1 row high, east/west halos 1 column wide, and corner
//! halos a single cell. Grids with one row or one column of partitions need
//! no special handling: both sides of the degenerate axis become halos.

use crate::grid::{GridLayout, PartitionTile, PartitionedGrid};
use flow_types::direction::Offset;
use flow_types::error::{FlowError, FlowResult};
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::sync::Arc;

/// One slot of a 3×3 partition neighbourhood.
#[derive(Debug, Clone)]
pub struct NeighbourPartition<E> {
    pub data: Arc<Array2<E>>,
    pub is_halo: bool,
}

/// A partition and its 8 neighbours, indexed by offset from the centre.
#[derive(Debug, Clone)]
pub struct Neighbourhood<E> {
    pub tile: PartitionTile,
    slots: [[NeighbourPartition<E>; 3]; 3],
}

impl<E> Neighbourhood<E> {
    pub fn get(&self, offset: Offset) -> &NeighbourPartition<E> {
        &self.slots[(offset.row + 1) as usize][(offset.col + 1) as usize]
    }

    pub fn centre(&self) -> &Arc<Array2<E>> {
        &self.slots[1][1].data
    }
}

impl<E: Copy> Neighbourhood<E> {
    /// Collect the cells directly surrounding the centre partition.
    pub fn border_ring(&self) -> FlowResult<BorderRing<E>> {
        let (nrows, ncols) = self.centre().dim();
        let north = &self.get(Offset::NORTH).data;
        let south = &self.get(Offset::SOUTH).data;
        let west = &self.get(Offset::WEST).data;
        let east = &self.get(Offset::EAST).data;
        if north.ncols() != ncols || south.ncols() != ncols {
            return Err(FlowError::Internal(format!(
                "North/south neighbours of partition ({}, {}) are {} and {} columns wide, expected {ncols}",
                self.tile.row,
                self.tile.col,
                north.ncols(),
                south.ncols()
            )));
        }
        if west.nrows() != nrows || east.nrows() != nrows {
            return Err(FlowError::Internal(format!(
                "West/east neighbours of partition ({}, {}) are {} and {} rows high, expected {nrows}",
                self.tile.row,
                self.tile.col,
                west.nrows(),
                east.nrows()
            )));
        }

        let nw = &self.get(Offset::NORTH_WEST).data;
        let ne = &self.get(Offset::NORTH_EAST).data;
        let sw = &self.get(Offset::SOUTH_WEST).data;
        let se = &self.get(Offset::SOUTH_EAST).data;

        Ok(BorderRing {
            shape: (nrows, ncols),
            north: north.row(north.nrows() - 1).to_owned(),
            south: south.row(0).to_owned(),
            west: west.column(west.ncols() - 1).to_owned(),
            east: east.column(0).to_owned(),
            north_west: nw[[nw.nrows() - 1, nw.ncols() - 1]],
            north_east: ne[[ne.nrows() - 1, 0]],
            south_west: sw[[0, sw.ncols() - 1]],
            south_east: se[[0, 0]],
        })
    }
}

/// The one-cell-thick ring of cells around a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderRing<E> {
    shape: (usize, usize),
    pub north: Array1<E>,
    pub south: Array1<E>,
    pub west: Array1<E>,
    pub east: Array1<E>,
    pub north_west: E,
    pub north_east: E,
    pub south_west: E,
    pub south_east: E,
}

impl<E: Copy> BorderRing<E> {
    /// Ring around a partition that has no neighbours at all.
    pub fn uniform(shape: (usize, usize), fill: E) -> Self {
        BorderRing {
            shape,
            north: Array1::from_elem(shape.1, fill),
            south: Array1::from_elem(shape.1, fill),
            west: Array1::from_elem(shape.0, fill),
            east: Array1::from_elem(shape.0, fill),
            north_west: fill,
            north_east: fill,
            south_west: fill,
            south_east: fill,
        }
    }

    /// Shape of the partition the ring surrounds.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Value of the ring cell at local coordinates `(row, col)`, which lie
    /// one cell outside the partition. None for any other coordinate.
    pub fn get(&self, row: isize, col: isize) -> Option<E> {
        let nr = self.shape.0 as isize;
        let nc = self.shape.1 as isize;
        let inside_rows = (0..nr).contains(&row);
        let inside_cols = (0..nc).contains(&col);
        match (row, col) {
            (-1, -1) => Some(self.north_west),
            (-1, c) if c == nc => Some(self.north_east),
            (r, -1) if r == nr => Some(self.south_west),
            (r, c) if r == nr && c == nc => Some(self.south_east),
            (-1, c) if inside_cols => Some(self.north[c as usize]),
            (r, c) if r == nr && inside_cols => Some(self.south[c as usize]),
            (r, -1) if inside_rows => Some(self.west[r as usize]),
            (r, c) if c == nc && inside_rows => Some(self.east[r as usize]),
            _ => None,
        }
    }
}

/// Shares halo arrays of equal shape between neighbourhoods.
struct HaloCache<E> {
    fill: E,
    arrays: HashMap<(usize, usize), Arc<Array2<E>>>,
}

impl<E: Clone> HaloCache<E> {
    fn new(fill: E) -> Self {
        HaloCache {
            fill,
            arrays: HashMap::new(),
        }
    }

    fn get(&mut self, shape: (usize, usize)) -> Arc<Array2<E>> {
        let fill = &self.fill;
        self.arrays
            .entry(shape)
            .or_insert_with(|| Arc::new(Array2::from_elem(shape, fill.clone())))
            .clone()
    }
}

/// Extent of a neighbour slot along one axis: the real extent when the
/// neighbour index is inside the partition grid, 1 for a halo.
fn halo_extent(layout: &GridLayout, tile: &PartitionTile, offset: Offset) -> (usize, usize) {
    let row = tile.row as isize + offset.row as isize;
    let col = tile.col as isize + offset.col as isize;
    let rows = if (0..tile.prows as isize).contains(&row) {
        layout.tile(row as usize, 0).map_or(1, |t| t.nr_rows())
    } else {
        1
    };
    let cols = if (0..tile.pcols as isize).contains(&col) {
        layout.tile(0, col as usize).map_or(1, |t| t.nr_cols())
    } else {
        1
    };
    (rows, cols)
}

/// Build the 3×3 neighbourhood of every partition, row-major.
pub fn halo_neighbourhoods<E: Clone>(grid: &PartitionedGrid<E>, fill: E) -> Vec<Neighbourhood<E>> {
    let layout = grid.layout().clone();
    let mut halos = HaloCache::new(fill);
    layout
        .tiles()
        .iter()
        .map(|tile| {
            let slots = std::array::from_fn(|i| {
                std::array::from_fn(|j| {
                    let offset = Offset::new(i as i8 - 1, j as i8 - 1);
                    match tile.neighbour(offset).and_then(|(r, c)| grid.partition(r, c)) {
                        Some(data) => NeighbourPartition {
                            data: data.clone(),
                            is_halo: false,
                        },
                        None => NeighbourPartition {
                            data: halos.get(halo_extent(&layout, tile, offset)),
                            is_halo: true,
                        },
                    }
                })
            });
            Neighbourhood {
                tile: tile.clone(),
                slots,
            }
        })
        .collect()
}

/// Border ring of every partition of a grid, row-major.
pub fn border_rings<E: Copy>(grid: &PartitionedGrid<E>, fill: E) -> FlowResult<Vec<BorderRing<E>>> {
    halo_neighbourhoods(grid, fill)
        .iter()
        .map(Neighbourhood::border_ring)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::direction::NEIGHBOUR_OFFSETS;

    const HALO: i32 = -1;

    fn numbered_grid(shape: (usize, usize), partitions: (usize, usize)) -> PartitionedGrid<i32> {
        let global = Array2::from_shape_fn(shape, |(r, c)| (r * 100 + c) as i32);
        let layout = Arc::new(GridLayout::new(shape, partitions, 1).expect("layout"));
        PartitionedGrid::from_array(&global, layout).expect("split")
    }

    #[test]
    fn test_single_partition_is_surrounded_by_halos() {
        let grid = numbered_grid((3, 4), (1, 1));
        let hoods = halo_neighbourhoods(&grid, HALO);
        assert_eq!(hoods.len(), 1);
        let hood = &hoods[0];
        assert!(!hood.get(Offset::ZERO).is_halo);
        for offset in NEIGHBOUR_OFFSETS {
            assert!(hood.get(offset).is_halo, "{offset} should be a halo");
        }
        assert_eq!(hood.get(Offset::NORTH).data.dim(), (1, 4));
        assert_eq!(hood.get(Offset::EAST).data.dim(), (3, 1));
        assert_eq!(hood.get(Offset::SOUTH_WEST).data.dim(), (1, 1));

        let ring = hood.border_ring().expect("ring");
        assert_eq!(ring, BorderRing::uniform((3, 4), HALO));
    }

    #[test]
    fn test_centre_ring_reads_neighbour_borders() {
        // 3x3 partitions of 2x2 cells: cell (r, c) holds r*100 + c.
        let grid = numbered_grid((6, 6), (3, 3));
        let rings = border_rings(&grid, HALO).expect("rings");
        let centre = &rings[4];
        // Centre partition owns rows 2..4, cols 2..4.
        for r in -1isize..=2 {
            for c in -1isize..=2 {
                let inside = (0..2).contains(&r) && (0..2).contains(&c);
                let expected = ((r + 2) * 100 + (c + 2)) as i32;
                match centre.get(r, c) {
                    Some(v) => assert_eq!(v, expected, "ring cell ({r}, {c})"),
                    None => assert!(inside, "ring cell ({r}, {c}) missing"),
                }
            }
        }
        assert_eq!(centre.get(-2, 0), None);
    }

    #[test]
    fn test_corner_partition_mixes_halo_and_real_neighbours() {
        let grid = numbered_grid((6, 6), (3, 3));
        let rings = border_rings(&grid, HALO).expect("rings");
        let top_right = &rings[2];
        assert!(top_right.north.iter().all(|&v| v == HALO));
        assert!(top_right.east.iter().all(|&v| v == HALO));
        assert_eq!(top_right.north_west, HALO);
        assert_eq!(top_right.south_east, HALO);
        // West neighbour is partition (0, 1), last column is global col 3.
        assert_eq!(top_right.west.to_vec(), vec![3, 103]);
        // South-west corner is global cell (2, 3).
        assert_eq!(top_right.south_west, 203);
    }

    #[test]
    fn test_single_row_of_partitions() {
        let grid = numbered_grid((1, 6), (1, 2));
        let hoods = halo_neighbourhoods(&grid, HALO);
        let left = &hoods[0];
        assert_eq!(left.get(Offset::NORTH).data.dim(), (1, 3));
        assert_eq!(left.get(Offset::SOUTH).data.dim(), (1, 3));
        assert_eq!(left.get(Offset::WEST).data.dim(), (1, 1));
        // North-east of the left partition: row outside, column inside.
        assert_eq!(left.get(Offset::NORTH_EAST).data.dim(), (1, 3));
        assert!(!left.get(Offset::EAST).is_halo);

        let ring = left.border_ring().expect("ring");
        assert_eq!(ring.east.to_vec(), vec![3]);
        assert_eq!(ring.get(0, 3), Some(3));
        assert_eq!(ring.get(-1, 3), Some(HALO));
        assert_eq!(ring.get(1, 3), Some(HALO));
    }

    #[test]
    fn test_single_column_of_partitions() {
        let grid = numbered_grid((5, 1), (2, 1));
        let rings = border_rings(&grid, HALO).expect("rings");
        assert_eq!(rings[0].shape(), (3, 1));
        assert_eq!(rings[0].south.to_vec(), vec![300]);
        assert_eq!(rings[1].north.to_vec(), vec![200]);
        assert!(rings[1].west.iter().chain(rings[1].east.iter()).all(|&v| v == HALO));
    }

    #[test]
    fn test_halo_arrays_are_shared() {
        let grid = numbered_grid((4, 4), (2, 2));
        let hoods = halo_neighbourhoods(&grid, HALO);
        let a = &hoods[0].get(Offset::NORTH_WEST).data;
        let b = &hoods[3].get(Offset::SOUTH_EAST).data;
        assert!(Arc::ptr_eq(a, b));
    }
}

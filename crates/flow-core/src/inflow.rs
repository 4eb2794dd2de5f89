// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Inflow Counter
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-cell in-degree of the D8 flow network, across partition borders.
//!
//! Sources are visited in three sub-passes: the partition's own cells, the
//! four sides of the border ring, then its four corners. Each ring cell has
//! a fixed partition offset (north strip → `(-1, 0)`, north-west corner →
//! `(-1, -1)`, ...), which is recorded for every local cell it feeds.

use crate::grid::PartitionedGrid;
use crate::halo::{border_rings, BorderRing};
use flow_types::direction::{CellIdx, FlowDirection, Offset};
use flow_types::element::{InflowCount, INFLOW_COUNT_NO_DATA};
use flow_types::error::FlowResult;
use ndarray::Array2;
use rayon::prelude::*;
use std::sync::Arc;

/// Inflow counts of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionInflow {
    pub counts: Array2<InflowCount>,
    /// Local cells fed from a neighbouring partition, paired with the offset
    /// of that partition. One entry per crossing flow edge.
    pub input_cells: Vec<(CellIdx, Offset)>,
}

impl PartitionInflow {
    /// Number of flow edges entering the partition from outside.
    pub fn nr_input_edges(&self) -> usize {
        self.input_cells.len()
    }
}

struct Counter<'a> {
    flow_direction: &'a Array2<FlowDirection>,
    counts: Array2<InflowCount>,
    input_cells: Vec<(CellIdx, Offset)>,
}

impl Counter<'_> {
    /// Local target of a flow edge, if it lands on a cell with data.
    fn target(&self, (row, col): (isize, isize)) -> Option<CellIdx> {
        let (nrows, ncols) = self.flow_direction.dim();
        if row < 0 || col < 0 || row as usize >= nrows || col as usize >= ncols {
            return None;
        }
        let cell = (row as usize, col as usize);
        (!self.flow_direction[cell].is_no_data()).then_some(cell)
    }

    fn count_local_sources(&mut self) {
        let flow_direction = self.flow_direction;
        for ((row, col), direction) in flow_direction.indexed_iter() {
            let Some(offset) = direction.offset() else {
                continue;
            };
            if let Some(cell) = self.target(offset.apply((row, col))) {
                self.counts[cell] += 1;
            }
        }
    }

    /// Credit the local cell a ring cell at `ghost` drains into.
    fn count_ring_source(&mut self, direction: FlowDirection, ghost: (isize, isize), partition: Offset) {
        let Some(offset) = direction.offset() else {
            return;
        };
        let landing = (ghost.0 + offset.row as isize, ghost.1 + offset.col as isize);
        if let Some(cell) = self.target(landing) {
            self.counts[cell] += 1;
            self.input_cells.push((cell, partition));
        }
    }

    fn count_side_sources(&mut self, ring: &BorderRing<FlowDirection>) {
        let (nrows, ncols) = self.flow_direction.dim();
        let (last_row, last_col) = (nrows as isize, ncols as isize);
        for (col, &direction) in ring.north.iter().enumerate() {
            self.count_ring_source(direction, (-1, col as isize), Offset::NORTH);
        }
        for (col, &direction) in ring.south.iter().enumerate() {
            self.count_ring_source(direction, (last_row, col as isize), Offset::SOUTH);
        }
        for (row, &direction) in ring.west.iter().enumerate() {
            self.count_ring_source(direction, (row as isize, -1), Offset::WEST);
        }
        for (row, &direction) in ring.east.iter().enumerate() {
            self.count_ring_source(direction, (row as isize, last_col), Offset::EAST);
        }
    }

    fn count_corner_sources(&mut self, ring: &BorderRing<FlowDirection>) {
        let (nrows, ncols) = self.flow_direction.dim();
        let (last_row, last_col) = (nrows as isize, ncols as isize);
        self.count_ring_source(ring.north_west, (-1, -1), Offset::NORTH_WEST);
        self.count_ring_source(ring.north_east, (-1, last_col), Offset::NORTH_EAST);
        self.count_ring_source(ring.south_west, (last_row, -1), Offset::SOUTH_WEST);
        self.count_ring_source(ring.south_east, (last_row, last_col), Offset::SOUTH_EAST);
    }

    fn finish(mut self) -> PartitionInflow {
        for (count, direction) in self.counts.iter_mut().zip(self.flow_direction.iter()) {
            if direction.is_no_data() {
                *count = INFLOW_COUNT_NO_DATA;
            }
        }
        PartitionInflow {
            counts: self.counts,
            input_cells: self.input_cells,
        }
    }
}

/// Count, for every cell of one partition, the neighbouring cells draining
/// into it. `ring` holds the flow directions around the partition.
pub fn count_partition_inflow(
    flow_direction: &Array2<FlowDirection>,
    ring: &BorderRing<FlowDirection>,
) -> PartitionInflow {
    let mut counter = Counter {
        flow_direction,
        counts: Array2::zeros(flow_direction.dim()),
        input_cells: Vec::new(),
    };
    counter.count_local_sources();
    counter.count_side_sources(ring);
    counter.count_corner_sources(ring);
    counter.finish()
}

/// Inflow count of every cell of a partitioned flow direction grid.
///
/// Cells with a no-data direction get [`INFLOW_COUNT_NO_DATA`].
pub fn inflow_count(
    flow_direction: &PartitionedGrid<FlowDirection>,
) -> FlowResult<PartitionedGrid<InflowCount>> {
    let rings = border_rings(flow_direction, FlowDirection::NoData)?;
    let partitions: Vec<&Arc<Array2<FlowDirection>>> =
        flow_direction.partitions().map(|(_, data)| data).collect();
    let counts = partitions
        .par_iter()
        .zip(rings.par_iter())
        .map(|(data, ring)| Arc::new(count_partition_inflow(data, ring).counts))
        .collect();
    Ok(PartitionedGrid::from_shared(
        flow_direction.layout().clone(),
        counts,
    ))
}

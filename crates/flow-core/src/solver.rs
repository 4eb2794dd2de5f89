// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Intra-Partition Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Accumulation state of one partition.
//!
//! Solving starts at every ridge cell (inflow count zero) and walks
//! downstream, entering each cell once all of its upstream material has
//! arrived. A walk stops at a sink, at a cell still waiting for other
//! upstream cells, or at the partition border. At the border the walking
//! cell's outgoing flux is recorded in the ledger for the downstream
//! partition to drain. Material absorbed from neighbours later resumes the
//! same walk from the receiving cells.

use crate::accumulator::{Accumulator, CellSlot, InflowStatus};
use crate::grid::PartitionTile;
use crate::halo::BorderRing;
use crate::inflow::{count_partition_inflow, PartitionInflow};
use crate::ledger::PartitionLedger;
use flow_types::direction::{CellIdx, FlowDirection, Offset};
use flow_types::element::{InflowCount, Material, INFLOW_COUNT_NO_DATA};
use flow_types::error::{FlowError, FlowResult};
use ndarray::Array2;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Everything one partition needs to solve itself.
#[derive(Debug, Clone)]
pub struct PartitionInputs<T> {
    pub tile: PartitionTile,
    pub flow_direction: Arc<Array2<FlowDirection>>,
    /// Flow directions around the partition.
    pub ring: BorderRing<FlowDirection>,
    pub material: Arc<Array2<T>>,
    pub criterion: Option<Arc<Array2<T>>>,
}

/// Material handed across a partition border.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution<T> {
    /// Receiving cell, in the receiver's coordinates.
    pub cell: CellIdx,
    /// Offset of the partition the material comes from.
    pub from: Offset,
    pub value: T,
}

/// Snapshot of a partition's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStatus {
    pub solved: bool,
    /// Neighbours this partition holds output for.
    pub pending_output_offsets: BTreeSet<Offset>,
    pub pending_inputs: usize,
    pub pending_outputs: usize,
    pub unvisited: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbsorbReport {
    pub received: usize,
    pub cells_entered: usize,
    pub solved: bool,
}

enum Downstream {
    Sink,
    /// Off the grid or into a no-data cell.
    Outside,
    Local(CellIdx),
    /// Into a neighbouring partition, along this flow offset.
    Neighbour(Offset),
}

/// Mutable accumulation state of one partition.
#[derive(Debug)]
pub struct PartitionState<T> {
    tile: PartitionTile,
    accumulator: Accumulator,
    flow_direction: Arc<Array2<FlowDirection>>,
    ring: BorderRing<FlowDirection>,
    material: Arc<Array2<T>>,
    criterion: Option<Arc<Array2<T>>>,
    inflow: Array2<InflowCount>,
    visited: Array2<bool>,
    status: Array2<InflowStatus>,
    flux: Array2<T>,
    state: Option<Array2<T>>,
    ledger: PartitionLedger<T>,
    unvisited: usize,
    nr_input_edges: usize,
}

impl<T: Material> PartitionState<T> {
    /// Count inflow and resolve every cell whose upstream drainage lies
    /// inside the partition.
    pub fn solve_intra_partition(inputs: PartitionInputs<T>, accumulator: Accumulator) -> FlowResult<Self> {
        let inflow = count_partition_inflow(&inputs.flow_direction, &inputs.ring);
        Self::solve_with_inflow(inputs, accumulator, inflow)
    }

    /// As [`Self::solve_intra_partition`], with inflow counts already known.
    pub fn solve_with_inflow(
        inputs: PartitionInputs<T>,
        accumulator: Accumulator,
        inflow: PartitionInflow,
    ) -> FlowResult<Self> {
        let PartitionInputs {
            tile,
            flow_direction,
            ring,
            material,
            criterion,
        } = inputs;
        let shape = flow_direction.dim();
        if shape != tile.shape() || material.dim() != shape || inflow.counts.dim() != shape {
            return Err(FlowError::ShapeMismatch(format!(
                "Partition ({}, {}) inputs disagree: flow direction {:?}, material {:?}, inflow {:?}",
                tile.row,
                tile.col,
                shape,
                material.dim(),
                inflow.counts.dim()
            )));
        }
        if let Some(criterion) = &criterion {
            if criterion.dim() != shape {
                return Err(FlowError::ShapeMismatch(format!(
                    "Partition ({}, {}) criterion has shape {:?}, expected {shape:?}",
                    tile.row,
                    tile.col,
                    criterion.dim()
                )));
            }
        }
        if accumulator.uses_criterion() != criterion.is_some() {
            return Err(FlowError::Internal(format!(
                "The {} accumulator {} a criterion",
                accumulator.name(),
                if accumulator.uses_criterion() { "requires" } else { "does not take" }
            )));
        }

        let mut flux = Array2::from_elem(shape, T::ZERO);
        let mut state = criterion.as_ref().map(|_| Array2::from_elem(shape, T::ZERO));
        let mut unvisited = 0;
        for (cell, direction) in flow_direction.indexed_iter() {
            if direction.is_no_data() {
                flux[cell] = T::no_data();
                if let Some(state) = state.as_mut() {
                    state[cell] = T::no_data();
                }
            } else {
                unvisited += 1;
            }
        }

        let ridge: Vec<CellIdx> = inflow
            .counts
            .indexed_iter()
            .filter(|(_, &count)| count == 0)
            .map(|(cell, _)| cell)
            .collect();

        let mut partition = PartitionState {
            accumulator,
            ring,
            material,
            criterion,
            inflow: inflow.counts,
            visited: Array2::from_elem(shape, false),
            status: Array2::from_elem(shape, InflowStatus::default()),
            flux,
            state,
            ledger: PartitionLedger::new(shape, inflow.input_cells.iter().copied()),
            unvisited,
            nr_input_edges: inflow.input_cells.len(),
            flow_direction,
            tile,
        };
        for cell in ridge {
            partition.accumulate_from(cell)?;
        }
        Ok(partition)
    }

    /// Take in material drained from neighbouring partitions and resume
    /// accumulation from every cell that becomes ready.
    pub fn absorb(&mut self, contributions: Vec<Contribution<T>>) -> FlowResult<AbsorbReport> {
        let mut report = AbsorbReport {
            received: contributions.len(),
            ..AbsorbReport::default()
        };
        for Contribution { cell, from, value } in contributions {
            self.ledger.remove_input_cell(cell, from)?;
            self.deliver(cell, value)?;
            if self.inflow[cell] == 0 {
                report.cells_entered += self.accumulate_from(cell)?;
            }
        }
        report.solved = self.is_solved();
        Ok(report)
    }

    /// Hand out the output owed to the neighbour at `towards`.
    pub fn drain(&mut self, towards: Offset, receiver_shape: (usize, usize)) -> FlowResult<Vec<(CellIdx, T)>> {
        self.ledger.drain(towards, receiver_shape)
    }

    /// Every cell entered and no transfer pending.
    pub fn is_solved(&self) -> bool {
        self.unvisited == 0 && self.ledger.is_empty()
    }

    pub fn status(&self) -> PartitionStatus {
        PartitionStatus {
            solved: self.is_solved(),
            pending_output_offsets: self.ledger.pending_output_offsets(),
            pending_inputs: self.ledger.nr_pending_inputs(),
            pending_outputs: self.ledger.nr_pending_outputs(),
            unvisited: self.unvisited,
        }
    }

    pub fn tile(&self) -> &PartitionTile {
        &self.tile
    }

    pub fn flux(&self) -> &Array2<T> {
        &self.flux
    }

    pub fn state(&self) -> Option<&Array2<T>> {
        self.state.as_ref()
    }

    pub fn inflow(&self) -> &Array2<InflowCount> {
        &self.inflow
    }

    pub fn ledger(&self) -> &PartitionLedger<T> {
        &self.ledger
    }

    /// Flow edges entering this partition from its neighbours.
    pub fn nr_input_edges(&self) -> usize {
        self.nr_input_edges
    }

    fn slot(&mut self, cell: CellIdx) -> CellSlot<'_, T> {
        CellSlot {
            flux: &mut self.flux[cell],
            state: self.state.as_mut().map(|state| &mut state[cell]),
            status: &mut self.status[cell],
        }
    }

    fn downstream(&self, cell: CellIdx) -> Downstream {
        let Some(offset) = self.flow_direction[cell].offset() else {
            return Downstream::Sink;
        };
        let (row, col) = offset.apply(cell);
        let (nrows, ncols) = self.flow_direction.dim();
        if row >= 0 && col >= 0 && (row as usize) < nrows && (col as usize) < ncols {
            let next = (row as usize, col as usize);
            if self.flow_direction[next].is_no_data() {
                Downstream::Outside
            } else {
                Downstream::Local(next)
            }
        } else {
            match self.ring.get(row, col) {
                Some(direction) if !direction.is_no_data() => Downstream::Neighbour(offset),
                _ => Downstream::Outside,
            }
        }
    }

    /// Add upstream material to `cell` and count it as arrived.
    fn deliver(&mut self, cell: CellIdx, value: T) -> FlowResult<()> {
        let count = self.inflow[cell];
        if count == 0 || count == INFLOW_COUNT_NO_DATA {
            return Err(FlowError::Internal(format!(
                "Cell {cell:?} of partition ({}, {}) received more material than it has upstream cells",
                self.tile.row, self.tile.col
            )));
        }
        self.inflow[cell] = count - 1;
        let accumulator = self.accumulator;
        accumulator.accumulate_downstream(value, self.slot(cell));
        Ok(())
    }

    /// Finalise `cell` and return the flux leaving it.
    fn enter(&mut self, cell: CellIdx) -> FlowResult<T> {
        if self.visited[cell] {
            return Err(FlowError::Internal(format!(
                "Cell {cell:?} of partition ({}, {}) entered twice",
                self.tile.row, self.tile.col
            )));
        }
        self.visited[cell] = true;
        self.unvisited -= 1;
        let material = self.material[cell];
        let criterion = self.criterion.as_ref().map(|criterion| criterion[cell]);
        let accumulator = self.accumulator;
        Ok(accumulator.enter_cell(material, criterion, self.slot(cell)))
    }

    /// Walk downstream from a ready cell for as long as material is
    /// complete. Returns the number of cells entered.
    fn accumulate_from(&mut self, start: CellIdx) -> FlowResult<usize> {
        let mut cell = start;
        let mut entered = 0;
        loop {
            let outgoing = self.enter(cell)?;
            entered += 1;
            match self.downstream(cell) {
                Downstream::Sink | Downstream::Outside => break,
                Downstream::Neighbour(offset) => {
                    self.ledger.register_output(cell, offset, outgoing)?;
                    break;
                }
                Downstream::Local(next) => {
                    self.deliver(next, outgoing)?;
                    if self.inflow[next] > 0 {
                        break;
                    }
                    cell = next;
                }
            }
        }
        Ok(entered)
    }
}

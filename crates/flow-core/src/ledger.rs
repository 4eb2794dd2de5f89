// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Partition I/O Ledger
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Pending cross-partition transfers of one partition.
//!
//! Input cells are local cells still waiting for material from a
//! neighbouring partition. Output cells are border cells whose accumulated
//! material must be handed to the neighbouring partition they drain into.
//! A ledger is owned by a single task; neighbours reach it only through
//! [`PartitionLedger::drain`] requests routed to that task.

use flow_types::direction::{CellIdx, Offset};
use flow_types::error::{FlowError, FlowResult};
use std::collections::{BTreeMap, BTreeSet};

/// Material a border cell owes a neighbouring partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputCell<T> {
    /// Flow direction offset of the cell.
    pub direction: Offset,
    /// Offset of the partition the cell drains into.
    pub partition: Offset,
    pub value: T,
}

/// Offset of the partition that `cell` drains into along `direction`, or
/// None when the downstream cell lies inside the partition.
pub fn partition_offset(shape: (usize, usize), cell: CellIdx, direction: Offset) -> Option<Offset> {
    let (row, col) = direction.apply(cell);
    let axis = |index: isize, extent: usize| -> i8 {
        if index < 0 {
            -1
        } else if index as usize >= extent {
            1
        } else {
            0
        }
    };
    let offset = Offset::new(axis(row, shape.0), axis(col, shape.1));
    (offset != Offset::ZERO).then_some(offset)
}

/// Index in the receiving partition of the cell that `cell` drains into.
/// Coordinates leaving the partition wrap to the opposite edge of the
/// receiver.
pub fn input_cell(
    shape: (usize, usize),
    cell: CellIdx,
    direction: Offset,
    receiver_shape: (usize, usize),
) -> CellIdx {
    let (row, col) = direction.apply(cell);
    let wrap = |index: isize, extent: usize, receiver_extent: usize| -> usize {
        if index < 0 {
            receiver_extent - 1
        } else if index as usize >= extent {
            0
        } else {
            index as usize
        }
    };
    (
        wrap(row, shape.0, receiver_shape.0),
        wrap(col, shape.1, receiver_shape.1),
    )
}

#[derive(Debug, Clone)]
pub struct PartitionLedger<T> {
    shape: (usize, usize),
    inputs: BTreeMap<CellIdx, Vec<Offset>>,
    outputs: BTreeMap<CellIdx, OutputCell<T>>,
    by_destination: BTreeMap<Offset, BTreeSet<CellIdx>>,
    registered: BTreeSet<Offset>,
}

impl<T: Copy> PartitionLedger<T> {
    /// Ledger for a partition of `shape` whose `input_cells` are fed from
    /// the paired neighbour offsets.
    pub fn new(shape: (usize, usize), input_cells: impl IntoIterator<Item = (CellIdx, Offset)>) -> Self {
        let mut inputs: BTreeMap<CellIdx, Vec<Offset>> = BTreeMap::new();
        for (cell, from) in input_cells {
            inputs.entry(cell).or_default().push(from);
        }
        PartitionLedger {
            shape,
            inputs,
            outputs: BTreeMap::new(),
            by_destination: BTreeMap::new(),
            registered: BTreeSet::new(),
        }
    }

    /// Record that `cell` drains across the partition border along
    /// `direction`, carrying `value`. Returns the receiving partition offset.
    pub fn register_output(&mut self, cell: CellIdx, direction: Offset, value: T) -> FlowResult<Offset> {
        let partition = partition_offset(self.shape, cell, direction).ok_or_else(|| {
            FlowError::Internal(format!(
                "Cell {cell:?} drains along {direction} inside its partition"
            ))
        })?;
        if self.outputs.contains_key(&cell) {
            return Err(FlowError::Internal(format!(
                "Output cell {cell:?} registered twice"
            )));
        }
        self.outputs.insert(
            cell,
            OutputCell {
                direction,
                partition,
                value,
            },
        );
        self.by_destination.entry(partition).or_default().insert(cell);
        self.registered.insert(partition);
        Ok(partition)
    }

    /// Mark the contribution `cell` was owed by the partition at `from` as
    /// arrived.
    pub fn remove_input_cell(&mut self, cell: CellIdx, from: Offset) -> FlowResult<()> {
        let pending = self.inputs.get_mut(&cell).ok_or_else(|| {
            FlowError::Internal(format!("Cell {cell:?} is not an input cell"))
        })?;
        let position = pending.iter().position(|&o| o == from).ok_or_else(|| {
            FlowError::Internal(format!(
                "Input cell {cell:?} expects nothing more from partition {from}"
            ))
        })?;
        pending.swap_remove(position);
        if pending.is_empty() {
            self.inputs.remove(&cell);
        }
        Ok(())
    }

    /// Take every pending output destined for the neighbour at `towards`.
    ///
    /// Returned cell indices are in the neighbour's coordinates. Each output
    /// is handed out at most once; later drains in the same direction return
    /// nothing.
    pub fn drain(&mut self, towards: Offset, receiver_shape: (usize, usize)) -> FlowResult<Vec<(CellIdx, T)>> {
        if !self.registered.contains(&towards) {
            return Err(FlowError::Internal(format!(
                "Drain requested towards {towards}, which no output cell drains into"
            )));
        }
        let cells = self.by_destination.remove(&towards).unwrap_or_default();
        let mut drained = Vec::with_capacity(cells.len());
        for cell in cells {
            let output = self.outputs.remove(&cell).ok_or_else(|| {
                FlowError::Internal(format!("Output cell {cell:?} indexed but missing"))
            })?;
            drained.push((
                input_cell(self.shape, cell, output.direction, receiver_shape),
                output.value,
            ));
        }
        Ok(drained)
    }

    /// No inputs left to receive and no outputs left to hand out.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    pub fn nr_pending_inputs(&self) -> usize {
        self.inputs.values().map(Vec::len).sum()
    }

    pub fn nr_pending_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Offsets of neighbours that have output waiting to be drained.
    pub fn pending_output_offsets(&self) -> BTreeSet<Offset> {
        self.by_destination.keys().copied().collect()
    }

    /// Offsets of neighbours that still owe this partition material.
    pub fn pending_input_offsets(&self) -> BTreeSet<Offset> {
        self.inputs.values().flatten().copied().collect()
    }
}

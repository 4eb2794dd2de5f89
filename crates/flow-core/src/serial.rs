// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Serial Accumulation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Single-array flow accumulation in topological order.
//!
//! Uses the same accumulator rules as the partitioned engine but needs no
//! halos, ledgers or runtime. Suited to small grids and as a reference for
//! the partitioned results.

use crate::accumulator::{Accumulator, CellSlot, InflowStatus};
use flow_types::direction::{CellIdx, FlowDirection};
use flow_types::element::Material;
use flow_types::error::{FlowError, FlowResult};
use ndarray::Array2;
use std::collections::VecDeque;
use tracing::debug;

fn downstream(flow_direction: &Array2<FlowDirection>, cell: CellIdx) -> Option<CellIdx> {
    let (row, col) = flow_direction[cell].offset()?.apply(cell);
    let (nrows, ncols) = flow_direction.dim();
    if row < 0 || col < 0 || row as usize >= nrows || col as usize >= ncols {
        return None;
    }
    let next = (row as usize, col as usize);
    (!flow_direction[next].is_no_data()).then_some(next)
}

/// Accumulate `material` over a whole flow direction array.
///
/// Returns flux, plus state when `accumulator` uses a criterion. Cells that
/// are never reached because they lie on or downstream of a cycle yield
/// [`FlowError::NonConvergence`].
pub fn accumulate_serial<T: Material>(
    flow_direction: &Array2<FlowDirection>,
    material: &Array2<T>,
    criterion: Option<&Array2<T>>,
    accumulator: Accumulator,
) -> FlowResult<(Array2<T>, Option<Array2<T>>)> {
    let shape = flow_direction.dim();
    if material.dim() != shape {
        return Err(FlowError::ShapeMismatch(format!(
            "material has shape {:?}, flow direction {shape:?}",
            material.dim()
        )));
    }
    if let Some(criterion) = criterion {
        if criterion.dim() != shape {
            return Err(FlowError::ShapeMismatch(format!(
                "criterion has shape {:?}, flow direction {shape:?}",
                criterion.dim()
            )));
        }
    }
    if accumulator.uses_criterion() != criterion.is_some() {
        return Err(FlowError::ConfigError(format!(
            "The {} accumulator {} a criterion grid",
            accumulator.name(),
            if accumulator.uses_criterion() { "needs" } else { "does not take" }
        )));
    }

    let mut inflow = Array2::<u32>::zeros(shape);
    for (cell, direction) in flow_direction.indexed_iter() {
        if direction.is_no_data() {
            continue;
        }
        if let Some(next) = downstream(flow_direction, cell) {
            inflow[next] += 1;
        }
    }

    let mut flux = Array2::from_elem(shape, T::ZERO);
    let mut state = criterion.map(|_| Array2::from_elem(shape, T::ZERO));
    let mut status = Array2::from_elem(shape, InflowStatus::default());
    let mut queue = VecDeque::new();
    let mut remaining = 0usize;
    for (cell, direction) in flow_direction.indexed_iter() {
        if direction.is_no_data() {
            flux[cell] = T::no_data();
            if let Some(state) = state.as_mut() {
                state[cell] = T::no_data();
            }
        } else {
            remaining += 1;
            if inflow[cell] == 0 {
                queue.push_back(cell);
            }
        }
    }

    while let Some(cell) = queue.pop_front() {
        remaining -= 1;
        let outgoing = accumulator.enter_cell(
            material[cell],
            criterion.map(|c| c[cell]),
            CellSlot {
                flux: &mut flux[cell],
                state: state.as_mut().map(|s| &mut s[cell]),
                status: &mut status[cell],
            },
        );
        if let Some(next) = downstream(flow_direction, cell) {
            accumulator.accumulate_downstream(
                outgoing,
                CellSlot {
                    flux: &mut flux[next],
                    state: None,
                    status: &mut status[next],
                },
            );
            inflow[next] -= 1;
            if inflow[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if remaining > 0 {
        debug!(cells = remaining, "Serial accumulation left cells unreached");
        return Err(FlowError::NonConvergence {
            rounds: 0,
            unsolved: 1,
            message: format!("{remaining} cells lie on or downstream of a cycle"),
        });
    }
    Ok((flux, state))
}

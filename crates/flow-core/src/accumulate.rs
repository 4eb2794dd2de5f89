// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Flow Accumulation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Public flow accumulation operations.
//!
//! Inputs are checked before anything is spawned. The returned
//! [`FlowAccumulation`] holds result grids whose partitions fill in as they
//! are solved, plus the driver computing them.

use crate::accumulator::Accumulator;
use crate::actor::{HostedPartition, PartitionRegistry};
use crate::front::FrontDriver;
use crate::grid::PartitionedGrid;
use crate::halo::border_rings;
use crate::output::{result_slots, PartitionSlot, ResultGrid};
use crate::solver::{PartitionInputs, PartitionState};
use flow_types::config::AccumulationConfig;
use flow_types::direction::FlowDirection;
use flow_types::element::Material;
use flow_types::error::{FlowError, FlowResult};
use ndarray::Array2;
use rayon::prelude::*;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use crate::front::AccumulationReport;

/// A running flow accumulation.
#[derive(Debug)]
pub struct FlowAccumulation<T> {
    /// Material leaving each cell.
    pub flux: ResultGrid<T>,
    /// Material retained in each cell, for criterion accumulators.
    pub state: Option<ResultGrid<T>>,
    driver: JoinHandle<FlowResult<AccumulationReport>>,
}

impl<T: Material> FlowAccumulation<T> {
    /// Wait for the whole run.
    pub async fn finish(self) -> FlowResult<AccumulationReport> {
        self.driver
            .await
            .map_err(|e| FlowError::Runtime(format!("Accumulation driver failed: {e}")))?
    }

    /// Wait for the whole run and stitch flux (and state) into arrays.
    pub async fn into_arrays(self) -> FlowResult<(Array2<T>, Option<Array2<T>>)> {
        let FlowAccumulation { flux, state, driver } = self;
        driver
            .await
            .map_err(|e| FlowError::Runtime(format!("Accumulation driver failed: {e}")))??;
        let flux = flux.to_array().await?;
        let state = match state {
            Some(state) => Some(state.to_array().await?),
            None => None,
        };
        Ok((flux, state))
    }
}

/// Accumulate material downstream along the flow direction network.
///
/// Only accumulators without a criterion are accepted. Must be called from
/// within a tokio runtime.
pub fn flow_accumulate<T: Material>(
    flow_direction: &PartitionedGrid<FlowDirection>,
    material: &PartitionedGrid<T>,
    accumulator: Accumulator,
    config: &AccumulationConfig,
) -> FlowResult<FlowAccumulation<T>> {
    if accumulator.uses_criterion() {
        return Err(FlowError::ConfigError(format!(
            "The {} accumulator needs a criterion grid",
            accumulator.name()
        )));
    }
    start(flow_direction, material, None, accumulator, config)
}

/// Accumulate material downstream, splitting it at every cell into flux
/// and state according to `criterion`.
pub fn flow_accumulate_with_criterion<T: Material>(
    flow_direction: &PartitionedGrid<FlowDirection>,
    material: &PartitionedGrid<T>,
    criterion: &PartitionedGrid<T>,
    accumulator: Accumulator,
    config: &AccumulationConfig,
) -> FlowResult<FlowAccumulation<T>> {
    if !accumulator.uses_criterion() {
        return Err(FlowError::ConfigError(format!(
            "The {} accumulator does not take a criterion grid",
            accumulator.name()
        )));
    }
    start(flow_direction, material, Some(criterion), accumulator, config)
}

fn start<T: Material>(
    flow_direction: &PartitionedGrid<FlowDirection>,
    material: &PartitionedGrid<T>,
    criterion: Option<&PartitionedGrid<T>>,
    accumulator: Accumulator,
    config: &AccumulationConfig,
) -> FlowResult<FlowAccumulation<T>> {
    config.validate()?;
    flow_direction.verify_compatible(material, "material")?;
    if let Some(criterion) = criterion {
        flow_direction.verify_compatible(criterion, "criterion")?;
    }
    let runtime = Handle::try_current().map_err(|e| FlowError::Runtime(e.to_string()))?;

    let layout = flow_direction.layout().clone();
    let (flux_slots, flux) = result_slots(layout.clone());
    let (state_slots, state) = match criterion {
        Some(_) => {
            let (slots, grid) = result_slots(layout);
            (Some(slots), Some(grid))
        }
        None => (None, None),
    };

    let driver = runtime.spawn(run_accumulation(
        flow_direction.clone(),
        material.clone(),
        criterion.cloned(),
        accumulator,
        config.clone(),
        flux_slots,
        state_slots,
    ));
    Ok(FlowAccumulation { flux, state, driver })
}

async fn run_accumulation<T: Material>(
    flow_direction: PartitionedGrid<FlowDirection>,
    material: PartitionedGrid<T>,
    criterion: Option<PartitionedGrid<T>>,
    accumulator: Accumulator,
    config: AccumulationConfig,
    flux_slots: Vec<PartitionSlot<T>>,
    state_slots: Option<Vec<PartitionSlot<T>>>,
) -> FlowResult<AccumulationReport> {
    let started = Instant::now();
    let layout = flow_direction.layout().clone();
    info!(
        shape = ?layout.shape(),
        partitions = layout.nr_partitions(),
        nodes = layout.nr_nodes(),
        accumulator = accumulator.name(),
        "Flow accumulation started"
    );

    let partitions = tokio::task::spawn_blocking(move || {
        solve_partitions(&flow_direction, &material, criterion.as_ref(), accumulator)
    })
    .await
    .map_err(|e| FlowError::Runtime(format!("Intra-partition solve failed: {e}")))??;

    let cross_partition_edges = partitions.iter().map(PartitionState::nr_input_edges).sum();
    let mut state_slots = state_slots.map(Vec::into_iter);
    let hosted = partitions
        .into_iter()
        .zip(flux_slots)
        .map(|(state, flux_slot)| HostedPartition {
            state,
            flux_slot,
            state_slot: state_slots.as_mut().and_then(Iterator::next),
        })
        .collect();

    let registry = PartitionRegistry::spawn(hosted, config.mailbox_capacity);
    let result = FrontDriver::new(layout, registry, &config, cross_partition_edges)
        .run()
        .await;
    match &result {
        Ok(report) => info!(
            rounds = report.rounds,
            tasks = report.tasks_spawned,
            transferred = report.contributions_transferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Flow accumulation finished"
        ),
        Err(e) => warn!(error = %e, "Flow accumulation failed"),
    }
    result
}

/// Border ring, inflow count and intra-partition solve of every partition,
/// in parallel. Returns partition states in row-major order.
pub fn solve_partitions<T: Material>(
    flow_direction: &PartitionedGrid<FlowDirection>,
    material: &PartitionedGrid<T>,
    criterion: Option<&PartitionedGrid<T>>,
    accumulator: Accumulator,
) -> FlowResult<Vec<PartitionState<T>>> {
    let rings = border_rings(flow_direction, FlowDirection::NoData)?;
    let missing = |what: &str, row: usize, col: usize| {
        FlowError::Partitioning(format!("{what} has no partition ({row}, {col})"))
    };
    let inputs = flow_direction
        .partitions()
        .zip(rings)
        .map(|((tile, data), ring)| {
            let material = material
                .partition(tile.row, tile.col)
                .ok_or_else(|| missing("material", tile.row, tile.col))?;
            let criterion = criterion
                .map(|criterion| {
                    criterion
                        .partition(tile.row, tile.col)
                        .cloned()
                        .ok_or_else(|| missing("criterion", tile.row, tile.col))
                })
                .transpose()?;
            Ok(PartitionInputs {
                tile: tile.clone(),
                flow_direction: data.clone(),
                ring,
                material: material.clone(),
                criterion,
            })
        })
        .collect::<FlowResult<Vec<_>>>()?;

    inputs
        .into_par_iter()
        .map(|inputs| PartitionState::solve_intra_partition(inputs, accumulator))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridLayout;
    use std::sync::Arc;

    fn grids(partitions: (usize, usize)) -> (PartitionedGrid<FlowDirection>, PartitionedGrid<f64>) {
        let layout = Arc::new(GridLayout::new((4, 4), partitions, 1).expect("layout"));
        (
            PartitionedGrid::filled(layout.clone(), FlowDirection::Sink),
            PartitionedGrid::filled(layout, 1.0),
        )
    }

    #[test]
    fn test_mismatch_rejected_without_runtime() {
        // Precondition checks come before the runtime lookup.
        let (fd, _) = grids((2, 2));
        let (_, material) = grids((1, 2));
        let err = flow_accumulate(&fd, &material, Accumulator::Plain, &AccumulationConfig::default())
            .expect_err("partitioning differs");
        assert!(matches!(err, FlowError::Partitioning(_)));
    }

    #[test]
    fn test_no_runtime_is_reported() {
        let (fd, material) = grids((2, 2));
        let err = flow_accumulate(&fd, &material, Accumulator::Plain, &AccumulationConfig::default())
            .expect_err("no runtime");
        assert!(matches!(err, FlowError::Runtime(_)));
    }

    #[test]
    fn test_accumulator_and_criterion_must_agree() {
        let (fd, material) = grids((1, 1));
        let cfg = AccumulationConfig::default();
        let err = flow_accumulate(&fd, &material, Accumulator::Threshold, &cfg).expect_err("needs criterion");
        assert!(matches!(err, FlowError::ConfigError(_)));
        let err = flow_accumulate_with_criterion(&fd, &material, &material, Accumulator::Plain, &cfg)
            .expect_err("plain takes no criterion");
        assert!(matches!(err, FlowError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (fd, material) = grids((1, 1));
        let cfg = AccumulationConfig {
            mailbox_capacity: 0,
            ..AccumulationConfig::default()
        };
        let err = flow_accumulate(&fd, &material, Accumulator::Plain, &cfg).expect_err("bad config");
        assert!(matches!(err, FlowError::ConfigError(_)));
    }

    #[test]
    fn test_solve_partitions_all_sinks() {
        let (fd, material) = grids((2, 2));
        let states = solve_partitions(&fd, &material, None, Accumulator::Plain).expect("solve");
        assert_eq!(states.len(), 4);
        assert!(states.iter().all(PartitionState::is_solved));
        assert!(states.iter().all(|s| s.flux().iter().all(|&v| v == 1.0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_all_sinks_publish_material_unchanged() {
        let (fd, material) = grids((2, 2));
        let run = flow_accumulate(&fd, &material, Accumulator::Plain, &AccumulationConfig::default())
            .expect("start");
        let (flux, state) = run.into_arrays().await.expect("run");
        assert!(state.is_none());
        assert_eq!(flux, Array2::from_elem((4, 4), 1.0));
    }
}

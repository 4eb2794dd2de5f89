// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Accumulation Front Driver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Rounds of cross-partition material transfer.
//!
//! Each round rebuilds an [`AccumulationFront`] from fresh status queries,
//! then spawns one absorb task per unsolved partition that some neighbour
//! holds output for. A task drains those neighbours and hands the material
//! to its partition, which resumes accumulation. Partitions publish their
//! results themselves as soon as they are solved.
//!
//! Only the partition an output is destined for ever drains it, so every
//! round that spawns tasks transfers at least one flow edge. A valid run
//! therefore needs at most as many rounds as there are cross-partition flow
//! edges; a round with nothing to transfer while partitions are unsolved
//! means the flow network contains a cycle.

use crate::actor::{PartitionHandle, PartitionRegistry};
use crate::grid::GridLayout;
use crate::solver::{AbsorbReport, Contribution, PartitionStatus};
use flow_types::config::AccumulationConfig;
use flow_types::direction::Offset;
use flow_types::element::Material;
use flow_types::error::{FlowError, FlowResult};
use futures::future::{join_all, try_join_all};
use ndarray::Array2;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Outcome of a completed accumulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulationReport {
    pub partitions: usize,
    pub cross_partition_edges: usize,
    pub round_limit: usize,
    pub rounds: usize,
    pub tasks_spawned: usize,
    pub contributions_transferred: usize,
}

/// Which partitions are solved, and which neighbours each unsolved
/// partition can receive material from right now.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationFront {
    solved: Array2<bool>,
    upstream: Array2<BTreeSet<Offset>>,
}

impl AccumulationFront {
    /// Build from per-partition statuses. `None` marks a partition already
    /// known to be solved.
    pub fn from_statuses(statuses: &Array2<Option<PartitionStatus>>) -> FlowResult<Self> {
        let (prows, pcols) = statuses.dim();
        let mut solved = Array2::from_elem((prows, pcols), true);
        let mut upstream = Array2::from_elem((prows, pcols), BTreeSet::new());
        for ((row, col), status) in statuses.indexed_iter() {
            let Some(status) = status else {
                continue;
            };
            solved[[row, col]] = status.solved;
            for &offset in &status.pending_output_offsets {
                let target_row = row as isize + offset.row as isize;
                let target_col = col as isize + offset.col as isize;
                if target_row < 0
                    || target_col < 0
                    || target_row >= prows as isize
                    || target_col >= pcols as isize
                {
                    return Err(FlowError::Internal(format!(
                        "Partition ({row}, {col}) holds output for {offset}, outside the partition grid"
                    )));
                }
                upstream[[target_row as usize, target_col as usize]].insert(offset.invert());
            }
        }
        Ok(AccumulationFront { solved, upstream })
    }

    pub fn solved(&self) -> &Array2<bool> {
        &self.solved
    }

    pub fn is_solved(&self, row: usize, col: usize) -> bool {
        self.solved[[row, col]]
    }

    /// Offsets of the neighbours holding material for partition (row, col).
    pub fn upstream(&self, row: usize, col: usize) -> &BTreeSet<Offset> {
        &self.upstream[[row, col]]
    }

    pub fn nr_solved(&self) -> usize {
        self.solved.iter().filter(|&&s| s).count()
    }

    pub fn nr_unsolved(&self) -> usize {
        self.solved.len() - self.nr_solved()
    }

    pub fn is_complete(&self) -> bool {
        self.solved.iter().all(|&s| s)
    }

    /// Unsolved partitions with at least one neighbour to receive from.
    pub fn actionable(&self) -> Vec<((usize, usize), &BTreeSet<Offset>)> {
        self.upstream
            .indexed_iter()
            .filter(|(position, offsets)| !self.solved[*position] && !offsets.is_empty())
            .collect()
    }
}

/// Drain every upstream neighbour of one partition and let it absorb the
/// material.
async fn absorb_neighbour_material<T: Material>(
    target: PartitionHandle<T>,
    receiver_shape: (usize, usize),
    sources: Vec<(Offset, PartitionHandle<T>)>,
    _permit: OwnedSemaphorePermit,
) -> FlowResult<AbsorbReport> {
    let drained = try_join_all(sources.iter().map(|(from, source)| async move {
        let cells = source.drain(from.invert(), receiver_shape).await?;
        Ok::<_, FlowError>(
            cells
                .into_iter()
                .map(|(cell, value)| Contribution {
                    cell,
                    from: *from,
                    value,
                })
                .collect::<Vec<_>>(),
        )
    }))
    .await?;
    target.absorb(drained.into_iter().flatten().collect()).await
}

pub struct FrontDriver<T> {
    layout: Arc<GridLayout>,
    registry: PartitionRegistry<T>,
    max_concurrent_tasks: usize,
    round_limit: usize,
    cross_partition_edges: usize,
}

impl<T: Material> FrontDriver<T> {
    pub fn new(
        layout: Arc<GridLayout>,
        registry: PartitionRegistry<T>,
        config: &AccumulationConfig,
        cross_partition_edges: usize,
    ) -> Self {
        FrontDriver {
            layout,
            registry,
            max_concurrent_tasks: config.max_concurrent_tasks.max(1),
            round_limit: config.round_limit.unwrap_or(cross_partition_edges + 1),
            cross_partition_edges,
        }
    }

    /// Drive rounds until every partition is solved, then stop the actors.
    pub async fn run(self) -> FlowResult<AccumulationReport> {
        let mut report = AccumulationReport {
            partitions: self.layout.nr_partitions(),
            cross_partition_edges: self.cross_partition_edges,
            round_limit: self.round_limit,
            ..AccumulationReport::default()
        };
        let outcome = self.drive(&mut report).await;
        self.registry.shutdown().await;
        outcome.map(|()| report)
    }

    async fn drive(&self, report: &mut AccumulationReport) -> FlowResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));
        let mut known_solved = Array2::from_elem(self.layout.shape_in_partitions(), false);
        loop {
            let front = self.front(&known_solved).await?;
            for (position, &solved) in front.solved().indexed_iter() {
                if solved && !known_solved[position] {
                    known_solved[position] = true;
                    debug!(row = position.0, col = position.1, round = report.rounds, "Partition solved");
                }
            }

            let actionable = front.actionable();
            if actionable.is_empty() {
                if front.is_complete() {
                    return Ok(());
                }
                warn!(
                    round = report.rounds,
                    unsolved = front.nr_unsolved(),
                    "No material left to transfer while partitions are unsolved"
                );
                return Err(FlowError::NonConvergence {
                    rounds: report.rounds,
                    unsolved: front.nr_unsolved(),
                    message: "no partition can receive material; the flow direction network contains a cycle"
                        .to_string(),
                });
            }
            if report.rounds >= self.round_limit {
                return Err(FlowError::NonConvergence {
                    rounds: report.rounds,
                    unsolved: front.nr_unsolved(),
                    message: format!("round limit of {} reached", self.round_limit),
                });
            }

            report.rounds += 1;
            debug!(
                round = report.rounds,
                actionable = actionable.len(),
                solved = front.nr_solved(),
                "Accumulation round started"
            );

            let mut tasks = Vec::with_capacity(actionable.len());
            for ((row, col), offsets) in actionable {
                let target = self.handle(row, col)?;
                let receiver_shape = self.tile_shape(row, col)?;
                let sources = offsets
                    .iter()
                    .map(|&from| {
                        let (r, c) = (row as isize + from.row as isize, col as isize + from.col as isize);
                        Ok((from, self.handle(r as usize, c as usize)?))
                    })
                    .collect::<FlowResult<Vec<_>>>()?;
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| FlowError::Runtime(e.to_string()))?;
                tasks.push(tokio::spawn(absorb_neighbour_material(
                    target,
                    receiver_shape,
                    sources,
                    permit,
                )));
            }
            report.tasks_spawned += tasks.len();

            for joined in join_all(tasks).await {
                let absorbed = joined.map_err(|e| FlowError::Runtime(format!("Absorb task failed: {e}")))??;
                report.contributions_transferred += absorbed.received;
            }
        }
    }

    async fn front(&self, known_solved: &Array2<bool>) -> FlowResult<AccumulationFront> {
        let queries = self.layout.tiles().iter().map(|tile| async move {
            if known_solved[[tile.row, tile.col]] {
                return FlowResult::<Option<PartitionStatus>>::Ok(None);
            }
            self.registry.resolve(tile.address())?.status().await.map(Some)
        });
        let statuses = try_join_all(queries).await?;
        let statuses = Array2::from_shape_vec(self.layout.shape_in_partitions(), statuses)
            .map_err(|e| FlowError::Internal(e.to_string()))?;
        AccumulationFront::from_statuses(&statuses)
    }

    fn handle(&self, row: usize, col: usize) -> FlowResult<PartitionHandle<T>> {
        let tile = self.layout.tile(row, col).ok_or_else(|| {
            FlowError::Internal(format!("Partition ({row}, {col}) is outside the layout"))
        })?;
        self.registry.resolve(tile.address())
    }

    fn tile_shape(&self, row: usize, col: usize) -> FlowResult<(usize, usize)> {
        self.layout
            .tile(row, col)
            .map(|tile| tile.shape())
            .ok_or_else(|| FlowError::Internal(format!("Partition ({row}, {col}) is outside the layout")))
    }
}

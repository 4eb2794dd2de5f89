// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Result Slots
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Write-once per-partition results.
//!
//! A [`ResultGrid`] is handed to the caller before accumulation starts. Each
//! of its partitions becomes available the moment that partition is solved,
//! independently of the rest of the grid.

use crate::grid::{GridLayout, PartitionTile, PartitionedGrid};
use flow_types::error::{FlowError, FlowResult};
use futures::future::try_join_all;
use ndarray::Array2;
use std::sync::Arc;
use tokio::sync::watch;

type Shared<T> = Option<Arc<Array2<T>>>;

/// Producer side of one partition's result. Consumed on fulfilment.
#[derive(Debug)]
pub struct PartitionSlot<T> {
    tile: PartitionTile,
    sender: watch::Sender<Shared<T>>,
}

impl<T> PartitionSlot<T> {
    pub fn tile(&self) -> &PartitionTile {
        &self.tile
    }

    pub fn fulfil(self, data: Array2<T>) {
        // Storing the value cannot fail, even when every consumer is gone.
        self.sender.send_replace(Some(Arc::new(data)));
    }
}

/// Consumer side of one partition's result.
#[derive(Debug, Clone)]
pub struct PartitionFuture<T> {
    tile: PartitionTile,
    receiver: watch::Receiver<Shared<T>>,
}

impl<T> PartitionFuture<T> {
    pub fn tile(&self) -> &PartitionTile {
        &self.tile
    }

    pub fn is_ready(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    pub fn try_get(&self) -> Option<Arc<Array2<T>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the partition. Fails if the run ended without producing it.
    pub async fn wait(&self) -> FlowResult<Arc<Array2<T>>> {
        let mut receiver = self.receiver.clone();
        let value = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| FlowError::PartitionUnavailable {
                row: self.tile.row,
                col: self.tile.col,
            })?;
        value.clone().ok_or_else(|| {
            FlowError::Internal(format!(
                "Partition ({}, {}) signalled ready without data",
                self.tile.row, self.tile.col
            ))
        })
    }
}

/// Partitioned output whose partitions are filled in as they are solved.
#[derive(Debug, Clone)]
pub struct ResultGrid<T> {
    layout: Arc<GridLayout>,
    partitions: Vec<PartitionFuture<T>>,
}

impl<T> ResultGrid<T> {
    pub fn layout(&self) -> &Arc<GridLayout> {
        &self.layout
    }

    pub fn partition(&self, row: usize, col: usize) -> Option<&PartitionFuture<T>> {
        let tile = self.layout.tile(row, col)?;
        self.partitions.get(tile.index)
    }

    pub fn partitions(&self) -> &[PartitionFuture<T>] {
        &self.partitions
    }

    pub fn nr_ready(&self) -> usize {
        self.partitions.iter().filter(|p| p.is_ready()).count()
    }

    /// Wait for every partition.
    pub async fn collect(&self) -> FlowResult<PartitionedGrid<T>> {
        let partitions = try_join_all(self.partitions.iter().map(PartitionFuture::wait)).await?;
        Ok(PartitionedGrid::from_shared(self.layout.clone(), partitions))
    }
}

impl<T: Clone> ResultGrid<T> {
    /// Wait for every partition and stitch them into one array.
    pub async fn to_array(&self) -> FlowResult<Array2<T>> {
        Ok(self.collect().await?.to_array())
    }
}

/// Create empty slots for every partition of `layout`, row-major.
pub fn result_slots<T>(layout: Arc<GridLayout>) -> (Vec<PartitionSlot<T>>, ResultGrid<T>) {
    let (slots, partitions): (Vec<_>, Vec<_>) = layout
        .tiles()
        .iter()
        .map(|tile| {
            let (sender, receiver) = watch::channel(None);
            (
                PartitionSlot {
                    tile: tile.clone(),
                    sender,
                },
                PartitionFuture {
                    tile: tile.clone(),
                    receiver,
                },
            )
        })
        .unzip();
    (slots, ResultGrid { layout, partitions })
}

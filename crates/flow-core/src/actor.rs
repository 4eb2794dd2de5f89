// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Partition Actors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! One task per partition, owning its accumulation state.
//!
//! All mutation of a partition (drains, absorbs) goes through its mailbox
//! and is applied one request at a time. Actors never call each other;
//! cross-partition work is done by short-lived tasks holding handles for
//! the duration of one request. Handles are resolved from addresses through
//! the [`PartitionRegistry`].

use crate::grid::PartitionAddress;
use crate::output::PartitionSlot;
use crate::solver::{AbsorbReport, Contribution, PartitionState, PartitionStatus};
use flow_types::direction::{CellIdx, Offset};
use flow_types::element::Material;
use flow_types::error::{FlowError, FlowResult};
use futures::future::join_all;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

type Drained<T> = Vec<(CellIdx, T)>;

enum PartitionRequest<T> {
    Drain {
        towards: Offset,
        receiver_shape: (usize, usize),
        reply: oneshot::Sender<FlowResult<Drained<T>>>,
    },
    Absorb {
        contributions: Vec<Contribution<T>>,
        reply: oneshot::Sender<FlowResult<AbsorbReport>>,
    },
    Status {
        reply: oneshot::Sender<PartitionStatus>,
    },
    Stop,
}

/// A partition's state together with the slots its results go to.
pub struct HostedPartition<T> {
    pub state: PartitionState<T>,
    pub flux_slot: PartitionSlot<T>,
    pub state_slot: Option<PartitionSlot<T>>,
}

struct PartitionActor<T> {
    address: PartitionAddress,
    partition: PartitionState<T>,
    flux_slot: Option<PartitionSlot<T>>,
    state_slot: Option<PartitionSlot<T>>,
    mailbox: mpsc::Receiver<PartitionRequest<T>>,
}

impl<T: Material> PartitionActor<T> {
    async fn run(mut self) {
        self.publish_if_solved();
        while let Some(request) = self.mailbox.recv().await {
            match request {
                PartitionRequest::Drain {
                    towards,
                    receiver_shape,
                    reply,
                } => {
                    let drained = self.partition.drain(towards, receiver_shape);
                    if let Ok(cells) = &drained {
                        trace!(row = self.address.row, col = self.address.col, %towards, cells = cells.len(), "Drained");
                    }
                    let _ = reply.send(drained);
                }
                PartitionRequest::Absorb {
                    contributions,
                    reply,
                } => {
                    let report = self.partition.absorb(contributions);
                    let _ = reply.send(report);
                }
                PartitionRequest::Status { reply } => {
                    let _ = reply.send(self.partition.status());
                }
                PartitionRequest::Stop => break,
            }
            self.publish_if_solved();
        }
    }

    /// Fulfil the result slots the first time the partition is solved.
    fn publish_if_solved(&mut self) {
        if self.flux_slot.is_none() || !self.partition.is_solved() {
            return;
        }
        if let Some(slot) = self.flux_slot.take() {
            slot.fulfil(self.partition.flux().clone());
        }
        if let (Some(slot), Some(state)) = (self.state_slot.take(), self.partition.state()) {
            slot.fulfil(state.clone());
        }
        debug!(
            row = self.address.row,
            col = self.address.col,
            node = self.address.node.0,
            "Partition published"
        );
    }
}

/// Short-lived reference to a partition actor.
#[derive(Debug)]
pub struct PartitionHandle<T> {
    address: PartitionAddress,
    sender: mpsc::Sender<PartitionRequest<T>>,
}

impl<T> Clone for PartitionHandle<T> {
    fn clone(&self) -> Self {
        PartitionHandle {
            address: self.address,
            sender: self.sender.clone(),
        }
    }
}

impl<T> PartitionHandle<T> {
    pub fn address(&self) -> PartitionAddress {
        self.address
    }

    /// Collect and remove the output this partition holds for the
    /// neighbour at `towards`.
    pub async fn drain(&self, towards: Offset, receiver_shape: (usize, usize)) -> FlowResult<Drained<T>> {
        self.request(|reply| PartitionRequest::Drain {
            towards,
            receiver_shape,
            reply,
        })
        .await?
    }

    pub async fn absorb(&self, contributions: Vec<Contribution<T>>) -> FlowResult<AbsorbReport> {
        self.request(|reply| PartitionRequest::Absorb {
            contributions,
            reply,
        })
        .await?
    }

    pub async fn status(&self) -> FlowResult<PartitionStatus> {
        self.request(|reply| PartitionRequest::Status { reply }).await
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> PartitionRequest<T>,
    ) -> FlowResult<R> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| self.unreachable())?;
        response.await.map_err(|_| self.unreachable())
    }

    fn unreachable(&self) -> FlowError {
        FlowError::Internal(format!(
            "Partition ({}, {}) on node {} stopped answering",
            self.address.row, self.address.col, self.address.node.0
        ))
    }
}

/// Resolves partition addresses to live actor handles.
pub struct PartitionRegistry<T> {
    mailboxes: HashMap<PartitionAddress, mpsc::Sender<PartitionRequest<T>>>,
    actors: Vec<JoinHandle<()>>,
}

impl<T: Material> PartitionRegistry<T> {
    /// Start one actor per partition. Must be called inside a tokio runtime.
    pub fn spawn(partitions: Vec<HostedPartition<T>>, mailbox_capacity: usize) -> Self {
        let mut mailboxes = HashMap::with_capacity(partitions.len());
        let mut actors = Vec::with_capacity(partitions.len());
        for hosted in partitions {
            let address = hosted.state.tile().address();
            let (sender, mailbox) = mpsc::channel(mailbox_capacity.max(1));
            let actor = PartitionActor {
                address,
                partition: hosted.state,
                flux_slot: Some(hosted.flux_slot),
                state_slot: hosted.state_slot,
                mailbox,
            };
            actors.push(tokio::spawn(actor.run()));
            mailboxes.insert(address, sender);
        }
        PartitionRegistry { mailboxes, actors }
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }

    pub fn resolve(&self, address: PartitionAddress) -> FlowResult<PartitionHandle<T>> {
        let sender = self.mailboxes.get(&address).ok_or_else(|| {
            FlowError::Internal(format!("No partition registered at {address:?}"))
        })?;
        Ok(PartitionHandle {
            address,
            sender: sender.clone(),
        })
    }

    /// Stop every actor and wait for it to finish. Handles still held
    /// elsewhere get an `Internal` error on their next request.
    pub async fn shutdown(self) {
        let PartitionRegistry { mailboxes, actors } = self;
        for (address, sender) in mailboxes {
            if sender.send(PartitionRequest::Stop).await.is_err() {
                trace!(row = address.row, col = address.col, "Partition actor already gone");
            }
        }
        for joined in join_all(actors).await {
            if let Err(e) = joined {
                debug!(error = %e, "Partition actor ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use crate::grid::{GridLayout, PartitionedGrid};
    use crate::halo::border_rings;
    use crate::output::result_slots;
    use crate::solver::PartitionInputs;
    use flow_types::direction::{directions_from_codes, FlowDirection};
    use ndarray::Array2;
    use std::sync::Arc;

    fn hosted_chain() -> (Vec<HostedPartition<f64>>, crate::output::ResultGrid<f64>) {
        let shape = (1, 6);
        let layout = Arc::new(GridLayout::new(shape, (1, 2), 2).expect("layout"));
        let fd = PartitionedGrid::from_array(
            &directions_from_codes(shape, &[6, 6, 6, 6, 6, 5]).expect("codes"),
            layout.clone(),
        )
        .expect("split");
        let material = PartitionedGrid::filled(layout.clone(), 1.0f64);
        let rings = border_rings(&fd, FlowDirection::NoData).expect("rings");
        let (slots, grid) = result_slots(layout.clone());
        let hosted = layout
            .tiles()
            .iter()
            .zip(rings)
            .zip(slots)
            .map(|((tile, ring), flux_slot)| {
                let inputs = PartitionInputs {
                    tile: tile.clone(),
                    flow_direction: fd.partition(tile.row, tile.col).unwrap().clone(),
                    ring,
                    material: material.partition(tile.row, tile.col).unwrap().clone(),
                    criterion: None,
                };
                HostedPartition {
                    state: PartitionState::solve_intra_partition(inputs, Accumulator::Plain).expect("solve"),
                    flux_slot,
                    state_slot: None,
                }
            })
            .collect();
        (hosted, grid)
    }

    #[tokio::test]
    async fn test_actors_serve_drain_absorb_status() {
        let (hosted, grid) = hosted_chain();
        let addresses: Vec<PartitionAddress> = hosted.iter().map(|h| h.state.tile().address()).collect();
        let registry = PartitionRegistry::spawn(hosted, 4);
        assert_eq!(registry.len(), 2);

        let left = registry.resolve(addresses[0]).expect("left");
        let right = registry.resolve(addresses[1]).expect("right");
        assert_eq!(right.address().node.0, 1);

        let status = left.status().await.expect("status");
        assert!(!status.solved);
        assert!(!grid.partition(0, 0).unwrap().is_ready());

        let drained = left.drain(Offset::EAST, (1, 3)).await.expect("drain");
        assert_eq!(drained, vec![((0, 0), 3.0)]);
        let contributions = drained
            .into_iter()
            .map(|(cell, value)| Contribution { cell, from: Offset::WEST, value })
            .collect();
        let report = right.absorb(contributions).await.expect("absorb");
        assert!(report.solved);

        let flux = grid.to_array().await.expect("published");
        assert_eq!(flux, Array2::from_shape_vec((1, 6), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_errors_travel_back_to_requester() {
        let (hosted, _grid) = hosted_chain();
        let address = hosted[1].state.tile().address();
        let registry = PartitionRegistry::spawn(hosted, 1);
        let right = registry.resolve(address).expect("right");
        // The right partition drains into nothing.
        let err = right.drain(Offset::EAST, (1, 3)).await.expect_err("never registered");
        assert!(matches!(err, FlowError::Internal(_)));
        // The actor keeps serving after an error.
        assert_eq!(right.status().await.expect("status").pending_inputs, 1);

        let stray = PartitionAddress { node: address.node, row: 5, col: 5 };
        assert!(registry.resolve(stray).is_err());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_live_handles() {
        let (hosted, _grid) = hosted_chain();
        let address = hosted[0].state.tile().address();
        let registry = PartitionRegistry::spawn(hosted, 2);
        let left = registry.resolve(address).expect("left");
        let copy = left.clone();
        tokio::time::timeout(std::time::Duration::from_secs(5), registry.shutdown())
            .await
            .expect("shutdown does not wait for handles");
        let err = copy.status().await.expect_err("actor stopped");
        assert!(matches!(err, FlowError::Internal(_)));
        drop(left);
    }
}

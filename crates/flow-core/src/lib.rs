//! Distributed D8 flow accumulation.
//!
//! Halo exchange, inflow counting, intra-partition solving, partition I/O
//! ledgers and the accumulation front driver.

pub mod accumulate;
pub mod accumulator;
pub mod actor;
pub mod front;
pub mod grid;
pub mod halo;
pub mod inflow;
pub mod ledger;
pub mod output;
pub mod serial;
pub mod solver;

pub use accumulate::{flow_accumulate, flow_accumulate_with_criterion, AccumulationReport, FlowAccumulation};
pub use accumulator::Accumulator;
pub use grid::{GridLayout, PartitionedGrid};
pub use inflow::inflow_count;
pub use serial::accumulate_serial;

// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — D8 Flow Directions
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! D8 flow directions and partition/cell offsets.
//!
//! Directions use the numeric keypad convention (8 is north, 2 is south,
//! 5 is a sink). Rows grow southwards, columns grow eastwards.

use crate::error::{FlowError, FlowResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Local cell index `(row, col)` inside one partition.
pub type CellIdx = (usize, usize);

/// Row/column displacement between two adjacent cells or partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub row: i8,
    pub col: i8,
}

impl Offset {
    pub const ZERO: Offset = Offset::new(0, 0);
    pub const NORTH: Offset = Offset::new(-1, 0);
    pub const NORTH_EAST: Offset = Offset::new(-1, 1);
    pub const EAST: Offset = Offset::new(0, 1);
    pub const SOUTH_EAST: Offset = Offset::new(1, 1);
    pub const SOUTH: Offset = Offset::new(1, 0);
    pub const SOUTH_WEST: Offset = Offset::new(1, -1);
    pub const WEST: Offset = Offset::new(0, -1);
    pub const NORTH_WEST: Offset = Offset::new(-1, -1);

    pub const fn new(row: i8, col: i8) -> Self {
        Offset { row, col }
    }

    /// Offset pointing the other way.
    pub const fn invert(self) -> Self {
        Offset::new(-self.row, -self.col)
    }

    /// True for the 8 offsets of the Moore neighbourhood.
    pub fn is_neighbour(self) -> bool {
        self != Offset::ZERO && (-1..=1).contains(&self.row) && (-1..=1).contains(&self.col)
    }

    /// Apply to a cell index, returning signed coordinates that may lie outside
    /// the partition.
    pub fn apply(self, (row, col): CellIdx) -> (isize, isize) {
        (row as isize + self.row as isize, col as isize + self.col as isize)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:+}, {:+})", self.row, self.col)
    }
}

/// The 8 neighbour offsets, clockwise from north.
pub const NEIGHBOUR_OFFSETS: [Offset; 8] = [
    Offset::NORTH,
    Offset::NORTH_EAST,
    Offset::EAST,
    Offset::SOUTH_EAST,
    Offset::SOUTH,
    Offset::SOUTH_WEST,
    Offset::WEST,
    Offset::NORTH_WEST,
];

/// D8 flow direction of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlowDirection {
    SouthWest = 1,
    South = 2,
    SouthEast = 3,
    West = 4,
    Sink = 5,
    East = 6,
    NorthWest = 7,
    North = 8,
    NorthEast = 9,
    /// Missing value. Also used as the halo sentinel at the grid border.
    NoData = 255,
}

impl FlowDirection {
    /// The 8 directions with an outgoing edge.
    pub const DRAINING: [FlowDirection; 8] = [
        FlowDirection::North,
        FlowDirection::NorthEast,
        FlowDirection::East,
        FlowDirection::SouthEast,
        FlowDirection::South,
        FlowDirection::SouthWest,
        FlowDirection::West,
        FlowDirection::NorthWest,
    ];

    /// Decode a keypad code. Codes outside 1..=9 decode to `NoData`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => FlowDirection::SouthWest,
            2 => FlowDirection::South,
            3 => FlowDirection::SouthEast,
            4 => FlowDirection::West,
            5 => FlowDirection::Sink,
            6 => FlowDirection::East,
            7 => FlowDirection::NorthWest,
            8 => FlowDirection::North,
            9 => FlowDirection::NorthEast,
            _ => FlowDirection::NoData,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_sink(self) -> bool {
        self == FlowDirection::Sink
    }

    pub fn is_no_data(self) -> bool {
        self == FlowDirection::NoData
    }

    /// Offset to the downstream cell, `None` for sinks and no-data.
    pub fn offset(self) -> Option<Offset> {
        match self {
            FlowDirection::North => Some(Offset::NORTH),
            FlowDirection::NorthEast => Some(Offset::NORTH_EAST),
            FlowDirection::East => Some(Offset::EAST),
            FlowDirection::SouthEast => Some(Offset::SOUTH_EAST),
            FlowDirection::South => Some(Offset::SOUTH),
            FlowDirection::SouthWest => Some(Offset::SOUTH_WEST),
            FlowDirection::West => Some(Offset::WEST),
            FlowDirection::NorthWest => Some(Offset::NORTH_WEST),
            FlowDirection::Sink | FlowDirection::NoData => None,
        }
    }

    /// Direction draining along `offset`, if it is a neighbour offset.
    pub fn towards(offset: Offset) -> Option<Self> {
        FlowDirection::DRAINING
            .into_iter()
            .find(|direction| direction.offset() == Some(offset))
    }
}

impl Default for FlowDirection {
    fn default() -> Self {
        FlowDirection::NoData
    }
}

/// Build a direction array from row-major keypad codes.
pub fn directions_from_codes(shape: (usize, usize), codes: &[u8]) -> FlowResult<Array2<FlowDirection>> {
    if shape.0 * shape.1 != codes.len() {
        return Err(FlowError::ShapeMismatch(format!(
            "{} direction codes cannot fill a {}x{} grid",
            codes.len(),
            shape.0,
            shape.1
        )));
    }
    Array2::from_shape_vec(shape, codes.iter().copied().map(FlowDirection::from_code).collect())
        .map_err(|e| FlowError::ShapeMismatch(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Accumulator Strategy
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! How material combines at a cell.
//!
//! Material arriving from upstream is summed into the downstream cell's flux
//! buffer. Once all of it has arrived the cell is entered: its own material
//! is added and the total is split into the flux leaving the cell and the
//! state retained in it.

use flow_types::element::Material;
use serde::{Deserialize, Serialize};

/// Accumulation rule, chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulator {
    /// All material moves downstream. No state output.
    #[default]
    Plain,
    /// The criterion is a per-cell threshold. Material up to the threshold
    /// stays in the cell, the excess moves downstream.
    Threshold,
    /// The criterion is a per-cell fraction in [0, 1] of the material that
    /// moves downstream. The rest stays in the cell.
    Fraction,
    /// The criterion is a per-cell capacity. Material up to the capacity
    /// moves downstream, the excess stays in the cell.
    Capacity,
    /// The criterion is a per-cell trigger. Everything stays in the cell
    /// until the total exceeds the trigger, then everything moves on.
    Trigger,
}

/// What has arrived at a cell from upstream so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InflowStatus {
    /// At least one upstream cell delivered a value.
    pub valid: bool,
    /// At least one upstream cell delivered no-data.
    pub no_data: bool,
}

impl InflowStatus {
    /// Only no-data arrived.
    pub fn is_no_data(self) -> bool {
        self.no_data && !self.valid
    }
}

/// Output buffers of one cell.
pub struct CellSlot<'a, T> {
    pub flux: &'a mut T,
    pub state: Option<&'a mut T>,
    pub status: &'a mut InflowStatus,
}

impl Accumulator {
    pub fn uses_criterion(self) -> bool {
        !matches!(self, Accumulator::Plain)
    }

    pub fn name(self) -> &'static str {
        match self {
            Accumulator::Plain => "plain",
            Accumulator::Threshold => "threshold",
            Accumulator::Fraction => "fraction",
            Accumulator::Capacity => "capacity",
            Accumulator::Trigger => "trigger",
        }
    }

    /// Split the total material at a cell into `(flux, state)`.
    ///
    /// Returns None when the criterion is missing or outside its domain.
    pub fn split<T: Material>(self, total: T, criterion: Option<T>) -> Option<(T, T)> {
        match self {
            Accumulator::Plain => Some((total, T::ZERO)),
            Accumulator::Threshold => {
                let threshold = criterion.filter(|t| !t.is_no_data() && *t >= T::ZERO)?;
                let state = total.min_value(threshold);
                Some((total - state, state))
            }
            Accumulator::Fraction => {
                let fraction =
                    criterion.filter(|f| !f.is_no_data() && *f >= T::ZERO && *f <= T::ONE)?;
                let flux = fraction * total;
                Some((flux, total - flux))
            }
            Accumulator::Capacity => {
                let capacity = criterion.filter(|c| !c.is_no_data() && *c >= T::ZERO)?;
                let flux = total.min_value(capacity);
                Some((flux, total - flux))
            }
            Accumulator::Trigger => {
                let trigger = criterion.filter(|t| !t.is_no_data() && *t >= T::ZERO)?;
                if total <= trigger {
                    Some((T::ZERO, total))
                } else {
                    Some((total, T::ZERO))
                }
            }
        }
    }

    /// Deliver material leaving an upstream cell to the cell it drains into.
    pub fn accumulate_downstream<T: Material>(self, incoming: T, slot: CellSlot<'_, T>) {
        if incoming.is_no_data() {
            slot.status.no_data = true;
        } else {
            *slot.flux = *slot.flux + incoming;
            slot.status.valid = true;
        }
    }

    /// Finalise a cell whose upstream material has all arrived. Returns the
    /// flux leaving the cell.
    pub fn enter_cell<T: Material>(self, material: T, criterion: Option<T>, slot: CellSlot<'_, T>) -> T {
        let outside_domain = self.uses_criterion() && material < T::ZERO;
        let result = if material.is_no_data() || slot.status.is_no_data() || outside_domain {
            None
        } else {
            self.split(*slot.flux + material, criterion)
        };
        let (flux, state) = result.unwrap_or_else(|| (T::no_data(), T::no_data()));
        *slot.flux = flux;
        if let Some(slot_state) = slot.state {
            *slot_state = state;
        }
        flux
    }
}

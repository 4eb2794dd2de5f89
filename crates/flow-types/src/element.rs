// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Material Elements
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

/// Number of upstream cells draining into a cell. At most 8.
pub type InflowCount = u8;

/// Inflow count of a cell with a no-data flow direction.
pub const INFLOW_COUNT_NO_DATA: InflowCount = u8::MAX;

/// Element type of material, criterion, flux and state grids.
///
/// No-data is represented in-band by NaN for floating point elements.
pub trait Material:
    Copy
    + Debug
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn no_data() -> Self;
    fn is_no_data(self) -> bool;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    /// Smaller of two valid values.
    fn min_value(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }
}

macro_rules! impl_float_material {
    ($($t:ty),*) => {
        $(
            impl Material for $t {
                const ZERO: Self = 0.0;
                const ONE: Self = 1.0;

                fn no_data() -> Self {
                    <$t>::NAN
                }

                fn is_no_data(self) -> bool {
                    self.is_nan()
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_float_material!(f32, f64);

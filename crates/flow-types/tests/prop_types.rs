// ─────────────────────────────────────────────────────────────────────
// SCPN Flow Core — Property-Based Tests (proptest) for flow-types
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for flow-types using proptest.
//!
//! Covers: keypad code decoding, offset geometry, layout config validation.

use flow_types::config::LayoutConfig;
use flow_types::direction::{directions_from_codes, FlowDirection, Offset};
use proptest::prelude::*;

// ── Flow Direction Codes ─────────────────────────────────────────────

proptest! {
    /// Every byte decodes, and only keypad digits decode to real directions.
    #[test]
    fn every_code_decodes(code in any::<u8>()) {
        let direction = FlowDirection::from_code(code);
        if (1..=9).contains(&code) {
            prop_assert_eq!(direction.code(), code);
        } else {
            prop_assert!(direction.is_no_data());
        }
    }

    /// Draining directions point at a unit neighbour; the opposite keypad
    /// digit (10 - code) points back.
    #[test]
    fn opposite_keypad_digit_inverts_offset(code in prop::sample::select(vec![1u8, 2, 3, 4, 6, 7, 8, 9])) {
        let forward = FlowDirection::from_code(code).offset().unwrap();
        let backward = FlowDirection::from_code(10 - code).offset().unwrap();
        prop_assert!(forward.is_neighbour());
        prop_assert_eq!(forward.invert(), backward);
    }

    /// Codes arrays keep their row-major placement.
    #[test]
    fn codes_array_is_row_major(
        rows in 1usize..8,
        cols in 1usize..8,
        seed in any::<u8>(),
    ) {
        let codes: Vec<u8> = (0..rows * cols).map(|i| (i as u8).wrapping_add(seed) % 11).collect();
        let grid = directions_from_codes((rows, cols), &codes).unwrap();
        for r in 0..rows {
            for c in 0..cols {
                prop_assert_eq!(grid[[r, c]], FlowDirection::from_code(codes[r * cols + c]));
            }
        }
    }
}

// ── Offsets ──────────────────────────────────────────────────────────

proptest! {
    /// Applying an offset and then its inverse is the identity.
    #[test]
    fn offset_apply_then_invert(
        row in 1usize..1000,
        col in 1usize..1000,
        dr in -1i8..=1,
        dc in -1i8..=1,
    ) {
        let offset = Offset::new(dr, dc);
        let (r, c) = offset.apply((row, col));
        let back = offset.invert().apply((r as usize, c as usize));
        prop_assert_eq!(back, (row as isize, col as isize));
    }
}

// ── Layout Config ────────────────────────────────────────────────────

proptest! {
    /// Layouts with at most one partition per cell validate.
    #[test]
    fn layout_fitting_partitions_validate(
        rows in 1usize..500,
        cols in 1usize..500,
        prows in 1usize..16,
        pcols in 1usize..16,
        nodes in 1usize..8,
    ) {
        let cfg = LayoutConfig { grid_shape: [rows, cols], partitions: [prows, pcols], nodes };
        let fits = prows <= rows && pcols <= cols;
        prop_assert_eq!(cfg.validate().is_ok(), fits);
    }
}

//! Fuzz target for neighbor-based position calculation.
//!
//! Feeds arbitrary bit patterns (NaN, infinities, subnormals, equal and
//! reversed neighbors) into the calculator and checks that it never panics
//! and that an accepted placement always sorts strictly between its
//! neighbors.
//!
//! Run with: cargo +nightly fuzz run position_fuzz -- -max_total_time=60

#![no_main]

use crm_core::{calculate_position, place_between, Placement};
use libfuzzer_sys::fuzz_target;

fn neighbor(flag: u8, bytes: &[u8]) -> Option<f64> {
    if flag & 1 == 0 {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Some(f64::from_le_bytes(raw))
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 17 {
        return;
    }
    let prev = neighbor(data[0], &data[1..9]);
    let next = neighbor(data[0] >> 1, &data[9..17]);

    let computed = calculate_position(prev, next);
    let inputs_finite = prev.map_or(true, f64::is_finite) && next.map_or(true, f64::is_finite);

    match (prev, next) {
        (None, None) => assert!(computed.is_err(), "empty neighbors must be rejected"),
        (Some(p), Some(n)) if inputs_finite && p >= n => {
            assert!(computed.is_err(), "prev >= next must be rejected")
        }
        _ if !inputs_finite => assert!(computed.is_err(), "non-finite input must be rejected"),
        _ => {}
    }

    if let Ok(Placement::At(position)) = place_between(prev, next) {
        assert!(position.is_finite());
        if let Some(p) = prev {
            assert!(p < position, "{} not after {}", position, p);
        }
        if let Some(n) = next {
            assert!(position < n, "{} not before {}", position, n);
        }
    }
});

//! Fuzz target for partition renumbering.
//!
//! Whatever positions a partition holds (ties and NaN included), the plan
//! must keep every id exactly once and assign 1..n in order.
//!
//! Run with: cargo +nightly fuzz run rebalance_fuzz -- -max_total_time=60

#![no_main]

use crm_core::rebalance_plan;
use libfuzzer_sys::fuzz_target;
use uuid::Uuid;

fuzz_target!(|data: &[u8]| {
    let items: Vec<(Uuid, f64)> = data
        .chunks_exact(8)
        .enumerate()
        .map(|(i, chunk)| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            (Uuid::from_u128(i as u128), f64::from_le_bytes(raw))
        })
        .collect();

    let plan = rebalance_plan(&items);
    assert_eq!(plan.len(), items.len());

    for (idx, (_, position)) in plan.iter().enumerate() {
        assert_eq!(*position, (idx + 1) as f64);
    }

    let mut planned: Vec<Uuid> = plan.iter().map(|(id, _)| *id).collect();
    planned.sort();
    let mut original: Vec<Uuid> = items.iter().map(|(id, _)| *id).collect();
    original.sort();
    assert_eq!(planned, original);
});

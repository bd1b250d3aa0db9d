//! Dense fractional order keys.
//!
//! Inserting between two siblings never touches the siblings: the new key is
//! the midpoint of its neighbors, or one step past an open end. Repeated
//! insertion at the same spot halves the gap each time, so keys eventually
//! converge; `needs_rebalance`/`rebalance` expose an explicit renumbering
//! pass for that case. Nothing here rebalances on its own.

use crate::constants::{FIRST_ORDER_KEY, MIN_ORDER_GAP};

/// Key strictly between `before` and `after` (or beyond the open end).
pub fn allocate_between(before: Option<f64>, after: Option<f64>) -> f64 {
    match (before, after) {
        (None, None) => FIRST_ORDER_KEY,
        (None, Some(after)) => after / 2.0,
        (Some(before), None) => before + 1.0,
        (Some(before), Some(after)) => (before + after) / 2.0,
    }
}

/// Key for appending after the current maximum of a zone.
pub fn allocate_at_end(max_order_in_zone: Option<f64>) -> f64 {
    match max_order_in_zone {
        None => FIRST_ORDER_KEY,
        Some(max) => max + 1.0,
    }
}

/// True when sorted neighbors have drifted closer than `MIN_ORDER_GAP`
/// or a key is no longer finite.
pub fn needs_rebalance(keys: &[f64]) -> bool {
    if keys.iter().any(|k| !k.is_finite()) {
        return true;
    }
    let mut sorted = keys.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.windows(2).any(|w| w[1] - w[0] < MIN_ORDER_GAP)
}

/// Integer-spaced replacement keys (1, 2, 3, ...) preserving the relative
/// order of `keys`. Ties keep their input order.
pub fn rebalance(keys: &[f64]) -> Vec<f64> {
    let mut ranked: Vec<usize> = (0..keys.len()).collect();
    ranked.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));

    let mut out = vec![0.0; keys.len()];
    for (rank, idx) in ranked.into_iter().enumerate() {
        out[idx] = FIRST_ORDER_KEY + rank as f64;
    }
    out
}

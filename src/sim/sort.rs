// bitonic sort network over the (cell key, particle index) pairs
use crate::sim::grid::EMPTY_CELL;

/// One compare-exchange pass of the network. `stage` doubles from 2 up to the
/// padded size, `step` halves from stage/2 down to 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortPass {
    pub stage: u32,
    pub step: u32,
}

#[inline]
pub fn next_power_of_two(x: u32) -> u32 {
    x.max(1).next_power_of_two()
}

/// The full pass sequence for a padded (power-of-two) array size. A device
/// barrier is required between consecutive passes; dropping one silently
/// breaks neighbor attribution, so the dispatch side must issue one pass per
/// schedule entry.
pub fn pass_schedule(padded_size: u32) -> Vec<SortPass> {
    debug_assert!(padded_size.is_power_of_two());
    let mut passes = Vec::with_capacity(pass_count(padded_size));
    let mut stage = 2u32;
    while stage <= padded_size {
        let mut step = stage >> 1;
        while step > 0 {
            passes.push(SortPass { stage, step });
            step >>= 1;
        }
        stage <<= 1;
    }
    passes
}

/// log2(p) * (log2(p) + 1) / 2 passes total.
pub fn pass_count(padded_size: u32) -> usize {
    let k = padded_size.trailing_zeros() as usize;
    k * (k + 1) / 2
}

/// Executes one pass over the padded arrays; the same rule as sort.wgsl, with
/// only the lower index of each pair doing the exchange. Equal keys are never
/// swapped so the permutation stays deterministic.
pub fn compare_exchange(keys: &mut [u32], values: &mut [u32], pass: SortPass) {
    debug_assert_eq!(keys.len(), values.len());
    let n = keys.len();
    for i in 0..n {
        let partner = i ^ pass.step as usize;
        if partner <= i || partner >= n {
            continue;
        }
        let ascending = i & pass.stage as usize == 0;
        let should_swap = if ascending {
            keys[i] > keys[partner]
        } else {
            keys[i] < keys[partner]
        };
        if should_swap {
            keys.swap(i, partner);
            values.swap(i, partner);
        }
    }
}

/// Convenience for tests and the CPU reference: pads to the next power of two
/// with the sentinel key, runs the whole network, truncates back.
pub fn sort_pairs(keys: &mut Vec<u32>, values: &mut Vec<u32>) {
    assert_eq!(keys.len(), values.len());
    let n = keys.len();
    let padded = next_power_of_two(n as u32) as usize;
    keys.resize(padded, EMPTY_CELL);
    values.resize(padded, EMPTY_CELL);
    for pass in pass_schedule(padded as u32) {
        compare_exchange(keys, values, pass);
    }
    keys.truncate(n);
    values.truncate(n);
}

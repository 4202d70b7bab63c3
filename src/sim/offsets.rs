// cell offset table: first sorted slot per occupied cell key
use crate::sim::grid::EMPTY_CELL;

/// Must run every step before `build`; cell membership changes as particles
/// move, so nothing may carry over.
pub fn clear(offsets: &mut [u32]) {
    offsets.fill(EMPTY_CELL);
}

/// `sorted_keys` is the cell-key array after the sort, valid slots only (no
/// padding). Each slot that starts a new key records itself; exactly one slot
/// per key satisfies the condition, so no two writers race on a cell.
pub fn build(sorted_keys: &[u32], offsets: &mut [u32]) {
    for (slot, &key) in sorted_keys.iter().enumerate() {
        if slot == 0 || sorted_keys[slot - 1] != key {
            offsets[key as usize] = slot as u32;
        }
    }
}

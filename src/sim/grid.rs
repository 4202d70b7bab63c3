// uniform spatial hash over predicted positions
use glam::{IVec3, Vec3};

/// Sentinel for "no particle starts here" in the cell offset table.
/// Also the padding key for the sort, so padded slots sink to the end.
pub const EMPTY_CELL: u32 = u32::MAX;

/// Default offset-table size for the 32k-particle configuration (power of two,
/// 8x the particle count to keep the collision load factor low).
pub const DEFAULT_TABLE_SIZE: u32 = 262_144;

// distinct large primes, one per axis
const PRIME_X: u32 = 73_856_093;
const PRIME_Y: u32 = 19_349_663;
const PRIME_Z: u32 = 83_492_791;

#[inline]
pub fn cell_coord(pos: Vec3, h: f32) -> IVec3 {
    (pos / h).floor().as_ivec3()
}

/// Deterministic hash of a (possibly negative) cell coordinate. The `as u32`
/// casts wrap, matching `bitcast<u32>` in the partition shader.
#[inline]
pub fn hash_cell(cell: IVec3) -> u32 {
    (cell.x as u32)
        .wrapping_mul(PRIME_X)
        .wrapping_add((cell.y as u32).wrapping_mul(PRIME_Y))
        .wrapping_add((cell.z as u32).wrapping_mul(PRIME_Z))
}

/// Folds a hash into [0, table_size). `table_size` must be a power of two.
#[inline]
pub fn cell_key(hash: u32, table_size: u32) -> u32 {
    debug_assert!(table_size.is_power_of_two());
    hash & (table_size - 1)
}

#[inline]
pub fn key_for(pos: Vec3, h: f32, table_size: u32) -> u32 {
    cell_key(hash_cell(cell_coord(pos, h)), table_size)
}

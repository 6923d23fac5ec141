//! Bitmap arithmetic for label ranges.
//!
//! A range is [`RANGE_SIZE`] consecutive node ids. Within a range, bit
//! `node_id % RANGE_SIZE` of a label's bitmap is set iff the node carries
//! that label. Changing the range size changes the on-disk format.

/// Node ids per range; one bit each in a `u64` bitmap.
pub const RANGE_SIZE: u64 = 64;

pub fn range_of(node_id: u64) -> u64 {
    node_id / RANGE_SIZE
}

pub fn bit_offset(node_id: u64) -> u32 {
    (node_id % RANGE_SIZE) as u32
}

/// `bitmap` with the bit of `node_id` set or cleared.
pub fn set(bitmap: u64, node_id: u64, present: bool) -> u64 {
    let mask = 1u64 << bit_offset(node_id);
    if present { bitmap | mask } else { bitmap & !mask }
}

pub fn contains(bitmap: u64, node_id: u64) -> bool {
    bitmap & (1u64 << bit_offset(node_id)) != 0
}

/// Absolute node ids of the members of `range`, ascending.
pub fn members_of(range: u64, bitmap: u64) -> Vec<u64> {
    let base = range * RANGE_SIZE;
    let mut members = Vec::with_capacity(bitmap.count_ones() as usize);
    let mut remaining = bitmap;
    while remaining != 0 {
        let offset = remaining.trailing_zeros() as u64;
        members.push(base + offset);
        remaining &= remaining - 1;
    }
    members
}

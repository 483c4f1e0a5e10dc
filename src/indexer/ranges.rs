use crate::models::common::BlockRange;

/// Splits the inclusive interval `[start, end]` into consecutive ranges of at most
/// `max_range + 1` blocks each. Returns nothing when `start > end`.
pub fn split_range(start: u64, end: u64, max_range: u64) -> Vec<BlockRange> {
    let mut ranges = Vec::new();
    if start > end {
        return ranges;
    }

    let mut from_block = start;
    loop {
        let to_block = from_block.saturating_add(max_range).min(end);
        ranges.push(BlockRange {
            from_block,
            to_block,
        });
        if to_block == end {
            break;
        }
        from_block = to_block + 1;
    }
    ranges
}

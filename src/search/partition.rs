//! Query-aligned partitioning of the sorted seed hit sequence.
//!
//! Splits a query-sorted hit slice into contiguous ranges that workers claim
//! as units. Boundaries are only ever placed between distinct query keys, so
//! one query's hits are always aligned by the same worker.

use super::hit::SeedHit;

/// Compute partition boundaries over `hits`, which must be sorted by `key`.
///
/// Returns `n + 1` boundary indices for `n` partitions; partitions are
/// contiguous, disjoint and exhaustive. No partition exceeds the effective
/// size target unless a single key-group alone does, in which case that group
/// still forms one partition. The partition count stays within
/// `[min_parts, max_parts]` where the data volume allows; when
/// `max_parts * max_size` cannot cover the input, the `max_parts` bound wins
/// and partitions grow past `max_size`.
pub fn partition_hits<K>(
    hits: &[SeedHit],
    key: K,
    max_size: usize,
    max_parts: usize,
    min_parts: usize,
) -> Vec<usize>
where
    K: Fn(&SeedHit) -> u32,
{
    let mut bounds = vec![0usize];
    if hits.is_empty() {
        return bounds;
    }
    let target = size_target(hits.len(), max_size, max_parts, min_parts);

    let mut begin = 0;
    let mut i = 0;
    while i < hits.len() {
        let k = key(&hits[i]);
        let mut j = i + 1;
        while j < hits.len() && key(&hits[j]) == k {
            j += 1;
        }
        // Close the open partition before absorbing a group that would push
        // it past the target; a lone oversized group stays whole.
        if j - begin > target && i > begin {
            bounds.push(i);
            begin = i;
        }
        i = j;
    }
    bounds.push(hits.len());
    bounds
}

fn size_target(len: usize, max_size: usize, max_parts: usize, min_parts: usize) -> usize {
    let floor = len.div_ceil(max_parts.max(1));
    let spread = len.div_ceil(min_parts.max(1));
    floor.max(spread.min(max_size)).max(1)
}

//! Row-index bookkeeping for data that is sharded across ranks.
//!
//! Each rank owns a contiguous slice of the global row index space. We
//! describe the layout with a "boundary table": a sequence of
//! `rank_count + 1` non-decreasing integers, where `boundaries[r]` is the
//! first global index owned by rank `r` and `boundaries[rank_count]` is the
//! total number of rows.
//!
//! The functions in this file operate on slices so that they don't need an
//! allocator. The owning type lives in the `shardseed` crate.

/// Fills `boundaries` with the exclusive prefix sum of `row_counts`.
///
/// `boundaries` must have exactly `row_counts.len() + 1` entries.
pub fn fill_boundaries(row_counts: &[u64], boundaries: &mut [u64]) -> Result<(), &'static str> {
    if row_counts.is_empty() {
        return Err("there must be at least 1 rank");
    } else if boundaries.len() != row_counts.len() + 1 {
        return Err("boundaries must hold one more entry than row_counts");
    }

    boundaries[0] = 0;
    for (r, count) in row_counts.iter().enumerate() {
        boundaries[r + 1] = boundaries[r]
            .checked_add(*count)
            .ok_or("the total row count overflows u64")?;
    }
    Ok(())
}

/// Checks the invariants of a boundary table.
///
/// Every rank must own at least 1 row, so the entries must be strictly
/// increasing and the first entry must be 0.
pub fn validate_boundaries(boundaries: &[u64]) -> Result<(), &'static str> {
    if boundaries.len() < 2 {
        Err("a boundary table needs at least 2 entries")
    } else if boundaries[0] != 0 {
        Err("the first boundary must be 0")
    } else if boundaries.windows(2).any(|pair| pair[1] <= pair[0]) {
        Err("boundaries must be strictly increasing (every rank owns at least 1 row)")
    } else {
        Ok(())
    }
}

/// Returns the unique rank `r` where
/// `boundaries[r] <= global_index < boundaries[r+1]`.
///
/// Returns `None` when `global_index` lies outside of `[0, total_rows)`.
///
/// This is a binary search, so it is `O(log(rank_count))`. When a rank owns
/// zero rows (which a validated table never allows), the search still picks
/// the rank that actually holds the row.
#[inline]
pub fn find_owning_shard(boundaries: &[u64], global_index: u64) -> Option<usize> {
    let total_rows = *boundaries.last()?;
    if global_index >= total_rows {
        return None;
    }
    // index of the first boundary greater than global_index. Since
    // boundaries[0] == 0 <= global_index, this is always at least 1
    let first_greater = boundaries.partition_point(|&b| b <= global_index);
    Some(first_greater - 1)
}

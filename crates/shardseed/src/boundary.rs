//! The owning type for a row-index boundary table.

use crate::Error;
use crate::comm::Communicator;
use shardseed_nostd_internal::{fill_boundaries, find_owning_shard, validate_boundaries};
use std::ops::Range;

/// Maps global row indices to the shard that owns them.
///
/// `boundaries()[r]` is the first global index owned by rank `r` and the
/// final entry is the total number of rows. The table is identical on every
/// shard and it never changes after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryTable {
    boundaries: Vec<u64>,
}

impl BoundaryTable {
    /// Builds the table from the number of rows owned by each rank.
    ///
    /// Every rank must own at least 1 row.
    pub fn from_row_counts(row_counts: &[u64]) -> Result<Self, Error> {
        if let Some(rank) = row_counts.iter().position(|count| *count == 0) {
            return Err(Error::empty_shard(rank));
        }
        let mut boundaries = vec![0_u64; row_counts.len() + 1];
        fill_boundaries(row_counts, &mut boundaries).map_err(Error::internal)?;
        validate_boundaries(&boundaries).map_err(Error::internal)?;
        Ok(BoundaryTable { boundaries })
    }

    /// Collectively builds the table. Each rank contributes its own row
    /// count.
    ///
    /// Because the counts are exchanged before they are validated, every
    /// rank reports the same error when some rank is empty.
    pub fn compute_boundaries(
        comm: &impl Communicator,
        local_row_count: usize,
    ) -> Result<Self, Error> {
        let mut row_counts = vec![0_u64; comm.rank_count()];
        if comm.rank_count() == 1 {
            row_counts[0] = local_row_count as u64;
        } else {
            comm.allgather_u64(&[local_row_count as u64], &mut row_counts)?;
        }
        Self::from_row_counts(&row_counts)
    }

    pub fn rank_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn total_rows(&self) -> u64 {
        self.boundaries[self.rank_count()]
    }

    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    /// The global indices owned by `rank`
    pub fn local_range(&self, rank: usize) -> Range<u64> {
        self.boundaries[rank]..self.boundaries[rank + 1]
    }

    /// Returns the rank that owns `global_index` (`None` if the index is out
    /// of range)
    pub fn find_owning_shard(&self, global_index: u64) -> Option<usize> {
        find_owning_shard(&self.boundaries, global_index)
    }

    /// Converts `global_index` to a `(rank, local_index)` pair
    pub fn to_local(&self, global_index: u64) -> Option<(usize, usize)> {
        let rank = self.find_owning_shard(global_index)?;
        Some((rank, (global_index - self.boundaries[rank]) as usize))
    }
}

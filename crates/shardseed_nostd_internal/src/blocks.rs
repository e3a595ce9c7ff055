//! Describes how the rows of a sample matrix (and of a candidate set) get
//! decomposed into blocks.
//!
//! Blocking exists to bound the size of the transient distance matrices that
//! the kernels allocate: a `(candidate block) x (sample block)` matrix is the
//! largest temporary we ever need. It also defines the "units of work" that
//! an [`crate::Executor`] distributes.
//!
//! Be aware that the block sizes determine the order in which partial sums
//! get combined. Changing them produces results that are mathematically
//! consistent, but not necessarily bitwise identical.

use core::num::NonZeroUsize;
use core::ops::Range;

/// The default number of sample rows per block.
///
/// Large enough to amortize the cost of a matrix-product call and small
/// enough to keep the distance matrix cache-resident for modest feature
/// counts.
pub const DEFAULT_SAMPLE_BLOCK_ROWS: usize = 1200;

/// The default number of candidate rows per block.
pub const DEFAULT_CANDIDATE_BLOCK_ROWS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSizePolicy {
    sample_block_rows: NonZeroUsize,
    candidate_block_rows: NonZeroUsize,
}

impl BlockSizePolicy {
    pub fn new(sample_block_rows: NonZeroUsize, candidate_block_rows: NonZeroUsize) -> Self {
        BlockSizePolicy {
            sample_block_rows,
            candidate_block_rows,
        }
    }

    pub fn sample_block_rows(&self) -> usize {
        self.sample_block_rows.get()
    }

    pub fn candidate_block_rows(&self) -> usize {
        self.candidate_block_rows.get()
    }

    /// the number of elements in the largest distance matrix that a single
    /// unit of work needs
    pub fn max_distance_matrix_len(&self, n_candidates: usize, n_samples: usize) -> usize {
        self.candidate_block_rows().min(n_candidates) * self.sample_block_rows().min(n_samples)
    }
}

impl Default for BlockSizePolicy {
    fn default() -> Self {
        // the unwraps can't fail (the constants are non-zero)
        BlockSizePolicy {
            sample_block_rows: NonZeroUsize::new(DEFAULT_SAMPLE_BLOCK_ROWS).unwrap(),
            candidate_block_rows: NonZeroUsize::new(DEFAULT_CANDIDATE_BLOCK_ROWS).unwrap(),
        }
    }
}

/// The number of blocks needed to cover `n_rows` rows
#[inline]
pub fn n_blocks(n_rows: usize, block_rows: usize) -> usize {
    n_rows.div_ceil(block_rows)
}

/// The rows covered by block `block_index`. The final block may be shorter
/// than `block_rows`.
#[inline]
pub fn block_bounds(block_index: usize, n_rows: usize, block_rows: usize) -> Range<usize> {
    let start = (block_index * block_rows).min(n_rows);
    let stop = (start + block_rows).min(n_rows);
    start..stop
}

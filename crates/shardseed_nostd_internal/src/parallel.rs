//! Our parallelism abstraction is deliberately small.
//!
//! The block kernels (see [`crate::distance`]) each operate on a single block
//! of rows and write their results into memory that no other block touches.
//! An [`Executor`] is responsible for visiting every block. Different
//! backends can choose to visit the blocks serially, with a team of threads,
//! or (someday) by launching work on an accelerator.
//!
//! # Ordering
//! [`Executor::drive_blocks`] doesn't return until every block has been
//! processed. In other words, the return from `drive_blocks` acts like the
//! "wait" on an asynchronous task-handle: any code that consumes the output
//! buffer runs after every producer has finished.
//!
//! # Reproducibility
//! Because each block writes to a distinct chunk of the output, and because
//! callers combine the chunks in block order once `drive_blocks` returns,
//! every backend produces bitwise identical results. We consider this a
//! hard requirement for any new backend.

/// a trait for expressing how to visit the blocks of a blocked calculation
///
/// **NOTE:** Types that implement this trait are intended to live entirely on
/// the CPU. A GPU backend would provide a type that implements this trait in
/// order to execute the CPU calls that are needed for managing memory and
/// launching GPU calculations
pub trait Executor {
    /// Splits `out` into consecutive chunks of `block_len` elements (the last
    /// chunk may be shorter) and calls `f(block_index, chunk)` exactly once
    /// for every chunk.
    ///
    /// Returns an error if `block_len` is 0 or if any call to `f` fails. When
    /// several blocks fail, the reported error isn't necessarily the one from
    /// the lowest block index.
    fn drive_blocks<T, F>(
        &mut self,
        out: &mut [T],
        block_len: usize,
        f: &F,
    ) -> Result<(), &'static str>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<(), &'static str> + Sync;
}

//! Implements a multi-threaded backend for driving blocked calculations
//!
//! The blocks are handed to a dedicated rayon thread pool. Each block only
//! writes to its own chunk of the output, so the result is bitwise identical
//! to [`crate::SerialExecutor`] (whichever thread happens to run a block).

use crate::Error;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use shardseed_nostd_internal::Executor;
use std::num::NonZeroUsize;

#[derive(Debug)]
pub struct ThreadedExecutor {
    pool: ThreadPool,
}

impl ThreadedExecutor {
    /// Builds an executor backed by a pool of `n_threads` threads.
    pub fn new(n_threads: NonZeroUsize) -> Result<Self, Error> {
        Self::build(ThreadPoolBuilder::new().num_threads(n_threads.get()))
    }

    /// Builds an executor with rayon's default number of threads (the
    /// `RAYON_NUM_THREADS` environment variable, if set, otherwise the number
    /// of logical CPUs).
    pub fn with_default_threads() -> Result<Self, Error> {
        Self::build(ThreadPoolBuilder::new())
    }

    fn build(builder: ThreadPoolBuilder) -> Result<Self, Error> {
        let pool = builder
            .thread_name(|i| format!("shardseed-{i}"))
            .build()
            .map_err(|err| Error::thread_pool(err.to_string()))?;
        Ok(ThreadedExecutor { pool })
    }

    pub fn n_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Executor for ThreadedExecutor {
    fn drive_blocks<T, F>(
        &mut self,
        out: &mut [T],
        block_len: usize,
        f: &F,
    ) -> Result<(), &'static str>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<(), &'static str> + Sync,
    {
        if block_len == 0 {
            return Err("block_len must be positive");
        }
        self.pool.install(|| {
            out.par_chunks_mut(block_len)
                .enumerate()
                .try_for_each(|(block_index, chunk)| f(block_index, chunk))
        })
    }
}

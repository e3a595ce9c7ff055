//! Implements the "serial" backend for driving blocked calculations

use shardseed_nostd_internal::Executor;

/// Visits every block in order, on the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
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
        for (block_index, chunk) in out.chunks_mut(block_len).enumerate() {
            f(block_index, chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_every_block_once() {
        let mut out = [0_usize; 7];
        SerialExecutor
            .drive_blocks(&mut out, 3, &|block_index, chunk: &mut [usize]| {
                for v in chunk.iter_mut() {
                    *v += block_index + 1;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(out, [1, 1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn errors() {
        let mut out = [0.0; 4];
        let noop = |_: usize, _: &mut [f64]| Ok(());
        assert!(SerialExecutor.drive_blocks(&mut out, 0, &noop).is_err());

        let fail_second = |i: usize, _: &mut [f64]| if i == 1 { Err("bad block") } else { Ok(()) };
        assert_eq!(
            SerialExecutor.drive_blocks(&mut out, 2, &fail_second),
            Err("bad block")
        );
    }
}

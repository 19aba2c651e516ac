use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),
}

/// Controls how the CPU strategies are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool to process result rows in parallel.
    ///
    /// Each row is written by a single task, which keeps the accesses to the result
    /// sequential. This is the default for every operation.
    #[default]
    ParallelRows,

    /// Use the global Rayon thread pool to process every element in parallel.
    ///
    /// Operations that accumulate a whole row at once (multiplication, reduction and
    /// stacking) still split their work by rows.
    ParallelElements,

    /// Run sequentially on the current thread.
    ///
    /// Useful for small matrices, debugging, or when the overhead of parallelization
    /// outweighs the benefits.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call, which has significant overhead.
    /// Use this primarily for benchmarking or specific isolation needs.
    Fixed(usize),
}

/// Runs `op` on the thread pool selected by `strategy`.
fn install<R, F>(strategy: ExecutionStrategy, op: F) -> Result<R, ParallelError>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match strategy {
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n));
            }
            log::debug!("building local thread pool with {n} threads");
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;
            Ok(pool.install(op))
        }
        _ => Ok(op()),
    }
}

/// Calls `f(i, j, &mut dst[i * width + j])` for every element of a row-major buffer.
///
/// # Arguments
///
/// * `strategy` - The execution strategy.
/// * `dst` - The destination buffer, `height * width` elements.
/// * `width` - The number of elements per row.
/// * `f` - The function receiving the row, the column and the element.
pub fn for_each_element<T, F>(
    strategy: ExecutionStrategy,
    dst: &mut [T],
    width: usize,
    f: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, usize, &mut T) + Send + Sync,
{
    if width == 0 || dst.is_empty() {
        return Ok(());
    }

    match strategy {
        ExecutionStrategy::Serial => {
            dst.chunks_mut(width).enumerate().for_each(|(i, row)| {
                row.iter_mut().enumerate().for_each(|(j, v)| f(i, j, v));
            });
        }
        ExecutionStrategy::ParallelElements => {
            dst.par_iter_mut()
                .enumerate()
                .for_each(|(idx, v)| f(idx / width, idx % width, v));
        }
        ExecutionStrategy::ParallelRows | ExecutionStrategy::Fixed(_) => {
            install(strategy, || {
                dst.par_chunks_mut(width).enumerate().for_each(|(i, row)| {
                    row.iter_mut().enumerate().for_each(|(j, v)| f(i, j, v));
                });
            })?;
        }
    }
    Ok(())
}

/// Calls `f(i, row)` for every row of a row-major buffer.
///
/// Every row is handed to exactly one call, so `f` may accumulate into it freely.
pub fn for_each_row<T, F>(
    strategy: ExecutionStrategy,
    dst: &mut [T],
    width: usize,
    f: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    if width == 0 || dst.is_empty() {
        return Ok(());
    }

    match strategy {
        ExecutionStrategy::Serial => {
            dst.chunks_mut(width)
                .enumerate()
                .for_each(|(i, row)| f(i, row));
        }
        _ => {
            install(strategy, || {
                dst.par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(i, row)| f(i, row));
            })?;
        }
    }
    Ok(())
}

/// Evaluates `f(i)` for `i` in `0..count` and returns the values in index order.
///
/// The order of the returned values does not depend on the scheduling, so folding
/// them sequentially gives the same result for any strategy.
pub fn collect_indexed<R, F>(
    strategy: ExecutionStrategy,
    count: usize,
    f: F,
) -> Result<Vec<R>, ParallelError>
where
    R: Send,
    F: Fn(usize) -> R + Send + Sync,
{
    match strategy {
        ExecutionStrategy::Serial => Ok((0..count).map(f).collect()),
        _ => install(strategy, || (0..count).into_par_iter().map(f).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExecutionStrategy; 4] = [
        ExecutionStrategy::Serial,
        ExecutionStrategy::ParallelRows,
        ExecutionStrategy::ParallelElements,
        ExecutionStrategy::Fixed(2),
    ];

    #[test]
    fn test_for_each_element_indices() -> Result<(), ParallelError> {
        for strategy in ALL {
            let mut dst = vec![0usize; 6];
            for_each_element(strategy, &mut dst, 3, |i, j, v| *v = i * 10 + j)?;
            assert_eq!(dst, vec![0, 1, 2, 10, 11, 12], "{strategy:?}");
        }
        Ok(())
    }

    #[test]
    fn test_for_each_row() -> Result<(), ParallelError> {
        for strategy in ALL {
            let mut dst = vec![0; 6];
            for_each_row(strategy, &mut dst, 2, |i, row| row.fill(i as i32))?;
            assert_eq!(dst, vec![0, 0, 1, 1, 2, 2], "{strategy:?}");
        }
        Ok(())
    }

    #[test]
    fn test_zero_width_is_noop() -> Result<(), ParallelError> {
        let mut dst: Vec<u8> = vec![];
        for_each_element(ExecutionStrategy::default(), &mut dst, 0, |_, _, _| {})?;
        for_each_row(ExecutionStrategy::default(), &mut dst, 0, |_, _| {})?;
        Ok(())
    }

    #[test]
    fn test_collect_indexed_keeps_order() -> Result<(), ParallelError> {
        for strategy in ALL {
            let out = collect_indexed(strategy, 100, |i| i * 2)?;
            assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        }
        Ok(())
    }

    #[test]
    fn test_fixed_error() {
        let mut dst = vec![1, 2];
        let res = for_each_element(ExecutionStrategy::Fixed(0), &mut dst, 2, |_, _, v| *v = 0);
        assert_eq!(res, Err(ParallelError::InvalidThreadCount(0)));
        assert_eq!(dst, vec![1, 2]);
    }
}

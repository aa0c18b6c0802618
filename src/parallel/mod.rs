//! SPMD worker-pool infrastructure for the solvers.
//!
//! Every solver body runs in lockstep on `N` workers sharing one
//! [`SharedState`]. Each worker owns a contiguous range of rows; reductions
//! synchronize through a counting barrier. The correctness contract is that
//! every worker calls every collective operation (reductions, matrix
//! products, `wait`) the same number of times in the same order, including
//! on early-return and failure paths.

pub mod algebra;
pub mod shared;

pub use algebra::{MatHandle, ParallelLinearAlgebra, ParallelMatrix, ParallelVector, VecHandle};
pub use shared::SharedState;

/// Minimum rows each worker must own; below this parallelism is overhead.
pub const MIN_ROWS_PER_WORKER: usize = 50;

/// Clamp the worker count so each worker owns at least
/// [`MIN_ROWS_PER_WORKER`] rows, with a floor of one worker.
pub fn worker_count(rows: usize, requested: Option<usize>) -> usize {
    let n = requested.unwrap_or_else(num_cpus::get).max(1);
    n.min(rows / MIN_ROWS_PER_WORKER).max(1)
}

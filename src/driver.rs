//! Entry point tying the pieces together: validate the system, size and
//! start the worker pool, broadcast the solver body, and collect the
//! solution, trace and statistics.

use tracing::info;

use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::matrix::CsrMatrix;
use crate::parallel::{
    worker_count, MatHandle, ParallelLinearAlgebra, SharedState, VecHandle,
};
use crate::solver::{run_method, SolveContext};
use crate::utils::convergence::{ConvergenceLog, SolveStats};

/// The outcome of a successful solve.
#[derive(Clone, Debug)]
pub struct Solution {
    /// The best iterate found. When the solve converged this satisfies the
    /// requested tolerance; when the iteration cap fired it is the iterate
    /// with the smallest relative residual seen.
    pub x: Vec<f64>,
    /// Running-minimum relative residual, one entry per iteration executed.
    pub convergence: Vec<f64>,
    pub stats: SolveStats,
}

/// Solve `A x = b` with the configured method.
///
/// `x0` is the initial guess; `None` starts from zero.
pub fn solve(
    a: &CsrMatrix,
    b: &[f64],
    x0: Option<&[f64]>,
    config: &SolverConfig,
) -> Result<Solution, SolverError> {
    solve_inner(a, b, x0, config, None)
}

/// Like [`solve`], reporting a monotone progress fraction in `[0, 1]` to
/// `progress` as the residual shrinks toward the tolerance.
pub fn solve_with_progress(
    a: &CsrMatrix,
    b: &[f64],
    x0: Option<&[f64]>,
    config: &SolverConfig,
    progress: &(dyn Fn(f64) + Sync),
) -> Result<Solution, SolverError> {
    solve_inner(a, b, x0, config, Some(progress))
}

fn solve_inner(
    a: &CsrMatrix,
    b: &[f64],
    x0: Option<&[f64]>,
    config: &SolverConfig,
    progress: Option<&(dyn Fn(f64) + Sync)>,
) -> Result<Solution, SolverError> {
    let n = a.nrows();
    if n == 0 {
        return Err(SolverError::InvalidInput("Matrix A is empty".into()));
    }
    if a.ncols() != n {
        return Err(SolverError::InvalidInput("Matrix A is not square".into()));
    }
    if b.len() != n {
        return Err(SolverError::InvalidInput(
            "Matrix A and b do not have the same number of rows".into(),
        ));
    }
    if let Some(guess) = x0 {
        if guess.len() != n {
            return Err(SolverError::InvalidInput(
                "Matrix A and x0 do not have the same number of rows".into(),
            ));
        }
    }
    if !(config.target_error > 0.0 && config.target_error.is_finite()) {
        return Err(SolverError::InvalidInput("Tolerance out of range".into()));
    }
    if config.max_iterations == 0 {
        return Err(SolverError::InvalidInput(
            "Max iterations out of range".into(),
        ));
    }

    let workers = worker_count(n, config.workers);
    info!(
        method = config.method.name(),
        rows = n,
        workers,
        tolerance = config.target_error,
        "starting linear solver"
    );

    // Solvers mutate through raw views, so the driver keeps owned buffers
    // for the lifetime of the pool and hands out handles over them.
    let mut bbuf = b.to_vec();
    let mut x0buf = match x0 {
        Some(guess) => guess.to_vec(),
        None => vec![0.0; n],
    };
    let mut xmin = x0buf.clone();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    let shared = SharedState::new(n, workers);
    let log = ConvergenceLog::new(config.max_iterations, config.target_error);

    let a_h = MatHandle::new(a);
    let b_h = VecHandle::new(&mut bbuf);
    let x0_h = VecHandle::new(&mut x0buf);
    let xmin_h = VecHandle::new(&mut xmin);

    let method = config.method;
    let pre_conditioner = config.pre_conditioner;
    let tolerance = config.target_error;
    let max_iterations = config.max_iterations;

    let ok = pool.broadcast(|tctx| {
        let mut pla = ParallelLinearAlgebra::new(&shared, tctx.index());
        let ctx = SolveContext {
            a: a_h,
            b: b_h,
            x0: x0_h,
            xmin: xmin_h,
            pre_conditioner,
            tolerance,
            max_iterations,
            writer: log.writer(tctx.index(), progress),
        };
        run_method(method, &mut pla, &ctx)
    });
    drop(pool);

    if ok.iter().any(|&worker_ok| !worker_ok) {
        return Err(SolverError::MethodFailed(config.method.name()));
    }

    let (convergence, stats) = log.results();
    info!(
        iterations = stats.iterations,
        residual = stats.final_residual,
        converged = stats.converged,
        "linear solver finished"
    );

    Ok(Solution { x: xmin, convergence, stats })
}

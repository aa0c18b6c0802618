//! The four iterative methods, each written as an SPMD body against the
//! [`ParallelLinearAlgebra`] primitives.
//!
//! There is no solver trait hierarchy: the method set is closed, so dispatch
//! is a match over [`Method`] onto free functions sharing the same worker
//! signature. A solver returns `false` only on a link/allocation failure in
//! the engine; numerical breakdown and hitting the iteration cap both return
//! `true` with the best solution found (the caller inspects the trace).

pub mod bicg;
pub mod cg;
pub mod jacobi;
pub mod minres;

use crate::config::{Method, PcKind};
use crate::parallel::{
    MatHandle, ParallelLinearAlgebra, ParallelMatrix, ParallelVector, VecHandle,
};
use crate::utils::convergence::TraceWriter;

/// Immutable per-worker view of one solve: the linked storage handles, the
/// config snapshot, and (for worker 0 only) the trace-write capability.
pub(crate) struct SolveContext<'a> {
    pub a: MatHandle,
    pub b: VecHandle,
    pub x0: VecHandle,
    pub xmin: VecHandle,
    pub pre_conditioner: PcKind,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub writer: Option<TraceWriter<'a>>,
}

/// The system storage linked into the engine.
pub(crate) struct SystemLink {
    pub a: ParallelMatrix,
    pub b: ParallelVector,
    pub x0: ParallelVector,
    pub xmin: ParallelVector,
}

/// Link A, b, x0 and the output vector. Validation is deterministic, so a
/// failure is seen identically on every worker; callers log (worker 0),
/// `wait()` once and return `false` to unwind symmetrically.
pub(crate) fn link_system(
    pla: &ParallelLinearAlgebra,
    ctx: &SolveContext,
) -> Option<SystemLink> {
    let a = pla.add_matrix(ctx.a)?;
    let b = pla.add_vector(ctx.b)?;
    let x0 = pla.add_vector(ctx.x0)?;
    let xmin = pla.add_vector(ctx.xmin)?;
    Some(SystemLink { a, b, x0, xmin })
}

pub(crate) fn run_method(
    method: Method,
    pla: &mut ParallelLinearAlgebra,
    ctx: &SolveContext,
) -> bool {
    match method {
        Method::Jacobi => jacobi::solve(pla, ctx),
        Method::Cg => cg::solve(pla, ctx),
        Method::BiCg => bicg::solve(pla, ctx),
        Method::MinRes => minres::solve(pla, ctx),
    }
}

#[cfg(test)]
pub(crate) mod harness {
    //! SPMD test harness mirroring the driver's worker plumbing.

    use super::*;
    use crate::matrix::CsrMatrix;
    use crate::parallel::SharedState;
    use crate::utils::convergence::ConvergenceLog;

    pub(crate) struct Outcome {
        pub ok: Vec<bool>,
        pub xmin: Vec<f64>,
        pub trace: Vec<f64>,
        pub stats: crate::utils::convergence::SolveStats,
    }

    pub(crate) fn run(
        method: Method,
        a: &CsrMatrix,
        b: &[f64],
        x0: &[f64],
        pre_conditioner: PcKind,
        tolerance: f64,
        max_iterations: usize,
        workers: usize,
    ) -> Outcome {
        let mut bbuf = b.to_vec();
        let mut x0buf = x0.to_vec();
        let mut xmin = x0.to_vec();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .unwrap();
        let shared = SharedState::new(b.len(), workers);
        let log = ConvergenceLog::new(max_iterations, tolerance);
        let a_h = MatHandle::new(a);
        let b_h = VecHandle::new(&mut bbuf);
        let x0_h = VecHandle::new(&mut x0buf);
        let xmin_h = VecHandle::new(&mut xmin);
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
                writer: log.writer(tctx.index(), None),
            };
            run_method(method, &mut pla, &ctx)
        });
        let (trace, stats) = log.results();
        Outcome { ok, xmin, trace, stats }
    }

    /// Unwind check: a handle with the wrong length must make every worker
    /// return `false` without deadlocking in a barrier.
    pub(crate) fn run_with_bad_rhs(method: Method, workers: usize) -> Vec<bool> {
        let n = 64;
        let a = crate::parallel::algebra::poisson1d(n);
        let mut bad = vec![0.0; n - 1];
        let mut x0buf = vec![0.0; n];
        let mut xmin = vec![0.0; n];
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .unwrap();
        let shared = SharedState::new(n, workers);
        let log = ConvergenceLog::new(10, 1e-5);
        let a_h = MatHandle::new(&a);
        let b_h = VecHandle::new(&mut bad);
        let x0_h = VecHandle::new(&mut x0buf);
        let xmin_h = VecHandle::new(&mut xmin);
        pool.broadcast(|tctx| {
            let mut pla = ParallelLinearAlgebra::new(&shared, tctx.index());
            let ctx = SolveContext {
                a: a_h,
                b: b_h,
                x0: x0_h,
                xmin: xmin_h,
                pre_conditioner: PcKind::Jacobi,
                tolerance: 1e-5,
                max_iterations: 10,
                writer: log.writer(tctx.index(), None),
            };
            run_method(method, &mut pla, &ctx)
        })
    }
}

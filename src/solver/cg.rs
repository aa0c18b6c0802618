//! Conjugate Gradient with diagonal preconditioning.
//!
//! Expects A symmetric positive-definite; this is not verified, and a
//! violating matrix yields undefined convergence behavior rather than a
//! runtime error.

use tracing::{info, warn};

use crate::preconditioner;
use crate::parallel::ParallelLinearAlgebra;
use crate::solver::{link_system, SolveContext};
use crate::utils::convergence::log_fraction;

const PROGRESS_STRIDE: usize = 20;

pub(crate) fn solve(pla: &mut ParallelLinearAlgebra, ctx: &SolveContext) -> bool {
    let Some(sys) = link_system(pla, ctx) else {
        if pla.first() {
            warn!("could not link the system matrices");
        }
        pla.wait();
        return false;
    };

    let (Some(x), Some(diag), Some(r), Some(z), Some(p)) = (
        pla.new_vector(),
        pla.new_vector(),
        pla.new_vector(),
        pla.new_vector(),
        pla.new_vector(),
    ) else {
        if pla.first() {
            warn!("could not allocate work vectors");
        }
        pla.wait();
        return false;
    };

    pla.copy(sys.x0, x);
    pla.copy(sys.x0, sys.xmin);

    preconditioner::build(pla, sys.a, diag, ctx.pre_conditioner);

    pla.mult(sys.a, x, r);
    pla.sub(sys.b, r, r);

    let bnorm = pla.norm(sys.b);
    if bnorm == 0.0 {
        // zero right-hand side has the zero solution
        pla.zeros(sys.xmin);
        if let Some(w) = &ctx.writer {
            w.finish(0.0, 0.0, 0);
            info!("zero right-hand side, returning the zero solution");
        }
        pla.wait();
        return true;
    }

    let mut error = pla.norm(r) / bnorm;
    let mut best = error;
    let orig = error;

    if error <= ctx.tolerance {
        if let Some(w) = &ctx.writer {
            w.finish(orig, best, 0);
            info!(error, "initial guess already satisfies the tolerance");
        }
        pla.wait();
        return true;
    }

    let mut bkden = 0.0;
    let mut niter = 0;
    let mut cnt = 0;
    let log_orig = orig.ln();
    let log_scale = log_orig - ctx.tolerance.ln();

    while niter < ctx.max_iterations {
        if error <= ctx.tolerance {
            if let Some(w) = &ctx.writer {
                w.finish(orig, best, niter);
                info!(iterations = niter, error, "solver converged");
            }
            pla.wait();
            return true;
        }

        pla.elem_mult(r, diag, z);
        let bknum = pla.dot(z, r);

        if niter == 0 {
            pla.copy(z, p);
        } else {
            let bk = bknum / bkden;
            pla.scale_add(bk, p, z, p);
        }
        pla.mult(sys.a, p, z);
        bkden = bknum;

        let akden = pla.dot(z, p);
        let ak = bknum / akden;

        pla.scale_add(ak, p, x, x);
        pla.scale_add(-ak, z, r, r);

        error = pla.norm(r) / bnorm;
        if error < best {
            pla.copy(x, sys.xmin);
            best = error;
        }
        if let Some(w) = &ctx.writer {
            w.record(niter, best);
        }

        niter += 1;
        cnt += 1;
        if cnt == PROGRESS_STRIDE {
            cnt = 0;
            if let Some(w) = &ctx.writer {
                w.progress(log_fraction(log_orig, log_scale, error));
            }
        }
    }

    if let Some(w) = &ctx.writer {
        w.finish(orig, best, niter);
        info!(iterations = niter, error, "solver stopped at the iteration cap");
    }
    pla.wait();
    true
}

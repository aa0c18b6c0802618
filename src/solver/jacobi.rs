//! Jacobi relaxation.
//!
//! The simplest method in the set: `X = X - DIAG .* (A*X - B)` with DIAG the
//! inverted matrix diagonal. Convergence requires strong diagonal dominance;
//! the iteration cap is the expected exit on anything else, and the best
//! iterate seen is still returned.

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

    let (Some(x), Some(diag), Some(z)) = (
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

    preconditioner::build_relaxation(pla, sys.a, diag);

    pla.mult(sys.a, x, z);
    pla.sub(z, sys.b, z);

    let bnorm = pla.norm(sys.b);
    if bnorm == 0.0 {
        pla.zeros(sys.xmin);
        if let Some(w) = &ctx.writer {
            w.finish(0.0, 0.0, 0);
            info!("zero right-hand side, returning the zero solution");
        }
        pla.wait();
        return true;
    }

    let mut error = pla.norm(z) / bnorm;
    let mut best = error;
    let orig = error;

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

        pla.elem_mult(diag, z, z);
        pla.sub(x, z, x);

        pla.mult(sys.a, x, z);
        pla.sub(z, sys.b, z);

        error = pla.norm(z) / bnorm;
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

// Diagonal (Jacobi) preconditioner builders.

use crate::config::PcKind;
use crate::parallel::{ParallelLinearAlgebra, ParallelMatrix, ParallelVector};

/// Pivot threshold scale for the Krylov methods (CG, BiCG, MINRES).
pub const KRYLOV_PIVOT_SCALE: f64 = 1e-18;

/// Looser pivot threshold scale used by the Jacobi relaxation solver.
pub const RELAXATION_PIVOT_SCALE: f64 = 1e-6;

/// Build DIAG for a Krylov method: 1/|A_ii| thresholded away from zero, or
/// all-ones when preconditioning is off.
pub fn build(
    pla: &mut ParallelLinearAlgebra,
    a: ParallelMatrix,
    diag: ParallelVector,
    kind: PcKind,
) {
    match kind {
        PcKind::Jacobi => {
            pla.absdiag(a, diag);
            let max = pla.max(diag);
            pla.absthreshold_invert(diag, diag, KRYLOV_PIVOT_SCALE * max);
        }
        PcKind::None => pla.ones(diag),
    }
}

/// Build DIAG for the Jacobi relaxation solver: the signed diagonal inverse
/// with the looser threshold its update rule tolerates.
pub fn build_relaxation(
    pla: &mut ParallelLinearAlgebra,
    a: ParallelMatrix,
    diag: ParallelVector,
) {
    pla.diag(a, diag);
    let max = pla.absmax(diag);
    pla.absthreshold_invert(diag, diag, RELAXATION_PIVOT_SCALE * max);
}

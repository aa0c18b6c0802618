//! API options for the linear-system driver.
//!
//! `SolverConfig` selects one of the four iterative methods, the
//! preconditioner construction, and the stopping criteria. The string forms
//! accepted by `FromStr` match the option names used by the dataflow layer
//! that feeds this solver ("jacobi", "cg", "bicg", "minres").

use std::str::FromStr;

use crate::error::SolverError;

/// Iterative method to dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Diagonally-preconditioned relaxation; cheapest per iteration.
    Jacobi,
    /// Conjugate Gradient, for symmetric positive-definite systems.
    Cg,
    /// BiConjugate Gradient, for non-symmetric systems.
    BiCg,
    /// MINRES, for symmetric (possibly indefinite) systems.
    MinRes,
}

impl Method {
    /// Human-readable method name, used in failure messages.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Jacobi => "Jacobi",
            Method::Cg => "Conjugate Gradient",
            Method::BiCg => "BiConjugate Gradient",
            Method::MinRes => "MINRES",
        }
    }
}

impl FromStr for Method {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jacobi" => Ok(Method::Jacobi),
            "cg" => Ok(Method::Cg),
            "bicg" => Ok(Method::BiCg),
            "minres" => Ok(Method::MinRes),
            _ => Err(SolverError::InvalidInput(format!(
                "Unknown solver method: {s}"
            ))),
        }
    }
}

/// Preconditioner construction mode for the Krylov methods.
///
/// The Jacobi solver ignores this and always builds its own looser-threshold
/// diagonal inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcKind {
    None,
    Jacobi,
}

impl FromStr for PcKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PcKind::None),
            "jacobi" => Ok(PcKind::Jacobi),
            _ => Err(SolverError::InvalidInput(format!(
                "Unknown preconditioner: {s}"
            ))),
        }
    }
}

/// Per-solve configuration, owned by the caller and read-only to the solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub method: Method,
    pub pre_conditioner: PcKind,
    /// Relative-residual stopping tolerance.
    pub target_error: f64,
    /// Hard cap on outer iterations.
    pub max_iterations: usize,
    /// Worker thread count; `None` uses all cores, clamped so every worker
    /// owns at least [`MIN_ROWS_PER_WORKER`](crate::parallel::MIN_ROWS_PER_WORKER) rows.
    pub workers: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: Method::Cg,
            pre_conditioner: PcKind::Jacobi,
            target_error: 1e-5,
            max_iterations: 500,
            workers: None,
        }
    }
}

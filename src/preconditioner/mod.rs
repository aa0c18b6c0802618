//! Diagonal preconditioner construction.
//!
//! All builders execute collectively: every worker runs the same branch
//! (the mode is part of the shared config), since the resulting DIAG vector
//! feeds every subsequent collective operation.

pub mod jacobi;

pub use jacobi::{build, build_relaxation, KRYLOV_PIVOT_SCALE, RELAXATION_PIVOT_SCALE};

//! parlin: lockstep-parallel iterative solvers for sparse linear systems
//!
//! This crate provides Jacobi, Conjugate Gradient, BiConjugate Gradient and
//! MINRES solvers over CSR matrices, with diagonal preconditioning. The
//! solvers run as SPMD bodies on a shared-memory worker pool: each worker
//! owns a contiguous block of rows and all workers move through the
//! iteration in lockstep, synchronizing through barriers and deterministic
//! rank-ordered reductions so results are reproducible for a fixed worker
//! count.
//!
//! ```no_run
//! use parlin::{solve, CsrMatrix, SolverConfig};
//!
//! let a = CsrMatrix::identity(100);
//! let b = vec![1.0; 100];
//! let solution = solve(&a, &b, None, &SolverConfig::default())?;
//! assert!(solution.stats.converged);
//! # Ok::<(), parlin::SolverError>(())
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod matrix;
pub mod parallel;
pub mod preconditioner;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::{Method, PcKind, SolverConfig};
pub use driver::{solve, solve_with_progress, Solution};
pub use error::SolverError;
pub use matrix::CsrMatrix;
pub use utils::convergence::SolveStats;

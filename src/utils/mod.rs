//! Support utilities shared by the driver and the solver bodies.

pub mod convergence;

pub use convergence::{ConvergenceLog, SolveStats, TraceWriter};

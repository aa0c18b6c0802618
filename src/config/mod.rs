//! Solver configuration: method selection, preconditioning, stopping criteria.

pub mod options;

pub use options::{Method, PcKind, SolverConfig};

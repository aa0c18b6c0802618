// Sparse matrix storage consumed by the parallel engine.

pub mod sparse;

pub use sparse::CsrMatrix;

use thiserror::Error;

// Unified error type for parlin

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0} method failed")]
    MethodFailed(&'static str),
    #[error("could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

//! Convergence tracking for the iterative solvers.
//!
//! The trace is a running minimum of the relative residual, one entry per
//! outer iteration, pre-allocated to `max_iterations` slots. Only the
//! elected worker writes it, through a [`TraceWriter`] capability handed
//! out solely to rank 0; readers see the result after the worker pool has
//! joined. Entries travel as `f64` bit patterns in atomics so no locking
//! is needed on the hot path.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Iteration statistics reported alongside the solution.
#[derive(Clone, Debug)]
pub struct SolveStats {
    /// Outer iterations executed.
    pub iterations: usize,
    /// Relative residual of the initial guess.
    pub original_residual: f64,
    /// Best (minimum) relative residual observed; the returned solution
    /// attains this value.
    pub final_residual: f64,
    /// Whether `final_residual` met the requested tolerance. Running out of
    /// iterations is not an error; callers needing guaranteed convergence
    /// check this flag.
    pub converged: bool,
}

/// Driver-owned convergence buffer shared with the elected worker.
pub struct ConvergenceLog {
    tolerance: f64,
    trace: Box<[AtomicU64]>,
    written: AtomicUsize,
    iterations: AtomicUsize,
    original: AtomicU64,
    best: AtomicU64,
    finished: AtomicBool,
}

impl ConvergenceLog {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            tolerance,
            trace: (0..max_iterations).map(|_| AtomicU64::new(0)).collect(),
            written: AtomicUsize::new(0),
            iterations: AtomicUsize::new(0),
            original: AtomicU64::new(0),
            best: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    /// Hand out the write capability; `Some` only for the elected worker.
    pub fn writer<'a>(
        &'a self,
        rank: usize,
        progress: Option<&'a (dyn Fn(f64) + Sync)>,
    ) -> Option<TraceWriter<'a>> {
        (rank == 0).then_some(TraceWriter {
            log: self,
            progress,
            last_fraction: Cell::new(0.0),
        })
    }

    /// Assemble the trace (truncated to the entries actually written) and
    /// the final statistics. Call only after the worker pool has joined.
    pub fn results(&self) -> (Vec<f64>, SolveStats) {
        let written = self.written.load(Ordering::Acquire);
        let trace = self.trace[..written]
            .iter()
            .map(|slot| f64::from_bits(slot.load(Ordering::Acquire)))
            .collect();
        let best = f64::from_bits(self.best.load(Ordering::Acquire));
        let stats = SolveStats {
            iterations: self.iterations.load(Ordering::Acquire),
            original_residual: f64::from_bits(self.original.load(Ordering::Acquire)),
            final_residual: best,
            converged: self.finished.load(Ordering::Acquire) && best <= self.tolerance,
        };
        (trace, stats)
    }
}

/// Write capability over a [`ConvergenceLog`], held by worker 0 only.
pub struct TraceWriter<'a> {
    log: &'a ConvergenceLog,
    progress: Option<&'a (dyn Fn(f64) + Sync)>,
    last_fraction: Cell<f64>,
}

impl TraceWriter<'_> {
    /// Record the running-minimum residual for iteration `iter`.
    pub fn record(&self, iter: usize, best: f64) {
        if iter < self.log.trace.len() {
            self.log.trace[iter].store(best.to_bits(), Ordering::Release);
            self.log.written.store(iter + 1, Ordering::Release);
        }
    }

    /// Publish the solve outcome; called exactly once on every exit path.
    pub fn finish(&self, original: f64, best: f64, iterations: usize) {
        self.log.original.store(original.to_bits(), Ordering::Release);
        self.log.best.store(best.to_bits(), Ordering::Release);
        self.log.iterations.store(iterations, Ordering::Release);
        self.log.finished.store(true, Ordering::Release);
        self.emit_progress(1.0);
    }

    /// Report a progress fraction to the observer, clamped to [0, 1] and
    /// kept monotone even when the raw residual fluctuates.
    pub fn progress(&self, fraction: f64) {
        let clamped = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 1.0 };
        self.emit_progress(clamped);
    }

    fn emit_progress(&self, fraction: f64) {
        if fraction >= self.last_fraction.get() {
            self.last_fraction.set(fraction);
            if let Some(observer) = self.progress {
                observer(fraction);
            }
        }
    }
}

/// Logarithmic progress fraction between the starting error and the target.
pub fn log_fraction(log_orig: f64, log_scale: f64, error: f64) -> f64 {
    (log_orig - error.ln()) / log_scale
}

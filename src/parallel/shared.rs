//! State shared by all workers of one solve.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::{Barrier, Mutex};

/// Per-solve shared state: the barrier, the reduction slots, and the arena
/// owning collectively-allocated work vectors.
///
/// Reduction slots are double-buffered: consecutive reductions alternate
/// between the two buffers so a worker racing ahead into the next reduction
/// cannot overwrite a slot a slower worker is still reading. Scalars travel
/// as `f64` bit patterns in `AtomicU64`s; the barrier supplies the
/// happens-before edge, so relaxed ordering on the slots is sufficient.
pub struct SharedState {
    size: usize,
    workers: usize,
    barrier: Barrier,
    reduce: [Vec<AtomicU64>; 2],
    alloc_ok: AtomicBool,
    published: AtomicPtr<f64>,
    arena: Mutex<Vec<Box<[f64]>>>,
}

impl SharedState {
    pub fn new(size: usize, workers: usize) -> Self {
        let slots = |n: usize| (0..n).map(|_| AtomicU64::new(0)).collect();
        Self {
            size,
            workers,
            barrier: Barrier::new(workers),
            reduce: [slots(workers), slots(workers)],
            alloc_ok: AtomicBool::new(false),
            published: AtomicPtr::new(std::ptr::null_mut()),
            arena: Mutex::new(Vec::new()),
        }
    }

    /// Global problem size (rows).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers sharing this state.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) fn wait(&self) {
        self.barrier.wait();
    }

    pub(crate) fn store_partial(&self, buffer: usize, rank: usize, value: f64) {
        self.reduce[buffer][rank].store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn load_partial(&self, buffer: usize, rank: usize) -> f64 {
        f64::from_bits(self.reduce[buffer][rank].load(Ordering::Relaxed))
    }

    /// Worker 0 publishes the outcome of a collective allocation; the other
    /// workers read it after the next barrier.
    pub(crate) fn publish_allocation(&self, ptr: Option<*mut f64>) {
        match ptr {
            Some(p) => {
                self.published.store(p, Ordering::Relaxed);
                self.alloc_ok.store(true, Ordering::Relaxed);
            }
            None => self.alloc_ok.store(false, Ordering::Relaxed),
        }
    }

    pub(crate) fn published_allocation(&self) -> Option<*mut f64> {
        if self.alloc_ok.load(Ordering::Relaxed) {
            Some(self.published.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Allocate a zeroed work vector, keeping it alive in the arena for the
    /// rest of the solve. Returns `None` when the allocation cannot be made.
    pub(crate) fn allocate(&self) -> Option<*mut f64> {
        let mut v: Vec<f64> = Vec::new();
        v.try_reserve_exact(self.size).ok()?;
        v.resize(self.size, 0.0);
        let mut boxed = v.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        // A poisoned arena means a sibling worker panicked; treat it the
        // same as an allocation failure so every worker unwinds together.
        let mut arena = self.arena.lock().ok()?;
        arena.push(boxed);
        Some(ptr)
    }
}

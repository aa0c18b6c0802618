//! Row-partitioned vector/matrix primitives with barrier-synchronized
//! reductions.
//!
//! # Safety model
//!
//! Vector storage is shared between workers through raw pointers. The SPMD
//! protocol makes this sound without per-element locking:
//!
//! - elementwise operations write only the calling worker's row range, and
//!   no row belongs to more than one worker;
//! - operations that read rows outside the worker's own range (`mult`,
//!   `mult_trans`) barrier on entry, so all writes from the previous step
//!   have landed, and never write the vector they read;
//! - reductions exchange scalars through atomic slots around one barrier.
//!
//! Every worker must issue the same sequence of collective calls; a worker
//! skipping a reduction or `wait` deadlocks its siblings.

use super::shared::SharedState;

/// Driver-side handle to caller-owned dense storage.
///
/// Created from a `&mut [f64]` whose allocation outlives the worker pool;
/// the driver guarantees that by joining all workers before touching or
/// dropping the buffers.
#[derive(Clone, Copy)]
pub struct VecHandle {
    ptr: *mut f64,
    len: usize,
}

// SAFETY: the raw pointer refers to storage the driver keeps alive across
// the (scoped) parallel region, and all access goes through the partitioned
// operations below.
unsafe impl Send for VecHandle {}
unsafe impl Sync for VecHandle {}

impl VecHandle {
    pub fn new(data: &mut [f64]) -> Self {
        Self { ptr: data.as_mut_ptr(), len: data.len() }
    }
}

/// Driver-side handle to a caller-owned CSR matrix, read-only during a solve.
#[derive(Clone, Copy)]
pub struct MatHandle {
    values: *const f64,
    row_ptr: *const usize,
    col_idx: *const usize,
    nrows: usize,
    ncols: usize,
}

// SAFETY: as for `VecHandle`; the matrix is never written.
unsafe impl Send for MatHandle {}
unsafe impl Sync for MatHandle {}

impl MatHandle {
    pub fn new(a: &crate::matrix::CsrMatrix) -> Self {
        Self {
            values: a.values().as_ptr(),
            row_ptr: a.row_ptr().as_ptr(),
            col_idx: a.col_idx().as_ptr(),
            nrows: a.nrows(),
            ncols: a.ncols(),
        }
    }
}

/// A vector linked into the engine, valid for the current solve.
#[derive(Clone, Copy)]
pub struct ParallelVector {
    data: *mut f64,
    len: usize,
}

unsafe impl Send for ParallelVector {}
unsafe impl Sync for ParallelVector {}

/// A matrix linked into the engine, valid for the current solve.
#[derive(Clone, Copy)]
pub struct ParallelMatrix {
    values: *const f64,
    row_ptr: *const usize,
    col_idx: *const usize,
    nrows: usize,
}

unsafe impl Send for ParallelMatrix {}
unsafe impl Sync for ParallelMatrix {}

/// Per-worker view of the engine: rank, row range, and reduction bookkeeping.
pub struct ParallelLinearAlgebra<'a> {
    shared: &'a SharedState,
    rank: usize,
    workers: usize,
    start: usize,
    end: usize,
    reduce_buffer: usize,
}

impl<'a> ParallelLinearAlgebra<'a> {
    pub fn new(shared: &'a SharedState, rank: usize) -> Self {
        let size = shared.size();
        let workers = shared.workers();
        let local = size / workers;
        let start = rank * local;
        let end = if rank == workers - 1 { size } else { start + local };
        Self { shared, rank, workers, start, end, reduce_buffer: 0 }
    }

    /// True only on the elected worker; gates all non-idempotent side effects.
    pub fn first(&self) -> bool {
        self.rank == 0
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// First row of this worker's range.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last row of this worker's range.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Counting barrier. Every worker must call this the same number of
    /// times in the same order on every path.
    pub fn wait(&self) {
        self.shared.wait();
    }

    /// Link caller-owned dense storage for parallel access. Fails on every
    /// worker identically when the length does not match the partitioning.
    pub fn add_vector(&self, v: VecHandle) -> Option<ParallelVector> {
        if v.len != self.shared.size() {
            return None;
        }
        Some(ParallelVector { data: v.ptr, len: v.len })
    }

    /// Link a caller-owned CSR matrix for parallel access.
    pub fn add_matrix(&self, m: MatHandle) -> Option<ParallelMatrix> {
        if m.nrows != self.shared.size() || m.ncols != m.nrows {
            return None;
        }
        Some(ParallelMatrix {
            values: m.values,
            row_ptr: m.row_ptr,
            col_idx: m.col_idx,
            nrows: m.nrows,
        })
    }

    /// Collectively allocate a zeroed work vector sized to the partitioning.
    ///
    /// Worker 0 allocates and publishes; all workers barrier identically on
    /// both the success and the failure path, so a `None` return leaves the
    /// pool synchronized.
    pub fn new_vector(&mut self) -> Option<ParallelVector> {
        self.wait();
        if self.first() {
            self.shared.publish_allocation(self.shared.allocate());
        }
        self.wait();
        let ptr = self.shared.published_allocation()?;
        Some(ParallelVector { data: ptr, len: self.shared.size() })
    }

    // --- elementwise operations over the worker's own row range ---
    //
    // Raw-pointer loops rather than slices: the solvers routinely alias an
    // input with the output (e.g. scale_add(bk, P, Z, P)), which is fine
    // elementwise but would be UB through overlapping &mut slices.

    pub fn copy(&self, a: ParallelVector, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *r.data.add(i) = *a.data.add(i);
            }
        }
    }

    pub fn zeros(&self, a: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *a.data.add(i) = 0.0;
            }
        }
    }

    pub fn ones(&self, a: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *a.data.add(i) = 1.0;
            }
        }
    }

    /// r = s·a
    pub fn scale(&self, s: f64, a: ParallelVector, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *r.data.add(i) = s * *a.data.add(i);
            }
        }
    }

    /// r = s·a + b
    pub fn scale_add(&self, s: f64, a: ParallelVector, b: ParallelVector, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *r.data.add(i) = s * *a.data.add(i) + *b.data.add(i);
            }
        }
    }

    /// r = a + b
    pub fn add(&self, a: ParallelVector, b: ParallelVector, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *r.data.add(i) = *a.data.add(i) + *b.data.add(i);
            }
        }
    }

    /// r = a − b
    pub fn sub(&self, a: ParallelVector, b: ParallelVector, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *r.data.add(i) = *a.data.add(i) - *b.data.add(i);
            }
        }
    }

    /// r = a ⊙ b
    pub fn elem_mult(&self, a: ParallelVector, b: ParallelVector, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                *r.data.add(i) = *a.data.add(i) * *b.data.add(i);
            }
        }
    }

    /// r[i] = 1/a[i] where a[i] > threshold, else 1.
    pub fn threshold_invert(&self, a: ParallelVector, r: ParallelVector, threshold: f64) {
        unsafe {
            for i in self.start..self.end {
                let v = *a.data.add(i);
                *r.data.add(i) = if v > threshold { 1.0 / v } else { 1.0 };
            }
        }
    }

    /// r[i] = 1/a[i] where |a[i]| > threshold, else 1. Guards the diagonal
    /// inverse against near-zero pivots.
    pub fn absthreshold_invert(&self, a: ParallelVector, r: ParallelVector, threshold: f64) {
        unsafe {
            for i in self.start..self.end {
                let v = *a.data.add(i);
                *r.data.add(i) = if v.abs() > threshold { 1.0 / v } else { 1.0 };
            }
        }
    }

    /// r[i] = A[i][i]
    pub fn diag(&self, a: ParallelMatrix, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                let mut val = 0.0;
                for k in *a.row_ptr.add(i)..*a.row_ptr.add(i + 1) {
                    if *a.col_idx.add(k) == i {
                        val = *a.values.add(k);
                    }
                }
                *r.data.add(i) = val;
            }
        }
    }

    /// r[i] = |A[i][i]|
    pub fn absdiag(&self, a: ParallelMatrix, r: ParallelVector) {
        unsafe {
            for i in self.start..self.end {
                let mut val = 0.0;
                for k in *a.row_ptr.add(i)..*a.row_ptr.add(i + 1) {
                    if *a.col_idx.add(k) == i {
                        val = *a.values.add(k);
                    }
                }
                *r.data.add(i) = val.abs();
            }
        }
    }

    // --- matrix products: barrier on entry, then own rows only ---

    /// y = A·x. Reads all of `x`; `x` and `y` must be distinct vectors.
    pub fn mult(&self, a: ParallelMatrix, x: ParallelVector, y: ParallelVector) {
        self.wait();
        unsafe {
            for i in self.start..self.end {
                let mut sum = 0.0;
                for k in *a.row_ptr.add(i)..*a.row_ptr.add(i + 1) {
                    sum += *a.values.add(k) * *x.data.add(*a.col_idx.add(k));
                }
                *y.data.add(i) = sum;
            }
        }
    }

    /// y = Aᵗ·x. Reads all of `x`; `x` and `y` must be distinct vectors.
    ///
    /// Each worker scatters only into its own output rows, walking every
    /// matrix row and picking the entries whose column falls in its range.
    pub fn mult_trans(&self, a: ParallelMatrix, x: ParallelVector, y: ParallelVector) {
        self.wait();
        unsafe {
            for i in self.start..self.end {
                *y.data.add(i) = 0.0;
            }
            for j in 0..a.nrows {
                let xj = *x.data.add(j);
                if xj == 0.0 {
                    continue;
                }
                let mut k = *a.row_ptr.add(j);
                let hi = *a.row_ptr.add(j + 1);
                while k < hi && *a.col_idx.add(k) < self.start {
                    k += 1;
                }
                while k < hi && *a.col_idx.add(k) < self.end {
                    let c = *a.col_idx.add(k);
                    *y.data.add(c) += *a.values.add(k) * xj;
                    k += 1;
                }
            }
        }
    }

    // --- global reductions: one barrier each, deterministic combine ---

    fn exchange(&mut self, partial: f64) -> usize {
        let buffer = self.reduce_buffer;
        self.shared.store_partial(buffer, self.rank, partial);
        self.reduce_buffer ^= 1;
        self.wait();
        buffer
    }

    fn reduce_sum(&mut self, partial: f64) -> f64 {
        let buffer = self.exchange(partial);
        (0..self.workers).map(|j| self.shared.load_partial(buffer, j)).sum()
    }

    fn reduce_min(&mut self, partial: f64) -> f64 {
        let buffer = self.exchange(partial);
        (0..self.workers)
            .map(|j| self.shared.load_partial(buffer, j))
            .fold(f64::MAX, f64::min)
    }

    fn reduce_max(&mut self, partial: f64) -> f64 {
        let buffer = self.exchange(partial);
        (0..self.workers)
            .map(|j| self.shared.load_partial(buffer, j))
            .fold(f64::MIN, f64::max)
    }

    /// Global dot product; the same scalar is returned on every worker.
    pub fn dot(&mut self, a: ParallelVector, b: ParallelVector) -> f64 {
        let mut val = 0.0;
        unsafe {
            for i in self.start..self.end {
                val += *a.data.add(i) * *b.data.add(i);
            }
        }
        self.reduce_sum(val)
    }

    /// Global L2 norm.
    pub fn norm(&mut self, a: ParallelVector) -> f64 {
        let mut val = 0.0;
        unsafe {
            for i in self.start..self.end {
                let v = *a.data.add(i);
                val += v * v;
            }
        }
        self.reduce_sum(val).sqrt()
    }

    pub fn min(&mut self, a: ParallelVector) -> f64 {
        let mut m = f64::MAX;
        unsafe {
            for i in self.start..self.end {
                m = m.min(*a.data.add(i));
            }
        }
        self.reduce_min(m)
    }

    pub fn max(&mut self, a: ParallelVector) -> f64 {
        let mut m = f64::MIN;
        unsafe {
            for i in self.start..self.end {
                m = m.max(*a.data.add(i));
            }
        }
        self.reduce_max(m)
    }

    pub fn absmin(&mut self, a: ParallelVector) -> f64 {
        let mut m = f64::MAX;
        unsafe {
            for i in self.start..self.end {
                m = m.min((*a.data.add(i)).abs());
            }
        }
        self.reduce_min(m)
    }

    pub fn absmax(&mut self, a: ParallelVector) -> f64 {
        let mut m = f64::MIN;
        unsafe {
            for i in self.start..self.end {
                m = m.max((*a.data.add(i)).abs());
            }
        }
        self.reduce_max(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CsrMatrix;

    /// Run `f` as an SPMD body on `workers` threads sharing one state.
    fn spmd<R, F>(size: usize, workers: usize, f: F) -> Vec<R>
    where
        F: Fn(&mut ParallelLinearAlgebra) -> R + Sync,
        R: Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .unwrap();
        let shared = SharedState::new(size, workers);
        pool.broadcast(|ctx| {
            let mut pla = ParallelLinearAlgebra::new(&shared, ctx.index());
            f(&mut pla)
        })
    }

    #[test]
    fn partition_covers_all_rows() {
        let shared = SharedState::new(103, 4);
        let mut next = 0;
        for rank in 0..4 {
            let pla = ParallelLinearAlgebra::new(&shared, rank);
            assert_eq!(pla.start(), next);
            next = pla.end();
        }
        assert_eq!(next, 103);
    }

    #[test]
    fn dot_and_norm_agree_across_workers() {
        let n = 157;
        for workers in [1, 2, 3] {
            let mut a: Vec<f64> = (0..n).map(|i| (i as f64) * 0.25 - 3.0).collect();
            let mut b: Vec<f64> = (0..n).map(|i| 1.0 - (i as f64) * 0.125).collect();
            let expect_dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
            let ah = VecHandle::new(&mut a);
            let bh = VecHandle::new(&mut b);
            let results = spmd(n, workers, |pla| {
                let av = pla.add_vector(ah).unwrap();
                let bv = pla.add_vector(bh).unwrap();
                (pla.dot(av, bv), pla.norm(av), pla.max(av), pla.absmax(bv))
            });
            // every worker must see the identical fully-combined scalar
            for (d, nrm, mx, amx) in &results {
                assert!((d - expect_dot).abs() < 1e-9 * expect_dot.abs());
                assert_eq!(*nrm, results[0].1);
                assert_eq!(*mx, results[0].2);
                assert_eq!(*amx, results[0].3);
            }
        }
    }

    #[test]
    fn mult_matches_serial_spmv() {
        let n = 64;
        let a = poisson1d(n);
        let mut x: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let mut expect = vec![0.0; n];
        a.spmv(&x, &mut expect);
        let mut y = vec![0.0; n];
        let mh = MatHandle::new(&a);
        let xh = VecHandle::new(&mut x);
        let yh = VecHandle::new(&mut y);
        spmd(n, 3, |pla| {
            let am = pla.add_matrix(mh).unwrap();
            let xv = pla.add_vector(xh).unwrap();
            let yv = pla.add_vector(yh).unwrap();
            pla.mult(am, xv, yv);
            pla.wait();
        });
        assert_eq!(y, expect);
    }

    #[test]
    fn mult_trans_matches_dense_transpose() {
        // non-symmetric pattern so A and Aᵗ differ
        let dense = faer::Mat::from_fn(6, 6, |i, j| {
            if j == (i + 1) % 6 { (i + 1) as f64 } else if i == j { 2.0 } else { 0.0 }
        });
        let a = CsrMatrix::from_dense(&dense);
        let n = 6;
        let mut x: Vec<f64> = (0..n).map(|i| i as f64 - 2.5).collect();
        let mut expect = vec![0.0; n];
        for j in 0..n {
            for i in 0..n {
                expect[i] += dense[(j, i)] * x[j];
            }
        }
        let mut y = vec![0.0; n];
        let mh = MatHandle::new(&a);
        let xh = VecHandle::new(&mut x);
        let yh = VecHandle::new(&mut y);
        spmd(n, 2, |pla| {
            let am = pla.add_matrix(mh).unwrap();
            let xv = pla.add_vector(xh).unwrap();
            let yv = pla.add_vector(yh).unwrap();
            pla.mult_trans(am, xv, yv);
            pla.wait();
        });
        for i in 0..n {
            assert!((y[i] - expect[i]).abs() < 1e-12, "row {i}: {} vs {}", y[i], expect[i]);
        }
    }

    #[test]
    fn absthreshold_invert_falls_back_to_one() {
        let n = 4;
        let mut a = vec![2.0, -4.0, 1e-30, 0.0];
        let mut r = vec![0.0; n];
        let ah = VecHandle::new(&mut a);
        let rh = VecHandle::new(&mut r);
        spmd(n, 1, |pla| {
            let av = pla.add_vector(ah).unwrap();
            let rv = pla.add_vector(rh).unwrap();
            pla.absthreshold_invert(av, rv, 1e-18);
        });
        assert_eq!(r, vec![0.5, -0.25, 1.0, 1.0]);
    }

    #[test]
    fn signed_and_absolute_extrema() {
        let n = 6;
        let mut a = vec![3.0, -7.0, 0.5, -0.25, 4.0, 1.0];
        let ah = VecHandle::new(&mut a);
        let results = spmd(n, 2, |pla| {
            let av = pla.add_vector(ah).unwrap();
            (pla.min(av), pla.max(av), pla.absmin(av), pla.absmax(av))
        });
        for r in results {
            assert_eq!(r, (-7.0, 4.0, 0.25, 7.0));
        }
    }

    #[test]
    fn threshold_invert_is_signed() {
        let n = 4;
        let mut a = vec![2.0, -4.0, 1e-30, 0.0];
        let mut r = vec![0.0; n];
        let ah = VecHandle::new(&mut a);
        let rh = VecHandle::new(&mut r);
        spmd(n, 1, |pla| {
            let av = pla.add_vector(ah).unwrap();
            let rv = pla.add_vector(rh).unwrap();
            pla.threshold_invert(av, rv, 1e-18);
        });
        // negative entries fall below the signed threshold and pivot to 1
        assert_eq!(r, vec![0.5, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn link_failure_unwinds_every_worker_without_deadlock() {
        let n = 120;
        let mut too_short = vec![0.0; n - 1];
        let bad = VecHandle::new(&mut too_short);
        let results = spmd(n, 3, |pla| {
            let linked = pla.add_vector(bad);
            // the failure path still pairs up its barriers
            pla.wait();
            linked.is_some()
        });
        assert_eq!(results, vec![false, false, false]);
    }

    #[test]
    fn new_vector_is_zeroed_and_shared() {
        let n = 80;
        let sums = spmd(n, 2, |pla| {
            let v = pla.new_vector().unwrap();
            let before = pla.norm(v);
            pla.ones(v);
            let after = pla.dot(v, v);
            (before, after)
        });
        for (before, after) in sums {
            assert_eq!(before, 0.0);
            assert_eq!(after, n as f64);
        }
    }
}

// test helper shared with the solver modules
#[cfg(test)]
pub(crate) fn poisson1d(n: usize) -> crate::matrix::CsrMatrix {
    let mut row_ptr = Vec::with_capacity(n + 1);
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
    row_ptr.push(0);
    for i in 0..n {
        if i > 0 {
            col_idx.push(i - 1);
            values.push(-1.0);
        }
        col_idx.push(i);
        values.push(2.0);
        if i + 1 < n {
            col_idx.push(i + 1);
            values.push(-1.0);
        }
        row_ptr.push(col_idx.len());
    }
    crate::matrix::CsrMatrix::from_csr(n, n, row_ptr, col_idx, values)
}

// Compressed sparse-row matrix, immutable for the duration of a solve.

/// A CSR matrix over `f64`.
///
/// The solver treats the matrix as read-only: the worker pool shares the raw
/// `row_ptr`/`col_idx`/`values` slices without copying. Column indices within
/// a row must be sorted; `from_dense` and `from_csr` both produce that layout.
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build a CSR matrix from raw row-pointer, column-index, and value arrays.
    ///
    /// # Panics
    /// Panics if the arrays are structurally inconsistent (wrong `row_ptr`
    /// length, non-monotone row pointers, out-of-range column indices, or a
    /// value/index length mismatch).
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
    ) -> Self {
        assert_eq!(row_ptr.len(), nrows + 1, "row_ptr must have nrows+1 entries");
        assert_eq!(col_idx.len(), values.len(), "col_idx/values length mismatch");
        assert_eq!(*row_ptr.last().unwrap_or(&0), values.len());
        assert!(row_ptr.windows(2).all(|w| w[0] <= w[1]));
        assert!(col_idx.iter().all(|&c| c < ncols));
        Self { nrows, ncols, row_ptr, col_idx, values }
    }

    /// Build a CSR matrix from a dense `faer` matrix, dropping exact zeros.
    pub fn from_dense(a: &faer::Mat<f64>) -> Self {
        let (nrows, ncols) = (a.nrows(), a.ncols());
        let mut row_ptr = vec![0usize; nrows + 1];
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        for i in 0..nrows {
            for j in 0..ncols {
                let v = a[(i, j)];
                if v != 0.0 {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr[i + 1] = values.len();
        }
        Self { nrows, ncols, row_ptr, col_idx, values }
    }

    /// The n-by-n identity.
    pub fn identity(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Serial y = A·x, used for residual cross-checks outside the worker pool.
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        for i in 0..self.nrows {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }
    }
}

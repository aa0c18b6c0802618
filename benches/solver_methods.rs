use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parlin::{solve, CsrMatrix, Method, PcKind, SolverConfig};

/// 1-D Poisson operator, the usual SPD benchmark matrix.
fn poisson1d(n: usize) -> CsrMatrix {
    let mut row_ptr = vec![0];
    let mut col_idx = Vec::new();
    let mut values = Vec::new();
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
    CsrMatrix::from_csr(n, n, row_ptr, col_idx, values)
}

fn bench_methods(c: &mut Criterion) {
    let n = 2000;
    let a = poisson1d(n);
    let b: Vec<f64> = (0..n).map(|i| (i as f64 / n as f64).sin()).collect();

    let mut group = c.benchmark_group("poisson1d_2000");
    for method in [Method::Cg, Method::BiCg, Method::MinRes] {
        let config = SolverConfig {
            method,
            pre_conditioner: PcKind::Jacobi,
            target_error: 1e-6,
            max_iterations: 5000,
            workers: Some(4),
        };
        group.bench_function(method.name(), |ben| {
            ben.iter(|| solve(black_box(&a), black_box(&b), None, &config).unwrap())
        });
    }
    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let n = 4000;
    let a = poisson1d(n);
    let b = vec![1.0; n];

    let mut group = c.benchmark_group("cg_worker_scaling");
    for workers in [1usize, 2, 4] {
        let config = SolverConfig {
            method: Method::Cg,
            pre_conditioner: PcKind::Jacobi,
            target_error: 1e-6,
            max_iterations: 10000,
            workers: Some(workers),
        };
        group.bench_function(format!("{workers}_workers"), |ben| {
            ben.iter(|| solve(black_box(&a), black_box(&b), None, &config).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_methods, bench_worker_scaling);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use procpool::{FnProcess, Pid, Process, ProcessPool, WorkerPool};
use std::sync::Arc;

fn noops(count: usize) -> Vec<Arc<dyn Process>> {
    (0..count)
        .map(|i| Arc::new(FnProcess::new(format!("p-{}", i), "noop", || Ok(()))) as Arc<dyn Process>)
        .collect()
}

// register, dispatch and drain trivial processes
pub fn dispatch_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_bench");
    for size in [1usize, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::new("workers", size), size, |b, &size| {
            b.iter(|| {
                let pool = WorkerPool::new(size).unwrap();
                pool.start().unwrap();
                pool.register(noops(1000));
                pool.close().unwrap();
            })
        });
    }
    group.finish();
}

// kill every process before the pool starts
pub fn kill_bench(c: &mut Criterion) {
    c.bench_function("kill_before_start", |b| {
        b.iter(|| {
            let pool = WorkerPool::new(4).unwrap();
            pool.register(noops(1000));
            for i in 0..1000 {
                pool.kill(&Pid::new(format!("p-{}", i)));
            }
            pool.start().unwrap();
            pool.close().unwrap();
        })
    });
}

criterion_group!(benches, dispatch_bench, kill_bench);
criterion_main!(benches);

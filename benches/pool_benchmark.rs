use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam::channel::unbounded;
use telemetry::config::PoolConfig;
use telemetry::{logging, Job, WorkerPool};

const JOBS: usize = 1_000;

fn throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_pool");
    for &workers in &[1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("noop_jobs", workers), &workers, |b, &workers| {
            let pool = WorkerPool::with_config(PoolConfig::new(workers), logging::discard())
                .expect("unable to build pool");
            pool.start().expect("unable to start pool");
            b.iter(|| {
                let (tx, rx) = unbounded();
                for _ in 0..JOBS {
                    let tx = tx.clone();
                    pool.submit(Job::new("noop", move |_| {
                        tx.send(()).expect("bench receiver gone");
                        Ok(())
                    }));
                }
                for _ in 0..JOBS {
                    rx.recv().expect("job never finished");
                }
            });
            pool.shutdown();
        });
    }
    group.finish();
}

criterion_group!(benches, throughput);
criterion_main!(benches);

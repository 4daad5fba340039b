use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibre_memo::{MemoBuilder, Memoized};
use std::convert::Infallible;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

const NUM_KEYS: u64 = 1_024;

fn square_memo(max_size: usize) -> Memoized<u64, u64, Infallible> {
  MemoBuilder::new()
    .max_size(max_size)
    .build(|n: u64| Ok(n.wrapping_mul(n)))
    .unwrap()
}

fn bench_hits(c: &mut Criterion) {
  let memo = square_memo(NUM_KEYS as usize);
  for n in 0..NUM_KEYS {
    memo.call(n).unwrap();
  }

  let mut group = c.benchmark_group("call_hit");
  group.throughput(Throughput::Elements(1));
  group.bench_function("structural_u64", |b| {
    let mut n = 0;
    b.iter(|| {
      n = (n + 1) % NUM_KEYS;
      black_box(memo.call(black_box(n)).unwrap());
    })
  });
  group.finish();
}

fn bench_misses_with_eviction(c: &mut Criterion) {
  // Every call misses and evicts the least recently used entry.
  let memo = square_memo(64);

  let mut group = c.benchmark_group("call_miss");
  group.throughput(Throughput::Elements(1));
  group.bench_function("evicting", |b| {
    let mut n = 0u64;
    b.iter(|| {
      n += 1;
      black_box(memo.call(black_box(n)).unwrap());
    })
  });
  group.finish();
}

fn bench_contended_hits(c: &mut Criterion) {
  let mut group = c.benchmark_group("call_hit_contended");

  for threads in [2usize, 4, 8] {
    let memo = Arc::new(square_memo(NUM_KEYS as usize));
    for n in 0..NUM_KEYS {
      memo.call(n).unwrap();
    }

    group.throughput(Throughput::Elements(threads as u64));
    group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
      b.iter_custom(|iters| {
        let barrier = Arc::new(Barrier::new(threads + 1));
        let handles: Vec<_> = (0..threads)
          .map(|t| {
            let memo = memo.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
              barrier.wait();
              for i in 0..iters {
                black_box(memo.call((i + t as u64) % NUM_KEYS).unwrap());
              }
            })
          })
          .collect();

        barrier.wait();
        let start = Instant::now();
        for handle in handles {
          handle.join().unwrap();
        }
        start.elapsed()
      })
    });
  }
  group.finish();
}

criterion_group!(benches, bench_hits, bench_misses_with_eviction, bench_contended_hits);
criterion_main!(benches);

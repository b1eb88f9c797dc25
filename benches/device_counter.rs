use std::sync::atomic::{AtomicUsize, Ordering};

use contatori_device::counters::DeviceCounterArray;
use contatori_device::device::{DeviceSelector, Platform};
use contatori_device::queue::{Queue, Range};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbeam_utils::CachePadded;

const BUCKETS: usize = 4;
const ITEMS: usize = 1 << 20;

fn bench_histogram(c: &mut Criterion) {
    let device = Platform::default()
        .select(&DeviceSelector::Default)
        .unwrap();
    let queue = Queue::new(&device);
    let mut group = c.benchmark_group("histogram");

    let mut counter = DeviceCounterArray::<usize>::new(&queue, BUCKETS).unwrap();

    group.bench_function(
        BenchmarkId::new("get_add_output", format!("{}items x {}buckets", ITEMS, BUCKETS)),
        |b| {
            b.iter(|| {
                counter.pre_kernel_zero().unwrap();
                let cells = counter.handle().unwrap();
                queue
                    .parallel_for(Range::new(ITEMS), move |item| {
                        black_box(cells.get_add_output(item, item.id() % BUCKETS));
                    })
                    .wait_and_throw()
                    .unwrap();
                black_box(counter.get_counts().unwrap())
            })
        },
    );

    group.bench_function(
        BenchmarkId::new(
            "get_add_output_unchecked",
            format!("{}items x {}buckets", ITEMS, BUCKETS),
        ),
        |b| {
            b.iter(|| {
                counter.pre_kernel_zero().unwrap();
                let cells = counter.handle().unwrap();
                queue
                    .parallel_for(Range::new(ITEMS), move |item| {
                        // SAFETY: `id % BUCKETS` is below the array length.
                        black_box(unsafe {
                            cells.get_add_output_unchecked(item, item.id() % BUCKETS)
                        });
                    })
                    .wait_and_throw()
                    .unwrap();
                black_box(counter.get_counts().unwrap())
            })
        },
    );

    group.bench_function(
        BenchmarkId::new(
            "padded AtomicUsize (host)",
            format!("{}items x {}buckets", ITEMS, BUCKETS),
        ),
        |b| {
            let cells: Vec<CachePadded<AtomicUsize>> = (0..BUCKETS)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect();
            b.iter(|| {
                queue
                    .parallel_for(Range::new(ITEMS), |item| {
                        black_box(cells[item.id() % BUCKETS].fetch_add(1, Ordering::Relaxed));
                    })
                    .wait_and_throw()
                    .unwrap();
                black_box(cells[0].load(Ordering::Relaxed))
            })
        },
    );

    group.finish();
    counter.release().unwrap();
}

criterion_group!(benches, bench_histogram);
criterion_main!(benches);

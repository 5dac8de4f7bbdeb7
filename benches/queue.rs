//! Sample queue throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mic_streamer::audio::queue::{OverflowPolicy, SampleQueue};

fn bench_push_pop(c: &mut Criterion) {
    let queue = SampleQueue::new(16_384, OverflowPolicy::DropOldest);

    c.bench_function("push_pop_single", |b| {
        b.iter(|| {
            queue.push(black_box(42));
            black_box(queue.pop());
        })
    });
}

fn bench_chunk_drain(c: &mut Criterion) {
    let queue = SampleQueue::new(16_384, OverflowPolicy::DropOldest);

    c.bench_function("pop_chunk_1536", |b| {
        b.iter(|| {
            for i in 0..1536 {
                queue.push(i as i16);
            }
            black_box(queue.pop_chunk(black_box(1536)));
        })
    });
}

fn bench_saturated_push(c: &mut Criterion) {
    let queue = SampleQueue::new(1_024, OverflowPolicy::DropOldest);
    for i in 0..1_024 {
        queue.push(i as i16);
    }

    c.bench_function("push_at_capacity_drop_oldest", |b| {
        b.iter(|| queue.push(black_box(7)))
    });
}

criterion_group!(
    benches,
    bench_push_pop,
    bench_chunk_drain,
    bench_saturated_push
);
criterion_main!(benches);

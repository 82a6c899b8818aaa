use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use std::sync::Arc;

use syndicate_core::{ActionLogEntry, Amount, PlayerChanges, PlayerId};
use syndicate_infra::config::WriteQueueConfig;
use syndicate_infra::store::InMemoryGameStore;
use syndicate_infra::write_queue::{OperationRequest, WriteQueue, priority};
use tokio::runtime::Runtime;

fn new_queue(batch_size: usize) -> WriteQueue {
    let config = WriteQueueConfig::default()
        .with_batch_size(batch_size)
        .with_max_queue_size(1_000_000);
    WriteQueue::new(config, Arc::new(InMemoryGameStore::new())).expect("valid config")
}

/// Mix of wallet writes and audit entries at different priorities.
fn mixed_request(n: usize, player: PlayerId) -> OperationRequest {
    if n % 3 == 0 {
        let changes = PlayerChanges::new()
            .username("bench")
            .cash(Amount::increment(1));
        OperationRequest::upsert_player(player, changes).with_priority(priority::HIGH)
    } else {
        let entry = ActionLogEntry::new(player, "bench.op", format!("op {n}"));
        OperationRequest::append_action(entry).with_priority(priority::LOW)
    }
}

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_request", |b| {
        let queue = new_queue(50);
        let player = PlayerId::new();
        let mut n = 0usize;
        b.iter(|| {
            n += 1;
            black_box(queue.enqueue(mixed_request(n, player)).expect("enqueue"));
        });
    });

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_and_flush");
    let runtime = Runtime::new().expect("tokio runtime");

    for operations in [10usize, 100, 1000].iter() {
        for batch_size in [1usize, 50].iter() {
            group.throughput(Throughput::Elements(*operations as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("batch_{batch_size}"), operations),
                operations,
                |b, &operations| {
                    b.iter_batched(
                        || {
                            let queue = new_queue(*batch_size);
                            let player = PlayerId::new();
                            for n in 0..operations {
                                queue.enqueue(mixed_request(n, player)).expect("enqueue");
                            }
                            queue
                        },
                        |queue| runtime.block_on(async { black_box(queue.flush().await) }),
                        BatchSize::SmallInput,
                    );
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_flush);
criterion_main!(benches);

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use replistate::core::StateCore;
use replistate::dump::InMemoryValueStorage;
use replistate::entry::{LogEntry, LogEntryData, LogIndex};
use replistate::LogId;

async fn build_core() -> StateCore {
    StateCore::construct(LogId::new(), Arc::new(InMemoryValueStorage::new()), 1000)
        .await
        .expect("fresh core construction cannot fail")
}

fn batch(start: u64, count: u64) -> Vec<LogEntry> {
    (start..start + count)
        .map(|i| LogEntry {
            index: LogIndex(i),
            data: LogEntryData::Insert {
                map: [(format!("key-{i}"), format!("value-{i}"))].into(),
            },
        })
        .collect()
}

fn apply_throughput(c: &mut Criterion) {
    c.bench_function("apply 10k entries", |b| {
        b.iter(|| {
            let rt = Runtime::new().unwrap();
            let mut core = rt.block_on(build_core());
            let entries = batch(1, 10_000);
            core.apply_entries(&entries);
        })
    });

    c.bench_function("flush after 10k applied", |b| {
        b.iter(|| {
            let rt = Runtime::new().unwrap();
            let mut core = rt.block_on(build_core());
            core.apply_entries(&batch(1, 10_000));
            rt.block_on(core.flush());
        })
    });
}

criterion_group!(benches, apply_throughput);
criterion_main!(benches);

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use seglog::storage::config::Config;
use seglog::storage::log::Log;
use tempfile::tempdir;

const PAYLOAD_LEN: usize = 256;

fn bench_config() -> Config {
    let mut config = Config::default();
    config.segment.max_store_bytes = 4 << 20;
    config.segment.max_index_bytes = 1 << 20;
    config
}

fn bench_append(c: &mut Criterion) {
    let payload = vec![0x5A_u8; PAYLOAD_LEN];

    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    group.bench_function("256b", |b| {
        let tmp = tempdir().unwrap();
        let log = Log::open(tmp.path(), bench_config()).unwrap();
        b.iter(|| log.append(&payload).unwrap());
    });
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let payload = vec![0x5A_u8; PAYLOAD_LEN];
    let tmp = tempdir().unwrap();
    let log = Log::open(tmp.path(), bench_config()).unwrap();
    let mut last = 0;
    for _ in 0..1_000 {
        last = log.append(&payload).unwrap();
    }

    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    group.bench_function("256b", |b| {
        let mut offset = 0;
        b.iter(|| {
            let record = log.read(offset).unwrap();
            offset = if offset == last { 0 } else { offset + 1 };
            record
        });
    });
    group.finish();
}

criterion_group!(benches, bench_append, bench_read);
criterion_main!(benches);

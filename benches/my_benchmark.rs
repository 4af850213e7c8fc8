use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::prelude::*;
use snappy_wire::framed::FrameWriter;
use snappy_wire::raw;
use std::io::{self, Write};

fn criterion_benchmark(c: &mut Criterion) {
    let mut data = vec![0u8; 10_000_000];
    thread_rng().fill(&mut data[2_000_000..6_000_000]); // mixed

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(data.len() as u64));

    let mut dst = Vec::new();
    group.bench_function("block", |b| {
        b.iter(|| raw::encode(&mut dst, black_box(&data)).unwrap())
    });

    group.bench_function("framed", |b| {
        b.iter(|| {
            let mut w = FrameWriter::new_buffered(io::sink());
            w.write_all(black_box(&data)).unwrap();
            w.close().unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

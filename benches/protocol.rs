//! Criterion benchmarks for reply extraction and payload decoding.
//!
//! Run with:
//!   cargo bench --bench protocol
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use taskrig::protocol::{
    decode_hex_ratio, encode_hex_ratio, extract_reply, Occurrence, ReplyLayout,
};

/// An accumulator holding `stale` earlier replies before the one we want.
fn accumulated(stale: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..stale {
        buf.extend_from_slice(format!("!GLP{:03x}\r", i % 0xFFF).as_bytes());
    }
    buf.extend_from_slice(b"!GLP800\r");
    buf
}

/// Benchmark last-occurrence matching as the accumulator grows.
fn bench_extract_last(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_last");

    for stale in [0usize, 8, 64, 512].iter() {
        let buf = accumulated(*stale);
        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(stale), &buf, |b, buf| {
            b.iter(|| {
                black_box(extract_reply(
                    black_box(buf),
                    b"!GLP",
                    Occurrence::Last,
                    ReplyLayout::Inline,
                    b'\r',
                ))
            });
        });
    }

    group.finish();
}

fn bench_next_line(c: &mut Criterion) {
    let buf = b"gpio readall\n\r0000001A\n\r>".to_vec();
    c.bench_function("extract_next_line", |b| {
        b.iter(|| {
            black_box(extract_reply(
                black_box(&buf),
                b"gpio readall",
                Occurrence::First,
                ReplyLayout::NextLine,
                b'\r',
            ))
        });
    });
}

fn bench_hex_ratio(c: &mut Criterion) {
    c.bench_function("hex_ratio_codec", |b| {
        b.iter(|| {
            let hex = encode_hex_ratio(black_box(0.37), 3).unwrap_or_default();
            black_box(decode_hex_ratio(&hex))
        });
    });
}

criterion_group!(benches, bench_extract_last, bench_next_line, bench_hex_ratio);
criterion_main!(benches);

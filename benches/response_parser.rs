//! Criterion benchmarks for reply decoding.
//!
//! A full 180-entry `READINGS` reply is the largest frame the device sends,
//! and the buffer saturation scenario decodes it after every fill.
//!
//! Run with: cargo bench --bench response_parser

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wolksensor_harness::protocol::{extract_field, FieldType, Frame, READINGS_SCHEMA};
use wolksensor_harness::protocol::response::parse_records;

fn readings_payload(entries: usize) -> String {
    (0..entries)
        .map(|i| {
            format!(
                "R:{},T:{:.2},P:{:.2},H:{:.2}",
                1_514_824_768 + i * 60,
                22.5 + (i % 5) as f64 * 0.01,
                1001.2,
                40.0
            )
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn frame_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parse");

    let short = "STATUS CONNECTING_TO_AP;STATUS ACQUIRING_IP_ADDRESS;DONE;";
    group.bench_function("status_burst", |b| b.iter(|| Frame::parse(black_box(short))));

    for entries in [1usize, 20, 180] {
        let raw = format!("READINGS {};", readings_payload(entries));
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("readings", entries), &raw, |b, raw| {
            b.iter(|| Frame::parse(black_box(raw)))
        });
    }
    group.finish();
}

fn record_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_records");

    for entries in [1usize, 20, 180] {
        let payload = readings_payload(entries);
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &payload, |b, payload| {
            b.iter(|| parse_records(black_box(payload), &READINGS_SCHEMA).unwrap())
        });
    }
    group.finish();
}

fn field_extraction(c: &mut Criterion) {
    let line = "READINGS R:1514824768,T:22.51,P:1001.20,H:40.00,M:1.00;";
    c.bench_function("extract_field_temperature", |b| {
        b.iter(|| extract_field(black_box(line), 'T', FieldType::Float).unwrap())
    });
}

criterion_group!(benches, frame_parse, record_decode, field_extraction);
criterion_main!(benches);

//! Performance benchmarks for the comparison kernel and the container
//! parser, over payload sizes spanning one frame to a full vector.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use franken_opus::analysis::segment_stats;
use franken_opus::bitstream::parse_bitstream;

/// Deterministic pseudo-audio: a few mixed periodic components, scaled
/// to a plausible speech level.
fn synth_samples(n: usize, phase: usize) -> Vec<i16> {
    (0..n)
        .map(|i| {
            let t = (i + phase) as f64;
            let v = 6000.0 * (t / 37.0).sin() + 2500.0 * (t / 11.0).sin() + 800.0 * (t / 3.0).sin();
            v as i16
        })
        .collect()
}

fn bench_segment_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_stats");
    for &samples in &[960usize, 5760, 96_000] {
        let reference = synth_samples(samples, 0);
        let decoded = synth_samples(samples, 1);
        group.bench_with_input(
            BenchmarkId::from_parameter(samples),
            &samples,
            |b, _| b.iter(|| segment_stats(&decoded, &reference)),
        );
    }
    group.finish();
}

fn bench_parse_bitstream(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_bitstream");
    for &packets in &[10usize, 1000] {
        let mut data = Vec::new();
        for i in 0..packets {
            let payload: Vec<u8> = (0..120).map(|j| ((i + j) % 251) as u8).collect();
            data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            data.extend_from_slice(&(i as u32).to_be_bytes());
            data.extend_from_slice(&payload);
        }
        group.bench_with_input(BenchmarkId::from_parameter(packets), &packets, |b, _| {
            b.iter(|| parse_bitstream(&data).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_segment_stats, bench_parse_bitstream);
criterion_main!(benches);

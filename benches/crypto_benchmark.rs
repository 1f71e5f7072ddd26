//! Performance benchmarks for the MAC-layer crypto operations
//!
//! This benchmark suite measures MIC computation and FRMPayload ciphering
//! throughput across typical LoRaWAN frame sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lorawan_ns::lorawan::crypto::{data_mic, payload_cipher, AesKey, Direction};
use lorawan_ns::lorawan::frame::DevAddr;
use std::time::Duration;

/// Test data sizes for throughput testing; 222 bytes is the largest
/// FRMPayload the EU868 data rates allow.
const SMALL_FRAME: usize = 16;
const MEDIUM_FRAME: usize = 64;
const LARGE_FRAME: usize = 222;

/// Generate test data of specified size
fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Benchmark data-frame MIC computation
fn bench_data_mic(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_mic");
    group.measurement_time(Duration::from_secs(10));

    let key = AesKey::from([2; 16]);
    let devaddr = DevAddr::new(0x01020304);

    for size in &[SMALL_FRAME, MEDIUM_FRAME, LARGE_FRAME] {
        let data = generate_test_data(*size);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                data_mic(
                    black_box(&key),
                    Direction::Uplink,
                    devaddr,
                    black_box(1),
                    black_box(data),
                )
            })
        });
    }

    group.finish();
}

/// Benchmark FRMPayload ciphering
fn bench_payload_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_cipher");
    group.measurement_time(Duration::from_secs(10));

    let key = AesKey::from([1; 16]);
    let devaddr = DevAddr::new(0x01020304);

    for size in &[SMALL_FRAME, MEDIUM_FRAME, LARGE_FRAME] {
        let data = generate_test_data(*size);

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| {
                payload_cipher(
                    black_box(&key),
                    Direction::Uplink,
                    devaddr,
                    black_box(1),
                    black_box(data),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_data_mic, bench_payload_cipher);
criterion_main!(benches);

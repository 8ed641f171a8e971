//! Benchmark: the hot loops of a volume scan.
//!
//! The bitmap popcount dominates statistics reporting, and the rolling
//! checksums run over every directory entry set and the whole boot
//! region during verification.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rexfat::structures::bitmap::count_used_clusters;
use rexfat::structures::checksum;

/// A bitmap the size a 32GiB volume with 32KiB clusters carries, with
/// allocation spread over most bytes.
fn make_bitmap() -> Vec<u8> {
    let mut bitmap = vec![0u8; 128 * 1024];
    for (i, byte) in bitmap.iter_mut().enumerate() {
        if i % 3 != 0 {
            *byte = 0b1011_0101;
        }
    }
    bitmap
}

fn bench_count_used(c: &mut Criterion) {
    let bitmap = make_bitmap();
    c.bench_function("count_used_clusters_128k", |b| {
        b.iter(|| black_box(count_used_clusters(black_box(&bitmap))));
    });
}

fn bench_entry_set_checksum(c: &mut Criterion) {
    // The largest legal set: a primary plus 18 secondaries
    let set = vec![0xA5u8; 19 * 32];
    c.bench_function("entry_set_checksum_full_set", |b| {
        b.iter(|| black_box(checksum::entry_set_checksum(black_box(&set))));
    });
}

fn bench_boot_region_checksum(c: &mut Criterion) {
    let region = vec![0x5Au8; 11 * 512];
    c.bench_function("boot_region_checksum", |b| {
        b.iter(|| black_box(checksum::boot_region_checksum(black_box(&region))));
    });
}

criterion_group!(
    benches,
    bench_count_used,
    bench_entry_set_checksum,
    bench_boot_region_checksum
);
criterion_main!(benches);

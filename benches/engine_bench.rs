use criterion::{criterion_group, criterion_main, Criterion};
use fidx::{FixedBytes, Handle, OpenOptions};
use rand::prelude::*;
use tempfile::TempDir;

type K = FixedBytes<16>;
type V = FixedBytes<16>;

fn random_entry(rng: &mut impl Rng) -> (K, V) {
    let mut k = [0u8; 16];
    let mut v = [0u8; 16];
    rng.fill(&mut k);
    rng.fill(&mut v);
    (FixedBytes(k), FixedBytes(v))
}

fn write_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("replace");

    group.bench_function("below_merge_threshold", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let opts = OpenOptions::new(10_000);
                let handle = Handle::<K, V>::open(temp_dir.path(), opts).unwrap();
                (temp_dir, handle)
            },
            |(_dir, handle)| {
                let mut rng = thread_rng();
                for _ in 0..100 {
                    let (k, v) = random_entry(&mut rng);
                    handle.replace(k, v).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("forces_merge_every_batch", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let opts = OpenOptions::new(16);
                let handle = Handle::<K, V>::open(temp_dir.path(), opts).unwrap();
                (temp_dir, handle)
            },
            |(_dir, handle)| {
                let mut rng = thread_rng();
                for _ in 0..100 {
                    let (k, v) = random_entry(&mut rng);
                    handle.replace(k, v).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn read_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");

    group.bench_function("from_mirror", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let opts = OpenOptions::new(10_000);
                let handle = Handle::<K, V>::open(temp_dir.path(), opts).unwrap();
                let mut rng = thread_rng();
                let keys: Vec<K> = (0..200)
                    .map(|_| {
                        let (k, v) = random_entry(&mut rng);
                        handle.replace(k.clone(), v).unwrap();
                        k
                    })
                    .collect();
                (temp_dir, handle, keys)
            },
            |(_dir, handle, keys)| {
                let mut rng = thread_rng();
                for _ in 0..100 {
                    let key = &keys[rng.gen_range(0..keys.len())];
                    handle.find(key).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function("from_merged_index", |b| {
        b.iter_batched(
            || {
                let temp_dir = TempDir::new().unwrap();
                let opts = OpenOptions::new(10_000);
                let handle = Handle::<K, V>::open(temp_dir.path(), opts).unwrap();
                let mut rng = thread_rng();
                let keys: Vec<K> = (0..200)
                    .map(|_| {
                        let (k, v) = random_entry(&mut rng);
                        handle.replace(k.clone(), v).unwrap();
                        k
                    })
                    .collect();
                handle.force_merge().unwrap();
                (temp_dir, handle, keys)
            },
            |(_dir, handle, keys)| {
                let mut rng = thread_rng();
                for _ in 0..100 {
                    let key = &keys[rng.gen_range(0..keys.len())];
                    handle.find(key).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, write_bench, read_bench);
criterion_main!(benches);

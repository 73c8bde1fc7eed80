use criterion::{criterion_group, criterion_main, Criterion};
use dafixup_scanner::*;

fn needle_at_end(c: &mut Criterion) {
    use rand::prelude::*;
    let size = 64 * 1024 * 1024;
    let mut data: Vec<u8> = Vec::with_capacity(size);
    let mut rng = rand::thread_rng();

    let needle = b"\x83\xf8\x03\x74\x2a\x83\xf8\x02";

    data.extend((0..size - needle.len()).map(|_| rng.gen::<u8>()));
    data.extend(needle);

    let pattern = Pattern::new("83 F8 03 74 ?? 83 F8 02").unwrap();

    assert_eq!(first_match(&pattern, &data), Some(size - needle.len()));
    assert_eq!(
        scan_pattern(&[&pattern], &data),
        vec![vec![size - needle.len()]]
    );

    c.bench_function("first_match", |b| b.iter(|| first_match(&pattern, &data)));
    c.bench_function("scan_pattern", |b| {
        b.iter(|| scan_pattern(&[&pattern], &data))
    });
}

criterion_group! {
    name = bench;
    config = Criterion::default().sample_size(30);
    targets = needle_at_end
}

criterion_main!(bench);

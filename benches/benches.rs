use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use sid_logger::{
    codec::{self, ReadOptions, WriteOptions},
    filter::{bema, DEFAULT_WING},
    params::{midnight, LogType, SidParams},
    DailyRecord, Station,
};

fn full_day(rng: &mut ThreadRng) -> DailyRecord {
    let params: SidParams = [
        ("site", "BENCH"),
        ("longitude", "0"),
        ("latitude", "0"),
        ("utc_offset", "+00:00"),
        ("timezone", "UTC"),
        ("monitorid", "B"),
    ]
    .into_iter()
    .collect();
    let stations = vec![Station::new("NWC", 19800), Station::new("JJI", 22200)];
    let start = midnight(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    let mut record = DailyRecord::new(params, stations, 5, start);
    for s in 0..2 {
        for i in 0..record.len() {
            record.set_sample(i, s, rng.gen_range(0.0..10.0)).unwrap();
        }
    }
    record
}

fn benchmark(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    let day: Vec<f64> = (0..17280).map(|_| rng.gen_range(0.0..10.0)).collect();

    c.bench_function("bema full day", |b| {
        b.iter(|| bema(black_box(&day), black_box(DEFAULT_WING)))
    });

    let record = full_day(&mut rng);
    let mut single = Vec::new();
    record
        .write_single_to("NWC", &mut single, &WriteOptions::new(LogType::Raw))
        .unwrap();
    let single = String::from_utf8(single).unwrap();
    let mut extended = Vec::new();
    record
        .write_multi_to(&mut extended, &WriteOptions::new(LogType::Raw).extended(true))
        .unwrap();
    let extended = String::from_utf8(extended).unwrap();

    c.bench_function("decode sid fast path", |b| {
        b.iter(|| codec::decode(black_box(&single), ReadOptions::default()))
    });

    c.bench_function("decode supersid extended", |b| {
        b.iter(|| codec::decode(black_box(&extended), ReadOptions::default()))
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);

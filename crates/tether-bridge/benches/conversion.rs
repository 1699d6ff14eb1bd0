use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tether_bridge::{Bridgeable, BridgedFn, ConversionOptions};
use tether_host::{ForeignValue, Host};
use tether_sdk::ForeignContext;

fn bench_primitives(c: &mut Criterion) {
    let host = Host::new(tether_bridge::entry_points());
    let ctx: &dyn ForeignContext = &host;

    c.bench_function("i64_round_trip", |b| {
        b.iter(|| {
            let foreign = black_box(42i64).to_foreign(ctx, ConversionOptions::NONE).unwrap();
            i64::from_foreign(ctx, foreign, ConversionOptions::NONE).unwrap()
        });
    });

    c.bench_function("string_round_trip", |b| {
        let text = "the quick brown fox".to_string();
        b.iter(|| {
            let foreign = black_box(text.clone()).to_foreign(ctx, ConversionOptions::NONE).unwrap();
            let back = String::from_foreign(ctx, foreign, ConversionOptions::NONE).unwrap();
            host.drop_local_refs();
            back
        });
    });
}

fn bench_lists(c: &mut Criterion) {
    let host = Host::new(tether_bridge::entry_points());
    let ctx: &dyn ForeignContext = &host;
    let mut group = c.benchmark_group("list_round_trip");

    for size in [10usize, 100, 1000] {
        let items: Vec<i32> = (0..size as i32).collect();
        group.throughput(Throughput::Elements(size as u64));
        for (label, options) in [
            ("wrapped", ConversionOptions::NONE),
            ("plain", ConversionOptions::NATIVE_CONTAINER),
        ] {
            group.bench_with_input(BenchmarkId::new(label, size), &items, |b, items| {
                b.iter(|| {
                    let foreign = black_box(items.clone()).to_foreign(ctx, options).unwrap();
                    let back = Vec::<i32>::from_foreign(ctx, foreign, options).unwrap();
                    host.drop_local_refs();
                    back
                });
            });
        }
    }

    group.finish();
}

fn bench_maps(c: &mut Criterion) {
    let host = Host::new(tether_bridge::entry_points());
    let ctx: &dyn ForeignContext = &host;

    let map: HashMap<String, i64> = (0..100).map(|i| (format!("key{}", i), i)).collect();
    c.bench_function("map_round_trip_100", |b| {
        b.iter(|| {
            let foreign = black_box(map.clone()).to_foreign(ctx, ConversionOptions::NONE).unwrap();
            let back = HashMap::<String, i64>::from_foreign(ctx, foreign, ConversionOptions::NONE).unwrap();
            host.drop_local_refs();
            back
        });
    });
}

fn bench_closures(c: &mut Criterion) {
    let host = Host::new(tether_bridge::entry_points());
    let ctx: &dyn ForeignContext = &host;
    let mut group = c.benchmark_group("closure_call");

    let lambda = host.new_lambda(1, |host, args| {
        let x = host.unboxed(args[0]).and_then(|v| v.as_int()).unwrap_or(0);
        Ok(host.boxed(ForeignValue::Int(x + 1)))
    });
    let foreign = BridgedFn::<(i32,), i32>::from_foreign(ctx, ForeignValue::Object(lambda), ConversionOptions::NONE)
        .unwrap();
    group.bench_function("native_to_foreign", |b| {
        b.iter(|| {
            let out = foreign.call(black_box(1)).unwrap();
            host.drop_local_refs();
            out
        });
    });

    let native = BridgedFn::<(i32,), i32>::new(|x| Ok(x + 1));
    let proxy = native.to_foreign(ctx, ConversionOptions::NONE).unwrap();
    let round_tripped = BridgedFn::<(i32,), i32>::from_foreign(ctx, proxy, ConversionOptions::NONE).unwrap();
    group.bench_function("round_tripped_native", |b| {
        b.iter(|| round_tripped.call(black_box(1)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_primitives, bench_lists, bench_maps, bench_closures);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use imperia_net::{decode, encode, Value};

fn map_message(tiles: usize) -> Value {
    let terrain: Vec<Value> = (0..tiles).map(|index| Value::Int((index % 7) as i64)).collect();
    Value::map([
        ("topic", Value::from("scenario.map")),
        ("columns", Value::from(40)),
        ("terrain", Value::Seq(terrain)),
    ])
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for tiles in [680usize, 4_000, 20_000] {
        let message = map_message(tiles);
        let encoded = encode(&message).expect("benchmark message encodes");
        group.bench_with_input(BenchmarkId::new("encode", tiles), &message, |b, message| {
            b.iter(|| encode(message))
        });
        group.bench_with_input(BenchmarkId::new("decode", tiles), &encoded, |b, bytes| {
            b.iter(|| decode(bytes))
        });
    }

    group.finish();
}

criterion_group!(codec_benches, bench_codec);
criterion_main!(codec_benches);

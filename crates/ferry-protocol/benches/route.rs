//! Route parsing benchmarks for ferry-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferry_protocol::{codec, parse_route, routes_equal, Command};

fn bench_parse_path(c: &mut Criterion) {
    c.bench_function("parse_path", |b| {
        b.iter(|| parse_route(black_box("/users/42/posts/hello%20world?tab=info&page=2")))
    });
}

fn bench_parse_url(c: &mut Criterion) {
    c.bench_function("parse_url", |b| {
        b.iter(|| parse_route(black_box("https://example.org/users/42/posts?tab=info")))
    });
}

fn bench_equality(c: &mut Criterion) {
    c.bench_function("routes_equal", |b| {
        b.iter(|| routes_equal(black_box("/a/b/c/?x=1&y=2"), black_box("/a/b/c?y=2&x=1")))
    });
}

fn bench_command_roundtrip(c: &mut Criterion) {
    let command = Command::Update {
        id: "counter".into(),
        data: "{\"value\":42}".into(),
    };

    c.bench_function("command_roundtrip", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&command)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_parse_path,
    bench_parse_url,
    bench_equality,
    bench_command_roundtrip
);
criterion_main!(benches);

//! Criterion benchmarks for rust_bus_logger

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rust_bus_logger::bridge::MemoryBroker;
use rust_bus_logger::prelude::*;
use rust_bus_logger::serializer::{literal, TraceFrame};
use serde_json::json;

// ============================================================================
// Serializer Benchmarks
// ============================================================================

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");
    group.throughput(Throughput::Elements(1));

    let plain = LogRecord::new(LogLevel::Info, "user logged in")
        .with_location(SourceLocation::new("src/auth.rs", 88, "auth").with_function("login"));
    group.bench_function("plain_text", |b| b.iter(|| black_box(serialize(black_box(&plain)))));

    let literal_record = LogRecord::new(
        LogLevel::Info,
        "{'user': 'ada', 'roles': ['admin', 'ops'], 'quota': (10, 20.5), 'active': True}",
    );
    group.bench_function("structured_literal", |b| {
        b.iter(|| black_box(serialize(black_box(&literal_record))))
    });

    let value_record = LogRecord::new(LogLevel::Info, json!({"order": 42, "items": [1, 2, 3]}));
    group.bench_function("json_value", |b| {
        b.iter(|| black_box(serialize(black_box(&value_record))))
    });

    let trace = ExceptionTrace::new("ValueError", "bad quantity").with_frame(
        TraceFrame::new("src/orders.rs", 96, "apply")
            .with_statement("let total = order.items[0].price * qty;")
            .with_local("order", json!({"items": [{"price": 3}]}))
            .with_local("qty", json!(2)),
    );
    let exception_record = LogRecord::new(LogLevel::Error, "failed").with_exception(trace);
    group.bench_function("exception", |b| {
        b.iter(|| black_box(serialize(black_box(&exception_record))))
    });

    group.finish();
}

fn bench_literal_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("literal_parse");
    let inputs = [
        ("scalar_text", "connection reset by peer"),
        ("tuple", "(1, 2, 3)"),
        ("nested", "{'a': [1, 2, {'b': (3, 4)}], 'c': None, 'd': 'x\\ny'}"),
    ];
    for (name, text) in inputs {
        group.bench_function(name, |b| b.iter(|| black_box(literal::parse(black_box(text)))));
    }
    group.finish();
}

// ============================================================================
// Delivery Bridge Benchmarks
// ============================================================================

fn bench_publish_roundtrip(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to build runtime");
    let broker = MemoryBroker::new();
    let mut bridge = DeliveryBridge::new(broker.connector());
    bridge
        .initialize(&ClientSettings::new())
        .expect("Failed to initialize bridge");
    bridge
        .start(runtime.handle().clone())
        .expect("Failed to start bridge");

    let payload = serialize(&LogRecord::new(LogLevel::Info, "benchmark"));
    let mut group = c.benchmark_group("delivery_bridge");
    group.throughput(Throughput::Elements(1));
    group.bench_function("publish_and_await", |b| {
        b.iter(|| {
            runtime.block_on(async {
                bridge
                    .publish("bench", payload.clone())
                    .expect("bridge is running")
                    .await
                    .expect("memory broker accepts")
            })
        })
    });
    group.finish();

    bridge.close().expect("Failed to close bridge");
}

criterion_group!(benches, bench_serialize, bench_literal_parse, bench_publish_roundtrip);
criterion_main!(benches);

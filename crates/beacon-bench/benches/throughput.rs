//! Throughput benchmarks for Beacon.
//!
//! These benchmarks measure the raw throughput of the codec, the topic hub,
//! room membership, and both fan-out strategies.

use beacon_bench::{populated_roster, NullTransport};
use beacon_core::{BroadcastConfig, Broadcaster, ConnectionMeta, Roster};
use beacon_protocol::{codec, Envelope, Format, Topic};
use beacon_transport::{ConnectionId, TopicHub, TopicPublisher};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn envelope(size: usize) -> Envelope {
    Envelope::new("chat", json!({ "text": "x".repeat(size) }))
}

/// Benchmark envelope encoding in both wire formats.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for (label, size) in [("64B", 64), ("1KB", 1024), ("64KB", 65536)] {
        let message = envelope(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("json/{}", label), |b| {
            b.iter(|| codec::encode_envelope(black_box(&message), Format::Json))
        });
        group.bench_function(format!("msgpack/{}", label), |b| {
            b.iter(|| codec::encode_envelope(black_box(&message), Format::Msgpack))
        });
    }

    group.finish();
}

/// Benchmark client frame decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let join = br#"{"op":"join","id":42,"chat_id":"chat-1234"}"#;
    group.throughput(Throughput::Bytes(join.len() as u64));
    group.bench_function("json/join", |b| {
        b.iter(|| codec::decode(black_box(join), Format::Json))
    });

    let frame = beacon_protocol::Frame::join(42, "chat-1234");
    let encoded = codec::encode(&frame, Format::Msgpack).unwrap();
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("msgpack/join", |b| {
        b.iter(|| codec::decode(black_box(&encoded), Format::Msgpack))
    });

    group.finish();
}

/// Benchmark topic hub operations.
fn bench_hub(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub");

    group.bench_function("subscribe", |b| {
        let hub = TopicHub::new();
        let mut i = 0u64;
        b.iter(|| {
            let conn = ConnectionId::new(format!("conn:{}", i));
            let topic = Topic::chat(format!("chat:{}", i % 1000));
            i += 1;
            hub.subscribe(&conn, &topic)
        });
    });

    for size in [1, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("publish", size), &size, |b, &size| {
            let hub = TopicHub::new();
            let topic = Topic::chat("room");
            let _rxs: Vec<_> = (0..size)
                .map(|i| hub.subscribe(&ConnectionId::new(format!("conn-{}", i)), &topic))
                .collect();
            let payload = Bytes::from(vec![0u8; 64]);

            b.iter(|| hub.publish(&topic, black_box(payload.clone())));
        });
    }

    group.finish();
}

/// Benchmark room membership churn.
fn bench_membership(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("membership");

    let roster = Roster::new();
    rt.block_on(async {
        let transport = NullTransport::new("conn-0");
        roster
            .register("user-0", transport, ConnectionMeta::new("User", "member"))
            .await
            .unwrap();
    });

    group.bench_function("join_leave", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let chat_id = format!("chat-{}", i % 64);
            i += 1;
            roster.join("user-0", &chat_id).unwrap();
            roster.leave("user-0", &chat_id)
        });
    });

    group.bench_function("register_unregister", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let user_id = format!("churn-{}", i);
            i += 1;
            rt.block_on(async {
                let transport = NullTransport::new(user_id.as_str());
                roster
                    .register(&user_id, transport, ConnectionMeta::new("U", "member"))
                    .await
                    .unwrap();
            });
            roster.unregister(&user_id)
        });
    });

    group.finish();
}

/// Benchmark room fan-out for both strategies.
fn bench_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout");
    let message = envelope(64);

    for size in [10, 100, 1000] {
        let roster = rt.block_on(populated_roster(size, "room"));
        group.throughput(Throughput::Elements(size as u64));

        let direct = Broadcaster::direct(roster.clone(), BroadcastConfig::default());
        group.bench_with_input(BenchmarkId::new("direct", size), &size, |b, _| {
            b.iter(|| {
                rt.block_on(direct.broadcast_to_room("room", black_box(&message), Some("user-0")))
            })
        });

        let hub = Arc::new(TopicHub::new());
        let room = Topic::chat("room");
        let _rxs: Vec<_> = (0..size)
            .map(|i| hub.subscribe(&ConnectionId::new(format!("conn-{}", i)), &room))
            .collect();
        let topic = Broadcaster::topic(roster, hub, BroadcastConfig::default());
        group.bench_with_input(BenchmarkId::new("topic", size), &size, |b, _| {
            b.iter(|| rt.block_on(topic.broadcast_to_room("room", black_box(&message), None)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_hub,
    bench_membership,
    bench_fanout,
);
criterion_main!(benches);

//! Codec benchmarks for rendezvous-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rendezvous_protocol::{codec, Envelope, Relay};
use serde_json::json;

/// A candidate-sized relay envelope.
fn candidate() -> Envelope {
    Envelope::ice_candidate(Relay::to_peer(
        "4f8c1d2e-0000-4000-8000-000000000001",
        json!({
            "candidate": "candidate:842163049 1 udp 1677729535 203.0.113.7 51234 typ srflx",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        }),
    ))
    .with_sender("4f8c1d2e-0000-4000-8000-000000000002")
}

fn bench_encode_candidate(c: &mut Criterion) {
    let envelope = candidate();
    let size = codec::encode(&envelope).unwrap().len();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("ice_candidate", |b| {
        b.iter(|| codec::encode(black_box(&envelope)))
    });
    group.finish();
}

fn bench_decode_candidate(c: &mut Criterion) {
    let encoded = codec::encode(&candidate()).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("ice_candidate", |b| {
        b.iter(|| codec::decode(black_box(encoded.as_bytes())))
    });
    group.finish();
}

fn bench_roundtrip_offer(c: &mut Criterion) {
    let sdp = "v=0\r\n".repeat(200);
    let envelope = Envelope::offer(Relay::to_peer("peer-b", json!({ "type": "offer", "sdp": sdp })));

    c.bench_function("roundtrip_offer_1KB", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&envelope)).unwrap();
            codec::decode(black_box(encoded.as_bytes())).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_candidate,
    bench_decode_candidate,
    bench_roundtrip_offer
);
criterion_main!(benches);

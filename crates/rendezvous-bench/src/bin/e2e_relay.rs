//! End-to-end relay benchmark for Rendezvous.
//!
//! Pairs of WebSocket clients share a room; one side of each pair floods
//! ICE candidates at the room and the other counts what arrives.
//!
//! Usage: `e2e_relay [pairs] [ws-url]`

use futures_util::{SinkExt, StreamExt};
use rendezvous_protocol::{codec, Envelope, Relay};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let pairs = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(8);
    let url = args.get(2).cloned().unwrap_or_else(|| DEFAULT_URL.to_string());

    println!("Rendezvous end-to-end relay benchmark");
    println!("  Server: {} (start it with `cargo run --release`)", url);
    println!("  Pairs: {}, warmup: {}s, measurement: {}s", pairs, WARMUP_SECS, BENCH_SECS);
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(pairs * 2 + 1));
    let mut handles = Vec::new();

    for pair in 0..pairs {
        let room = format!("bench-{}", pair);
        for role in [Role::Sender, Role::Receiver] {
            let url = url.clone();
            let room = room.clone();
            let received = Arc::clone(&received);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                if let Err(e) = run_client(&url, &room, role, received, barrier).await {
                    eprintln!("Client in {} failed: {}", room, e);
                }
            }));
        }
    }

    barrier.wait().await;
    println!("All {} clients joined", pairs * 2);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;
    received.store(0, Ordering::SeqCst);
    let start = Instant::now();

    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total = received.load(Ordering::SeqCst);
    let per_sec = total as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results");
    println!("  Duration:      {:>10.2}s", elapsed.as_secs_f64());
    println!("  Relayed:       {:>10}", total);
    println!("  Throughput:    {:>10.0} msg/s", per_sec);
    println!("  Per pair:      {:>10.0} msg/s", per_sec / pairs as f64);

    for handle in handles {
        handle.abort();
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Sender,
    Receiver,
}

async fn run_client(
    url: &str,
    room: &str,
    role: Role,
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    // init
    stream.next().await;

    let join = codec::encode(&Envelope::join(room, format!("{:?}", role)))?;
    sink.send(Message::Text(join)).await?;
    // room-joined
    stream.next().await;

    barrier.wait().await;

    match role {
        Role::Receiver => {
            while let Some(Ok(msg)) = stream.next().await {
                if let Message::Text(text) = msg {
                    if codec::decode(text.as_bytes()).is_ok() {
                        received.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        Role::Sender => {
            let candidate = Envelope::ice_candidate(Relay::to_room(
                room,
                json!({ "candidate": "candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host" }),
            ));
            let frame = Message::Text(codec::encode(&candidate)?);

            // Drain notices so the server never blocks on us
            tokio::spawn(async move { while stream.next().await.is_some() {} });

            loop {
                sink.send(frame.clone()).await?;
                tokio::task::yield_now().await;
            }
        }
    }

    Ok(())
}

//! Load test for the arena server.
//!
//! Spawns multiple TCP bots that:
//! - Join under their own pseudo
//! - Send random `NEWCOM` frames at a fixed rate, and the odd bomb
//! - Count the frames the server pushes back
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of bots to spawn (default: 8)
//!   --duration S     Test duration in seconds (default: 30)
//!   --rate R         Commands per second per bot (default: 20)
//!   --addr ADDR      Server address (default: 127.0.0.1:2019)
//!   --json           Print the final summary as JSON

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arena_shared::protocol::ClientMsg;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    denied: AtomicU64,
    frames_received: AtomicU64,
    ticks_received: AtomicU64,
    objectives_received: AtomicU64,
    winners_received: AtomicU64,
    commands_sent: AtomicU64,
    bombs_sent: AtomicU64,
    errors: AtomicU64,
}

#[derive(Serialize)]
struct Summary {
    clients: u32,
    duration_secs: u64,
    frames_received: u64,
    ticks_received: u64,
    ticks_per_client_per_sec: f64,
    objectives_received: u64,
    winners_received: u64,
    commands_sent: u64,
    bombs_sent: u64,
    denied: u64,
    errors: u64,
}

impl Metrics {
    /// Count the frames in `buf`, keeping a trailing partial token for the next read.
    fn count_frames(&self, buf: &mut String) {
        let tail_start = buf.rfind('/').map(|i| i + 1).unwrap_or(0);
        for token in buf[..tail_start].split('/') {
            let specific = match token {
                "TICK" => Some(&self.ticks_received),
                "NEWOBJ" => Some(&self.objectives_received),
                "WINNER" => Some(&self.winners_received),
                "DENIED" => Some(&self.denied),
                "WELCOME" | "SESSION" | "NEWPLAYER" | "PLAYERLEFT" | "PUT" | "HIT" => None,
                _ => continue,
            };
            self.frames_received.fetch_add(1, Ordering::Relaxed);
            if let Some(counter) = specific {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        buf.drain(..tail_start);
    }
}

// === Bot task ===

async fn run_bot(client_id: u32, addr: String, rate: f64, duration: Duration, metrics: Arc<Metrics>) {
    let mut stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Bot {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let join = format!(
        "{}\n",
        ClientMsg::Join {
            name: format!("bot{}", client_id),
        }
    );
    if stream.write_all(join.as_bytes()).await.is_err() {
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let (mut reader, mut writer) = stream.into_split();
    let mut rng = ChaCha8Rng::seed_from_u64(u64::from(client_id) * 12345 + 67890);
    let mut command_timer = tokio::time::interval(Duration::from_secs_f64(1.0 / rate.max(0.1)));
    command_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = tokio::time::Instant::now() + duration;
    let mut chunk = [0u8; 4096];
    let mut pending = String::new();

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(test_end) => break,

            _ = command_timer.tick() => {
                let msg = if rng.gen_bool(0.01) {
                    ClientMsg::PutBomb {
                        x: rng.gen_range(-300.0..300.0),
                        y: rng.gen_range(-200.0..200.0),
                    }
                } else {
                    ClientMsg::Command {
                        angle: rng.gen_range(-0.2..0.2),
                        thrust: rng.gen_range(0..=2),
                    }
                };
                let counter = match msg {
                    ClientMsg::PutBomb { .. } => &metrics.bombs_sent,
                    _ => &metrics.commands_sent,
                };
                if writer.write_all(format!("{}\n", msg).as_bytes()).await.is_err() {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                counter.fetch_add(1, Ordering::Relaxed);
            }

            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        if client_id < 3 {
                            eprintln!("Bot {} disconnected by server", client_id);
                        }
                        break;
                    }
                    Ok(n) => {
                        pending.push_str(&String::from_utf8_lossy(&chunk[..n]));
                        metrics.count_frames(&mut pending);
                    }
                    Err(e) => {
                        if client_id < 3 {
                            eprintln!("Bot {} read error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }
    }

    let _ = writer.write_all(b"EXIT/\n").await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 8;
    let mut duration_secs: u64 = 30;
    let mut rate: f64 = 20.0;
    let mut addr = "127.0.0.1:2019".to_string();
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(8);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--rate" => {
                i += 1;
                rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--addr" => {
                i += 1;
                addr = args.get(i).cloned().unwrap_or(addr);
            }
            "--json" => json = true,
            _ => {}
        }
        i += 1;
    }

    if !json {
        println!("=== Arena Server Load Test ===");
        println!("Clients: {}", num_clients);
        println!("Duration: {}s", duration_secs);
        println!("Command rate: {}/s per bot", rate);
        println!("Address: {}", addr);
        println!();
    }

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);
    let start = Instant::now();

    let mut handles = Vec::with_capacity(num_clients as usize);
    for client_id in 0..num_clients {
        let addr = addr.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(async move {
            run_bot(client_id, addr, rate, duration, metrics).await;
        }));
    }

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            if json {
                continue;
            }
            println!(
                "[{:3}s] connected={}, frames={}, ticks={}, commands={}, errors={}",
                start.elapsed().as_secs(),
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.frames_received.load(Ordering::Relaxed),
                metrics_clone.ticks_received.load(Ordering::Relaxed),
                metrics_clone.commands_sent.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    let ticks = metrics.ticks_received.load(Ordering::Relaxed);
    let elapsed = start.elapsed().as_secs_f64().max(1.0);
    let summary = Summary {
        clients: num_clients,
        duration_secs,
        frames_received: metrics.frames_received.load(Ordering::Relaxed),
        ticks_received: ticks,
        ticks_per_client_per_sec: ticks as f64 / f64::from(num_clients.max(1)) / elapsed,
        objectives_received: metrics.objectives_received.load(Ordering::Relaxed),
        winners_received: metrics.winners_received.load(Ordering::Relaxed),
        commands_sent: metrics.commands_sent.load(Ordering::Relaxed),
        bombs_sent: metrics.bombs_sent.load(Ordering::Relaxed),
        denied: metrics.denied.load(Ordering::Relaxed),
        errors: metrics.errors.load(Ordering::Relaxed),
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode summary: {}", e),
        }
        return;
    }

    println!();
    println!("=== Final Results ===");
    println!("Total frames received: {}", summary.frames_received);
    println!("Total TICK frames: {}", summary.ticks_received);
    println!(
        "TICK rate per bot: {:.1}/s",
        summary.ticks_per_client_per_sec
    );
    println!("NEWOBJ frames: {}", summary.objectives_received);
    println!("WINNER frames: {}", summary.winners_received);
    println!("Commands sent: {}", summary.commands_sent);
    println!("Bombs sent: {}", summary.bombs_sent);
    println!("Denied joins: {}", summary.denied);
    println!("Errors: {}", summary.errors);
}

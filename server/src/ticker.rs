//! Periodic `TICK` fan-out, running only while a round is active.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::player::Outbox;

/// One rendered `TICK` frame and who should receive it.
#[derive(Debug)]
pub struct Snapshot {
    pub frame: String,
    pub recipients: Vec<Outbox>,
}

/// Sent to the scheduler, which answers with the current snapshot.
pub type SnapshotRequest = oneshot::Sender<Snapshot>;

/// Handle on the running broadcaster task.
pub struct TickBroadcaster {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TickBroadcaster {
    pub fn spawn(period: Duration, requests: mpsc::Sender<SnapshotRequest>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(period, requests, stop_rx));
        Self { stop_tx, handle }
    }

    /// Raise the stop flag. The task sees it at its next period; the caller
    /// must keep answering snapshot requests until the returned handle resolves.
    pub fn stop(self) -> JoinHandle<()> {
        let _ = self.stop_tx.send(true);
        self.handle
    }
}

async fn run(
    period: Duration,
    requests: mpsc::Sender<SnapshotRequest>,
    stop_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    loop {
        interval.tick().await;
        if *stop_rx.borrow() {
            break;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if requests.send(reply_tx).await.is_err() {
            break;
        }
        let snapshot = match reply_rx.await {
            Ok(snapshot) => snapshot,
            Err(_) => break,
        };

        for outbox in &snapshot.recipients {
            outbox.deliver(snapshot.frame.clone());
        }
        ticks += 1;
    }

    tracing::debug!(ticks, "Tick broadcaster stopped");
}

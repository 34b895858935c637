use arena_shared::protocol::ServerMsg;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::objects::Pod;

/// Frames a connection may have queued before new ones are dropped.
pub const OUTBOX_CAPACITY: usize = 256;

/// Sending half of one connection's writer queue.
///
/// The connection task owns the socket; the session only ever holds this
/// handle, so a dropped connection shows up as a failed delivery. The queue
/// is bounded: a client that stops reading loses frames instead of growing
/// the server's memory.
#[derive(Debug, Clone)]
pub struct Outbox {
    player: String,
    tx: mpsc::Sender<String>,
}

impl Outbox {
    pub fn new(player: &str, tx: mpsc::Sender<String>) -> Self {
        Self {
            player: player.to_string(),
            tx,
        }
    }

    /// Create an outbox together with the receiver its writer task drains.
    pub fn channel(player: &str) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        (Self::new(player, tx), rx)
    }

    /// Queue one frame without waiting. A full queue or a closed connection
    /// is logged and the frame skipped.
    pub fn deliver(&self, frame: String) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(player = %self.player, "Outbox full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(player = %self.player, "Connection gone, frame dropped");
                false
            }
        }
    }

    pub fn send(&self, msg: &ServerMsg) -> bool {
        self.deliver(msg.to_string())
    }
}

/// A connected participant of the session.
#[derive(Debug)]
pub struct Player {
    pub name: String,
    pub outbox: Outbox,
    pub pod: Pod,
    /// Bombs left to place this round
    pub bombs: u32,
}

impl Player {
    pub fn new(name: &str, outbox: Outbox, pod: Pod, bombs: u32) -> Self {
        Self {
            name: name.to_string(),
            outbox,
            pod,
            bombs,
        }
    }

    /// Spend one bomb. Returns false when the inventory is empty.
    pub fn take_bomb(&mut self) -> bool {
        if self.bombs == 0 {
            return false;
        }
        self.bombs -= 1;
        true
    }
}

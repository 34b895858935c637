//! One TCP connection per player: handshake, frame dispatch, outbound writer.

use std::time::Duration;

use arena_shared::protocol::{ClientMsg, ServerMsg};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{ConnectionError, SchedulerError};
use crate::player::Outbox;
use crate::scheduler::SchedulerHandle;

/// How long a leaving client's writer may keep flushing queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Newline-delimited reader that skips lines which are not UTF-8.
struct LineReader {
    inner: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
}

impl LineReader {
    fn new(read_half: OwnedReadHalf) -> Self {
        Self {
            inner: BufReader::new(read_half),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            self.buf.clear();
            if self.inner.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            match std::str::from_utf8(&self.buf) {
                Ok(line) => return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
                Err(e) => tracing::debug!("Line is not UTF-8, ignored: {}", e),
            }
        }
    }
}

/// Accept connections forever, one task each.
pub async fn serve(listener: TcpListener, scheduler: SchedulerHandle) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer, "Connection accepted");
            if let Err(e) = handle_connection(stream, scheduler).await {
                tracing::warn!(%peer, "Connection ended: {}", e);
            }
        });
    }
}

/// Drive one client from handshake to disconnect.
///
/// The first `NAME`/`CONNECT` frame registers the player. A refused join
/// (pseudo taken or malformed, session full) gets `DENIED/` and the socket
/// is closed. Afterwards every frame is forwarded to the scheduler until
/// `EXIT` or end of stream, and the player is removed either way.
pub async fn handle_connection(
    stream: TcpStream,
    scheduler: SchedulerHandle,
) -> Result<(), ConnectionError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = LineReader::new(read_half);

    let Some((name, pending)) = handshake(&mut lines).await? else {
        return Ok(());
    };

    let (outbox, mut rx) = Outbox::channel(&name);
    match scheduler.join(&name, outbox).await {
        Ok(()) => {}
        Err(
            e @ (SchedulerError::NameTaken(_)
            | SchedulerError::InvalidName(_)
            | SchedulerError::SessionFull(_)),
        ) => {
            tracing::info!(player = %name, "Join refused: {}", e);
            write_half
                .write_all(ServerMsg::Denied.to_string().as_bytes())
                .await?;
            write_half.shutdown().await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    // Frames go out verbatim, no terminator
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let result = dispatch(&name, pending, &mut lines, &scheduler).await;

    // Once the scheduler drops the player's outbox the writer flushes what
    // is left and ends on its own.
    let _ = scheduler.leave(&name).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        tracing::debug!(player = %name, "Writer still busy after leave, aborted");
        writer.abort();
    }
    tracing::debug!(player = %name, "Connection closed");
    result
}

/// Read until a join frame shows up. Returns the pseudo and whatever frames
/// followed it on the same line, or `None` if the client left first.
async fn handshake(
    lines: &mut LineReader,
) -> Result<Option<(String, Vec<ClientMsg>)>, ConnectionError> {
    while let Some(line) = lines.next_line().await? {
        let mut msgs = ClientMsg::parse_line(&line).into_iter();
        while let Some(msg) = msgs.next() {
            match msg {
                ClientMsg::Join { name } => return Ok(Some((name, msgs.collect()))),
                ClientMsg::Exit => return Ok(None),
                other => tracing::debug!(?other, "Frame before join ignored"),
            }
        }
    }
    Ok(None)
}

async fn dispatch(
    name: &str,
    pending: Vec<ClientMsg>,
    lines: &mut LineReader,
    scheduler: &SchedulerHandle,
) -> Result<(), ConnectionError> {
    for msg in pending {
        if !forward(name, msg, scheduler).await? {
            return Ok(());
        }
    }

    while let Some(line) = lines.next_line().await? {
        let msgs = ClientMsg::parse_line(&line);
        if msgs.is_empty() {
            tracing::debug!(player = %name, %line, "Unrecognised line ignored");
        }
        for msg in msgs {
            if !forward(name, msg, scheduler).await? {
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Hand one frame to the scheduler. Returns false once the client exits.
async fn forward(
    name: &str,
    msg: ClientMsg,
    scheduler: &SchedulerHandle,
) -> Result<bool, SchedulerError> {
    match msg {
        ClientMsg::Join { .. } => tracing::debug!(player = %name, "Repeated join ignored"),
        ClientMsg::Command { angle, thrust } => scheduler.command(name, angle, thrust).await?,
        ClientMsg::PutBomb { x, y } => scheduler.put_bomb(name, x, y).await?,
        ClientMsg::Exit => return Ok(false),
        ClientMsg::PublicChat { text } => scheduler.chat_public(name, &text).await?,
        ClientMsg::PrivateChat { to, text } => scheduler.chat_private(name, &to, &text).await?,
    }
    Ok(true)
}

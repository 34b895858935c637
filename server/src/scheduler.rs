//! The session authority.
//!
//! One task owns the [`Session`] and applies every join, leave, command,
//! bomb and chat operation in the order it receives them, so no two
//! operations ever touch the session at the same time. Connections talk to
//! it through a cloneable [`SchedulerHandle`]; the tick broadcaster asks it
//! for snapshots over a separate channel.
//!
//! Round lifecycle: `Empty -> Waiting -> Active -> Ending -> Waiting | Empty`.
//! While `Ending` the task stops reading client operations (they stay queued)
//! but keeps answering snapshot requests until the broadcaster has exited,
//! then resets the session.

use std::mem;
use std::sync::Arc;

use arena_shared::protocol::{ServerMsg, WelcomePhase};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::error::SchedulerError;
use crate::player::Outbox;
use crate::session::Session;
use crate::ticker::{Snapshot, SnapshotRequest, TickBroadcaster};

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No players connected
    Empty,
    /// Start barrier running
    Waiting,
    /// Commands processed, ticks broadcast
    Active,
    /// Round over, broadcaster being torn down
    Ending,
}

enum Round {
    Empty,
    Waiting { start_at: Instant },
    Active { ticker: TickBroadcaster },
    Ending { ticker: TickBroadcaster },
}

impl Round {
    fn phase(&self) -> Phase {
        match self {
            Round::Empty => Phase::Empty,
            Round::Waiting { .. } => Phase::Waiting,
            Round::Active { .. } => Phase::Active,
            Round::Ending { .. } => Phase::Ending,
        }
    }

    fn start_at(&self) -> Option<Instant> {
        match self {
            Round::Waiting { start_at } => Some(*start_at),
            _ => None,
        }
    }
}

/// Per-player line of a [`SessionStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub name: String,
    pub score: u32,
    pub bombs: u32,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: Phase,
    pub players: Vec<PlayerStatus>,
    pub bombs_in_play: usize,
    pub obstacles: usize,
}

/// Operations from connections to the scheduler task
enum Command {
    Join {
        name: String,
        outbox: Outbox,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Leave {
        name: String,
    },
    Steer {
        name: String,
        angle: f32,
        thrust: u32,
    },
    PutBomb {
        name: String,
        x: f32,
        y: f32,
    },
    ChatPublic {
        from: String,
        text: String,
    },
    ChatPrivate {
        from: String,
        to: String,
        text: String,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Cloneable front door to the scheduler task.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    async fn send(&self, cmd: Command) -> Result<(), SchedulerError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SchedulerError::Unavailable)
    }

    /// Register `name`. Frames for the player are pushed into `outbox`.
    pub async fn join(&self, name: &str, outbox: Outbox) -> Result<(), SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Join {
            name: name.to_string(),
            outbox,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SchedulerError::Unavailable)?
    }

    pub async fn leave(&self, name: &str) -> Result<(), SchedulerError> {
        self.send(Command::Leave {
            name: name.to_string(),
        })
        .await
    }

    pub async fn command(&self, name: &str, angle: f32, thrust: u32) -> Result<(), SchedulerError> {
        self.send(Command::Steer {
            name: name.to_string(),
            angle,
            thrust,
        })
        .await
    }

    pub async fn put_bomb(&self, name: &str, x: f32, y: f32) -> Result<(), SchedulerError> {
        self.send(Command::PutBomb {
            name: name.to_string(),
            x,
            y,
        })
        .await
    }

    pub async fn chat_public(&self, from: &str, text: &str) -> Result<(), SchedulerError> {
        self.send(Command::ChatPublic {
            from: from.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn chat_private(&self, from: &str, to: &str, text: &str) -> Result<(), SchedulerError> {
        self.send(Command::ChatPrivate {
            from: from.to_string(),
            to: to.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn status(&self) -> Result<SessionStatus, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| SchedulerError::Unavailable)
    }
}

/// Start the scheduler task.
pub fn spawn(config: &ServerConfig) -> (SchedulerHandle, JoinHandle<()>) {
    let (tx, commands) = mpsc::channel(config.command_queue);
    let (scheduler, snapshots) = Scheduler::new(config);
    let task = tokio::spawn(scheduler.run(commands, snapshots));
    (SchedulerHandle { tx }, task)
}

/// A pseudo must be non-empty and free of the protocol's separators.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| matches!(c, '/' | ':' | '|'))
}

async fn start_barrier(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Owner of the session. Runs inside the task started by [`spawn`].
pub struct Scheduler {
    session: Session,
    round: Round,
    snapshot_tx: mpsc::Sender<SnapshotRequest>,
    max_players: usize,
}

impl Scheduler {
    /// Build a scheduler and the receiver its ticker requests arrive on.
    pub fn new(config: &ServerConfig) -> (Self, mpsc::Receiver<SnapshotRequest>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        let session = Session::new(Arc::new(config.game.clone()), config.rng_seed);
        let scheduler = Self {
            session,
            round: Round::Empty,
            snapshot_tx,
            max_players: config.max_players,
        };
        (scheduler, snapshot_rx)
    }

    pub fn phase(&self) -> Phase {
        self.round.phase()
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut snapshots: mpsc::Receiver<SnapshotRequest>,
    ) {
        tracing::info!("Scheduler started");

        loop {
            let deadline = self.round.start_at();
            let accepting = self.phase() != Phase::Ending;

            tokio::select! {
                Some(reply) = snapshots.recv() => {
                    let _ = reply.send(self.snapshot());
                }

                _ = start_barrier(deadline) => {
                    self.start_round();
                }

                cmd = commands.recv(), if accepting => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
            }

            if self.phase() == Phase::Ending {
                self.finish_round(&mut snapshots).await;
            }
        }

        if let Round::Active { ticker } | Round::Ending { ticker } =
            mem::replace(&mut self.round, Round::Empty)
        {
            let handle = ticker.stop();
            drop(snapshots);
            let _ = handle.await;
        }
        tracing::info!("Scheduler stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Join {
                name,
                outbox,
                reply,
            } => {
                let _ = reply.send(self.join(&name, outbox));
            }
            Command::Leave { name } => self.leave(&name),
            Command::Steer {
                name,
                angle,
                thrust,
            } => self.command(&name, angle, thrust),
            Command::PutBomb { name, x, y } => self.put_bomb(&name, x, y),
            Command::ChatPublic { from, text } => self.chat_public(&from, &text),
            Command::ChatPrivate { from, to, text } => self.chat_private(&from, &to, &text),
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn welcome(&self, phase: WelcomePhase) -> ServerMsg {
        ServerMsg::Welcome {
            phase,
            scores: self.session.scores(),
            objective: self.session.objective_coord(),
            bomb_counts: self.session.bomb_counts(),
        }
    }

    fn round_snapshot(&self) -> ServerMsg {
        ServerMsg::Session {
            coords: self.session.coords(),
            objective: self.session.objective_coord(),
            obstacles: self.session.obstacle_coords(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            frame: ServerMsg::Tick {
                vcoords: self.session.vcoords(),
            }
            .to_string(),
            recipients: self.session.outboxes(),
        }
    }

    pub fn join(&mut self, name: &str, outbox: Outbox) -> Result<(), SchedulerError> {
        if !is_valid_name(name) {
            return Err(SchedulerError::InvalidName(name.to_string()));
        }
        if self.session.contains(name) {
            return Err(SchedulerError::NameTaken(name.to_string()));
        }
        if self.session.player_count() >= self.max_players {
            return Err(SchedulerError::SessionFull(self.max_players));
        }

        self.session.broadcast(&ServerMsg::NewPlayer {
            name: name.to_string(),
        });
        self.session.add_player(name, outbox);

        if self.phase() == Phase::Active {
            self.session.send_to(name, &self.welcome(WelcomePhase::Play));
            self.session.send_to(name, &self.round_snapshot());
        } else {
            self.session.send_to(name, &self.welcome(WelcomePhase::Wait));
        }

        if let Round::Empty = self.round {
            let start_at = Instant::now() + self.session.config().waiting_time();
            self.round = Round::Waiting { start_at };
            tracing::info!(
                wait_ms = self.session.config().waiting_time_ms,
                "First player in, start barrier armed"
            );
        }

        tracing::info!(
            player = %name,
            players = self.session.player_count(),
            phase = ?self.phase(),
            "Player joined"
        );
        Ok(())
    }

    pub fn leave(&mut self, name: &str) {
        if self.session.remove_player(name).is_none() {
            return;
        }
        self.session.broadcast(&ServerMsg::PlayerLeft {
            name: name.to_string(),
        });
        tracing::info!(player = %name, players = self.session.player_count(), "Player left");

        if !self.session.is_empty() {
            return;
        }
        match mem::replace(&mut self.round, Round::Empty) {
            Round::Active { ticker } => {
                tracing::info!("Last player left, ending round");
                self.round = Round::Ending { ticker };
            }
            Round::Waiting { .. } => {
                self.session.reset();
                tracing::info!("Last player left before the round started");
            }
            other => self.round = other,
        }
    }

    pub fn command(&mut self, name: &str, angle: f32, thrust: u32) {
        if self.phase() != Phase::Active {
            tracing::debug!(player = %name, phase = ?self.phase(), "Command outside a round ignored");
            return;
        }
        let Some(report) = self.session.apply_command(name, angle, thrust) else {
            return;
        };
        if report.won {
            tracing::info!(winner = %name, scores = %self.session.scores(), "Round won");
            if let Round::Active { ticker } = mem::replace(&mut self.round, Round::Empty) {
                self.round = Round::Ending { ticker };
            }
        }
    }

    pub fn put_bomb(&mut self, name: &str, x: f32, y: f32) {
        if self.phase() != Phase::Active {
            tracing::debug!(player = %name, "Bomb outside a round ignored");
            return;
        }
        match self.session.place_bomb(name, x, y) {
            Some(id) => tracing::debug!(player = %name, bomb = id, "Bomb placed"),
            None => tracing::debug!(player = %name, "No bomb left"),
        }
    }

    pub fn chat_public(&mut self, from: &str, text: &str) {
        self.session.broadcast_except(
            from,
            &ServerMsg::PublicChat {
                text: text.to_string(),
            },
        );
    }

    pub fn chat_private(&mut self, from: &str, to: &str, text: &str) {
        let msg = ServerMsg::PrivateChat {
            text: text.to_string(),
            from: from.to_string(),
        };
        if !self.session.send_to(to, &msg) {
            tracing::debug!(from = %from, to = %to, "Private message to unknown player dropped");
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase(),
            players: self
                .session
                .players()
                .map(|p| PlayerStatus {
                    name: p.name.clone(),
                    score: self.session.score(&p.name).unwrap_or(0),
                    bombs: p.bombs,
                })
                .collect(),
            bombs_in_play: self.session.bombs().len(),
            obstacles: self.session.obstacles().len(),
        }
    }

    /// Start barrier elapsed: lay out obstacles, tell everyone, start ticking.
    pub fn start_round(&mut self) {
        self.session.place_obstacles();
        self.session.start();
        self.session.broadcast(&self.round_snapshot());

        let ticker = TickBroadcaster::spawn(
            self.session.config().tick_period(),
            self.snapshot_tx.clone(),
        );
        self.round = Round::Active { ticker };
        tracing::info!(players = self.session.player_count(), "Round started");
    }

    /// Stop the broadcaster, wait for it while still serving its snapshot
    /// requests, then reset the session for the next round.
    pub async fn finish_round(&mut self, snapshots: &mut mpsc::Receiver<SnapshotRequest>) {
        let ticker = match mem::replace(&mut self.round, Round::Empty) {
            Round::Ending { ticker } => ticker,
            other => {
                self.round = other;
                return;
            }
        };

        let mut handle = ticker.stop();
        loop {
            tokio::select! {
                joined = &mut handle => {
                    if let Err(e) = joined {
                        tracing::error!("Tick broadcaster failed: {}", e);
                    }
                    break;
                }
                Some(reply) = snapshots.recv() => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        self.session.reset();

        if self.session.is_empty() {
            tracing::info!("Session reset, waiting for players");
            return;
        }

        self.session.broadcast(&self.welcome(WelcomePhase::Wait));
        let start_at = Instant::now() + self.session.config().waiting_time();
        self.round = Round::Waiting { start_at };
        tracing::info!(
            players = self.session.player_count(),
            "Session reset, next round armed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::config::GameConfig;
    use arena_shared::vec2::vec2;
    use std::time::Duration;

    fn test_config(game: GameConfig) -> ServerConfig {
        ServerConfig {
            rng_seed: Some(7),
            game,
            ..Default::default()
        }
    }

    fn test_scheduler() -> (Scheduler, mpsc::Receiver<SnapshotRequest>) {
        Scheduler::new(&test_config(GameConfig::default()))
    }

    fn join(scheduler: &mut Scheduler, name: &str) -> mpsc::Receiver<String> {
        let (outbox, rx) = Outbox::channel(name);
        scheduler.join(name, outbox).unwrap();
        rx
    }

    /// Frames received so far, without the periodic `TICK`s.
    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if !frame.starts_with("TICK/") {
                frames.push(frame);
            }
        }
        frames
    }

    #[tokio::test]
    async fn first_join_arms_start_barrier() {
        let (mut scheduler, _snapshots) = test_scheduler();
        assert_eq!(scheduler.phase(), Phase::Empty);

        let mut alice = join(&mut scheduler, "alice");

        assert_eq!(scheduler.phase(), Phase::Waiting);
        let objective = scheduler.session.objective_coord();
        assert_eq!(
            drain(&mut alice),
            vec![format!("WELCOME/wait/alice:0/{}/alice:B3/", objective)]
        );
    }

    #[tokio::test]
    async fn existing_players_hear_about_newcomers() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let mut alice = join(&mut scheduler, "alice");
        drain(&mut alice);

        let _bob = join(&mut scheduler, "bob");

        assert_eq!(drain(&mut alice), vec!["NEWPLAYER/bob/"]);
    }

    #[tokio::test]
    async fn taken_and_malformed_names_are_denied() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let _alice = join(&mut scheduler, "alice");

        let (outbox, _rx) = Outbox::channel("alice");
        assert!(matches!(
            scheduler.join("alice", outbox),
            Err(SchedulerError::NameTaken(_))
        ));
        for bad in ["", "a/b", "a:b", "a|b"] {
            let (outbox, _rx) = Outbox::channel(bad);
            assert!(matches!(
                scheduler.join(bad, outbox),
                Err(SchedulerError::InvalidName(_))
            ));
        }
        assert_eq!(scheduler.session.player_count(), 1);
    }

    #[tokio::test]
    async fn join_beyond_player_cap_is_refused() {
        let config = ServerConfig {
            max_players: 2,
            ..test_config(GameConfig::default())
        };
        let (mut scheduler, _snapshots) = Scheduler::new(&config);
        let _alice = join(&mut scheduler, "alice");
        let mut bob = join(&mut scheduler, "bob");
        drain(&mut bob);

        let (outbox, _rx) = Outbox::channel("carol");
        assert!(matches!(
            scheduler.join("carol", outbox),
            Err(SchedulerError::SessionFull(2))
        ));
        assert_eq!(scheduler.session.player_count(), 2);
        assert!(drain(&mut bob).is_empty());

        scheduler.leave("alice");
        let (outbox, _rx) = Outbox::channel("carol");
        assert!(scheduler.join("carol", outbox).is_ok());
    }

    #[tokio::test]
    async fn round_start_sends_session_to_everyone() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let mut alice = join(&mut scheduler, "alice");
        let mut bob = join(&mut scheduler, "bob");
        drain(&mut alice);
        drain(&mut bob);

        scheduler.start_round();

        assert_eq!(scheduler.phase(), Phase::Active);
        assert_eq!(scheduler.session.obstacles().len(), 3);
        for rx in [&mut alice, &mut bob] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert!(frames[0].starts_with("SESSION/"));
            assert!(frames[0].contains("obs0:"));
            assert!(frames[0].contains("obs2:"));
        }
    }

    #[tokio::test]
    async fn late_joiner_gets_play_welcome_and_session() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let _alice = join(&mut scheduler, "alice");
        scheduler.start_round();

        let mut carol = join(&mut scheduler, "carol");

        let frames = drain(&mut carol);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("WELCOME/play/"));
        assert!(frames[1].starts_with("SESSION/"));
    }

    #[tokio::test]
    async fn commands_and_bombs_ignored_while_waiting() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let _alice = join(&mut scheduler, "alice");
        let before = scheduler.session.player("alice").unwrap().pod.clone();

        scheduler.command("alice", 1.0, 5);
        scheduler.put_bomb("alice", 0.0, 0.0);

        assert_eq!(scheduler.session.player("alice").unwrap().pod, before);
        assert!(scheduler.session.bombs().is_empty());
        assert_eq!(scheduler.session.player("alice").unwrap().bombs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn third_hit_wins_with_cap_three() {
        let (mut scheduler, mut snapshots) = Scheduler::new(&test_config(GameConfig {
            win_cap: 3,
            ..Default::default()
        }));
        let mut alice = join(&mut scheduler, "alice");
        scheduler.start_round();
        scheduler.session.clear_obstacles();
        drain(&mut alice);

        for hit in 1..=3 {
            scheduler.session.park("alice", vec2(0.0, 0.0));
            scheduler.session.move_objective(vec2(0.0, 0.0));
            scheduler.command("alice", 0.0, 0);

            let frames = drain(&mut alice);
            assert_eq!(frames.len(), 1);
            if hit < 3 {
                assert!(frames[0].starts_with("NEWOBJ/"), "hit {}: {}", hit, frames[0]);
                assert!(frames[0].ends_with(&format!("/alice:{}/", hit)));
                assert_eq!(scheduler.phase(), Phase::Active);
            } else {
                assert_eq!(frames[0], "WINNER/alice:3/");
                assert_eq!(scheduler.phase(), Phase::Ending);
            }
        }

        scheduler.finish_round(&mut snapshots).await;

        assert_eq!(scheduler.phase(), Phase::Waiting);
        let objective = scheduler.session.objective_coord();
        assert_eq!(
            drain(&mut alice),
            vec![format!("WELCOME/wait/alice:0/{}/alice:B3/", objective)]
        );
        assert!(scheduler.session.obstacles().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn last_leave_mid_round_resets_to_empty() {
        let (mut scheduler, mut snapshots) = test_scheduler();
        let _alice = join(&mut scheduler, "alice");
        scheduler.start_round();
        scheduler.put_bomb("alice", 10.0, 10.0);
        assert_eq!(scheduler.session.bombs().len(), 1);

        scheduler.leave("alice");
        assert_eq!(scheduler.phase(), Phase::Ending);

        scheduler.finish_round(&mut snapshots).await;

        let status = scheduler.status();
        assert_eq!(status.phase, Phase::Empty);
        assert!(status.players.is_empty());
        assert_eq!(status.bombs_in_play, 0);
        assert_eq!(status.obstacles, 0);
        assert!(!scheduler.session.is_active());
    }

    #[tokio::test]
    async fn leave_while_waiting_returns_to_empty() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let _alice = join(&mut scheduler, "alice");
        let mut bob = join(&mut scheduler, "bob");
        drain(&mut bob);

        scheduler.leave("alice");
        assert_eq!(drain(&mut bob), vec!["PLAYERLEFT/alice/"]);
        assert_eq!(scheduler.phase(), Phase::Waiting);

        scheduler.leave("bob");
        assert_eq!(scheduler.phase(), Phase::Empty);
    }

    #[tokio::test]
    async fn unknown_leave_is_noop() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let _alice = join(&mut scheduler, "alice");
        scheduler.leave("ghost");
        assert_eq!(scheduler.session.player_count(), 1);
        assert_eq!(scheduler.phase(), Phase::Waiting);
    }

    #[tokio::test]
    async fn chat_relays_in_any_phase() {
        let (mut scheduler, _snapshots) = test_scheduler();
        let mut alice = join(&mut scheduler, "alice");
        let mut bob = join(&mut scheduler, "bob");
        let mut carol = join(&mut scheduler, "carol");
        drain(&mut alice);
        drain(&mut bob);
        drain(&mut carol);

        scheduler.chat_public("alice", "hello");
        assert!(drain(&mut alice).is_empty());
        assert_eq!(drain(&mut bob), vec!["RECEPTION/hello/"]);
        assert_eq!(drain(&mut carol), vec!["RECEPTION/hello/"]);

        scheduler.chat_private("alice", "carol", "psst");
        assert!(drain(&mut bob).is_empty());
        assert_eq!(drain(&mut carol), vec!["PRECEPTION/psst/alice/"]);

        scheduler.chat_private("alice", "nobody", "lost");
        assert!(drain(&mut alice).is_empty());
        assert!(drain(&mut bob).is_empty());
        assert!(drain(&mut carol).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_bomb_placements_are_all_counted() {
        let config = test_config(GameConfig {
            waiting_time_ms: 10,
            starting_bombs: 25,
            ..Default::default()
        });
        let (handle, _task) = spawn(&config);

        let names = ["p0", "p1", "p2", "p3"];
        let mut receivers = Vec::new();
        for name in names {
            let (outbox, rx) = Outbox::channel(name);
            handle.join(name, outbox).await.unwrap();
            receivers.push(rx);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.status().await.unwrap().phase, Phase::Active);

        let mut tasks = Vec::new();
        for name in names {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..30 {
                    handle.put_bomb(name, i as f32, 0.0).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let status = handle.status().await.unwrap();
        assert_eq!(status.bombs_in_play, 100);
        assert!(status.players.iter().all(|p| p.bombs == 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commands_lose_no_score_or_bomb_hit() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;
        use std::collections::HashSet;

        // Cramped arena so pods keep running into the objective and bombs
        let config = test_config(GameConfig {
            arena_half_width: 80.0,
            arena_half_height: 80.0,
            waiting_time_ms: 10,
            thrust: 2.0,
            win_cap: 10_000,
            obstacle_count: 0,
            starting_bombs: 10,
            ..Default::default()
        });
        let (handle, _task) = spawn(&config);

        // The watcher never moves or drops bombs, so it sees every NEWOBJ,
        // PUT and HIT notice.
        let (outbox, mut watcher_rx) = Outbox::channel("watcher");
        handle.join("watcher", outbox).await.unwrap();
        let watcher = tokio::spawn(async move {
            let mut frames = Vec::new();
            while let Some(frame) = watcher_rx.recv().await {
                frames.push(frame);
            }
            frames
        });

        let names = ["p0", "p1", "p2", "p3"];
        for name in names {
            let (outbox, mut rx) = Outbox::channel(name);
            handle.join(name, outbox).await.unwrap();
            tokio::spawn(async move { while rx.recv().await.is_some() {} });
        }
        while handle.status().await.unwrap().phase != Phase::Active {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut tasks = Vec::new();
        for (seed, name) in names.into_iter().enumerate() {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
                for _ in 0..400 {
                    if rng.gen_bool(0.05) {
                        let x = rng.gen_range(-80.0..80.0);
                        let y = rng.gen_range(-80.0..80.0);
                        handle.put_bomb(name, x, y).await.unwrap();
                    } else {
                        let angle = rng.gen_range(-0.5..0.5);
                        let thrust = rng.gen_range(0..=1);
                        handle.command(name, angle, thrust).await.unwrap();
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let status = handle.status().await.unwrap();
        handle.leave("watcher").await.unwrap();
        let frames = watcher.await.unwrap();

        let total_score: u32 = status.players.iter().map(|p| p.score).sum();
        let objectives = frames.iter().filter(|f| f.starts_with("NEWOBJ/")).count();
        assert_eq!(total_score as usize, objectives);
        assert!(!frames.iter().any(|f| f.starts_with("WINNER/")));

        let placed = frames.iter().filter(|f| f.starts_with("PUT/")).count();
        let spent: u32 = status
            .players
            .iter()
            .filter(|p| p.name != "watcher")
            .map(|p| 10 - p.bombs)
            .sum();
        assert_eq!(placed, spent as usize);

        let hit_ids: Vec<u32> = frames
            .iter()
            .filter(|f| f.starts_with("HIT/"))
            .filter_map(|f| f.split('/').nth(2))
            .filter_map(|bomb| bomb.strip_prefix("obs"))
            .filter_map(|rest| rest.split(':').next())
            .map(|id| id.parse().unwrap())
            .collect();
        let unique: HashSet<u32> = hit_ids.iter().copied().collect();
        assert_eq!(unique.len(), hit_ids.len(), "a bomb was removed twice");
        assert_eq!(placed, hit_ids.len() + status.bombs_in_play);
    }

    #[tokio::test(start_paused = true)]
    async fn join_during_teardown_waits_for_reset() {
        let config = test_config(GameConfig {
            waiting_time_ms: 10,
            ..Default::default()
        });
        let (handle, _task) = spawn(&config);

        let (outbox, _alice) = Outbox::channel("alice");
        handle.join("alice", outbox).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.put_bomb("alice", 0.0, 0.0).await.unwrap();
        handle.leave("alice").await.unwrap();

        let (outbox, mut bob) = Outbox::channel("bob");
        handle.join("bob", outbox).await.unwrap();

        let status = handle.status().await.unwrap();
        assert_eq!(status.phase, Phase::Waiting);
        assert_eq!(status.bombs_in_play, 0);
        assert_eq!(status.obstacles, 0);
        assert_eq!(status.players.len(), 1);
        let frames = drain(&mut bob);
        assert!(frames[0].starts_with("WELCOME/wait/bob:0/"));
    }

    #[tokio::test]
    async fn handle_reports_unavailable_after_shutdown() {
        let (handle, task) = spawn(&test_config(GameConfig::default()));
        task.abort();
        let _ = task.await;

        assert!(matches!(
            handle.status().await,
            Err(SchedulerError::Unavailable)
        ));
        let (outbox, _rx) = Outbox::channel("alice");
        assert!(matches!(
            handle.join("alice", outbox).await,
            Err(SchedulerError::Unavailable)
        ));
    }

    #[test]
    fn name_rules() {
        assert!(is_valid_name("alice"));
        assert!(is_valid_name("bob 2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("x/y"));
        assert!(!is_valid_name("x:y"));
        assert!(!is_valid_name("x|y"));
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use arena_shared::config::GameConfig;
use arena_shared::protocol::{self, ServerMsg};
use arena_shared::vec2::{vec2, Vec2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::objects::{Arena, Body, Objective, Obstacle, Pod};
use crate::physics::{self, Separation};
use crate::player::{Outbox, Player};

/// Resampling bound for spawn placement. `ServerConfig::validate` keeps
/// obstacles, the objective and up to `max_players` pods within half the
/// arena, and the scheduler refuses joins beyond that cap, so this is never
/// reached in practice.
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 10_000;

/// What the mover ran into during one command, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    None,
    Pod(String),
    Obstacle(u32),
    Bomb(u32),
}

/// Result of applying one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub collision: Collision,
    /// The mover reached the objective
    pub scored: bool,
    /// That hit brought the mover to the win threshold
    pub won: bool,
}

/// The single shared game state: players, scores, obstacles, bombs, objective.
///
/// Only the scheduler task holds a `Session`; nothing here is synchronised.
pub struct Session {
    config: Arc<GameConfig>,
    arena: Arena,
    rng: ChaCha8Rng,
    players: BTreeMap<String, Player>,
    /// Same key set as `players`
    scores: BTreeMap<String, u32>,
    objective: Objective,
    obstacles: Vec<Obstacle>,
    bombs: Vec<Obstacle>,
    active: bool,
    next_pod_id: u32,
    /// Bombs placed this round, source of bomb ids
    bombs_placed: u32,
}

impl Session {
    /// Empty session. `seed` makes placement reproducible; `None` draws from OS entropy.
    pub fn new(config: Arc<GameConfig>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let arena = Arena::from_config(&config);
        let objective = Objective::new(Vec2::ZERO, config.objective_side);

        let mut session = Self {
            config,
            arena,
            rng,
            players: BTreeMap::new(),
            scores: BTreeMap::new(),
            objective,
            obstacles: Vec::new(),
            bombs: Vec::new(),
            active: false,
            next_pod_id: 1,
            bombs_placed: 0,
        };
        session.regenerate_objective();
        session
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    // === Membership ===

    /// Register a player with a freshly placed pod and a full bomb inventory.
    pub fn add_player(&mut self, name: &str, outbox: Outbox) {
        let pod = self.spawn_pod(None);
        let player = Player::new(name, outbox, pod, self.config.starting_bombs);
        self.players.insert(name.to_string(), player);
        self.scores.insert(name.to_string(), 0);
    }

    pub fn remove_player(&mut self, name: &str) -> Option<Player> {
        self.scores.remove(name);
        self.players.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn score(&self, name: &str) -> Option<u32> {
        self.scores.get(name).copied()
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn bombs(&self) -> &[Obstacle] {
        &self.bombs
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    // === Lifecycle ===

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Prepare for the next round while keeping everyone connected: scores
    /// zeroed, pods respawned with full inventories, obstacles and bombs
    /// cleared, objective moved, counters reset.
    pub fn reset(&mut self) {
        for score in self.scores.values_mut() {
            *score = 0;
        }
        self.obstacles.clear();
        self.bombs.clear();
        self.bombs_placed = 0;
        self.next_pod_id = 1;

        let names: Vec<String> = self.players.keys().cloned().collect();
        for name in &names {
            let pod = self.spawn_pod(Some(name));
            if let Some(player) = self.players.get_mut(name) {
                player.pod = pod;
                player.bombs = self.config.starting_bombs;
            }
        }

        self.regenerate_objective();
        self.active = false;
    }

    // === Placement ===

    /// True when `body` touches no pod (other than `skip_player`'s), no
    /// obstacle and, unless `skip_objective`, not the objective.
    fn is_free(&self, body: &Body, skip_player: Option<&str>, skip_objective: bool) -> bool {
        let hits_pod = self
            .players
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != skip_player)
            .any(|(_, p)| p.pod.body.overlaps(body));
        let hits_obstacle = self.obstacles.iter().any(|o| o.body.overlaps(body));
        let hits_objective = !skip_objective && self.objective.body.overlaps(body);
        !(hits_pod || hits_obstacle || hits_objective)
    }

    /// Sample random positions until one is free.
    fn place(&mut self, side: f32, skip_player: Option<&str>, skip_objective: bool) -> Vec2 {
        let arena = self.arena;
        let mut pos = arena.random_point(&mut self.rng);
        for _ in 1..MAX_PLACEMENT_ATTEMPTS {
            if self.is_free(&Body::new(pos, side), skip_player, skip_objective) {
                return pos;
            }
            pos = arena.random_point(&mut self.rng);
        }
        if !self.is_free(&Body::new(pos, side), skip_player, skip_objective) {
            tracing::warn!(
                attempts = MAX_PLACEMENT_ATTEMPTS,
                "No free spot found, placing over existing body"
            );
        }
        pos
    }

    fn spawn_pod(&mut self, replacing: Option<&str>) -> Pod {
        let side = self.config.pod_side;
        let pos = self.place(side, replacing, false);
        let id = self.next_pod_id;
        self.next_pod_id += 1;
        Pod::new(id, pos, side)
    }

    /// Lay out the round's fixed obstacles, ids `0..obstacle_count`.
    pub fn place_obstacles(&mut self) {
        self.obstacles.clear();
        let side = self.config.obstacle_side;
        for id in 0..self.config.obstacle_count {
            let pos = self.place(side, None, false);
            self.obstacles.push(Obstacle::asteroid(id, pos, side));
        }
    }

    /// Move the objective to a new free spot. Returns its encoded coordinate.
    pub fn regenerate_objective(&mut self) -> String {
        let side = self.config.objective_side;
        let pos = self.place(side, None, true);
        self.objective = Objective::new(pos, side);
        self.objective.coord()
    }

    // === Scoring ===

    /// +1 for `name`. Returns the new score (0 for an unknown player).
    pub fn add_score(&mut self, name: &str) -> u32 {
        match self.scores.get_mut(name) {
            Some(score) => {
                *score += 1;
                *score
            }
            None => 0,
        }
    }

    /// True exactly when the score equals the win threshold.
    pub fn has_won(&self, name: &str) -> bool {
        self.scores.get(name) == Some(&self.config.win_cap)
    }

    // === Player actions ===

    /// Apply one `NEWCOM` for `name` and resolve what it leads to.
    ///
    /// Pod-pod collision takes priority over an obstacle, which takes priority
    /// over a bomb. The objective is checked regardless. Hit, new-objective
    /// and winner notices are sent from here. Returns `None` for an unknown
    /// player.
    pub fn apply_command(&mut self, name: &str, angle: f32, thrust: u32) -> Option<CommandReport> {
        let arena = self.arena;
        let mut pod = self.players.get(name)?.pod.clone();
        pod.apply_command(angle, thrust, self.config.thrust, &arena);

        let mut collision = Collision::None;

        let struck = self
            .players
            .iter()
            .find(|(other, p)| other.as_str() != name && p.pod.body.overlaps(&pod.body))
            .map(|(other, _)| other.clone());

        if let Some(other_name) = struck {
            if let Some(other) = self.players.get_mut(&other_name) {
                physics::collide_equal_mass(&mut pod, &mut other.pod);
                if physics::separate(&mut pod, &other.pod.body, &arena) == Separation::Pushed {
                    tracing::debug!(player = %name, other = %other_name, "Pods pushed apart");
                }
            }
            tracing::debug!(player = %name, other = %other_name, "Pod collision");
            collision = Collision::Pod(other_name);
        } else if let Some(rock) = self.obstacles.iter().find(|o| o.body.overlaps(&pod.body)) {
            physics::deflect_infinite_mass(&mut pod, &rock.body);
            tracing::debug!(player = %name, obstacle = rock.id, "Obstacle collision");
            collision = Collision::Obstacle(rock.id);
        } else if let Some(index) = self
            .bombs
            .iter()
            .position(|b| b.owner() != Some(name) && b.body.overlaps(&pod.body))
        {
            let bomb = self.bombs.remove(index);
            tracing::debug!(player = %name, bomb = bomb.id, "Bomb hit");
            self.broadcast_except(
                name,
                &ServerMsg::BombHit {
                    name: name.to_string(),
                    bomb: bomb.coord(),
                },
            );
            collision = Collision::Bomb(bomb.id);
        }

        let reached_objective = self.objective.body.overlaps(&pod.body);
        if let Some(player) = self.players.get_mut(name) {
            player.pod = pod;
        }

        let mut report = CommandReport {
            collision,
            scored: false,
            won: false,
        };
        if !reached_objective {
            return Some(report);
        }

        let objective = self.regenerate_objective();
        let score = self.add_score(name);
        report.scored = true;
        tracing::debug!(player = %name, score, "Objective reached");

        if self.has_won(name) {
            report.won = true;
            self.active = false;
            self.broadcast(&ServerMsg::Winner {
                scores: self.scores(),
            });
        } else {
            self.broadcast(&ServerMsg::NewObjective {
                objective,
                scores: self.scores(),
            });
        }
        Some(report)
    }

    /// Drop a bomb for `name` at `(x, y)` if they have one left, and tell the
    /// other players. Returns the new bomb's id.
    pub fn place_bomb(&mut self, name: &str, x: f32, y: f32) -> Option<u32> {
        let player = self.players.get_mut(name)?;
        if !player.take_bomb() {
            return None;
        }

        let id = self.bombs_placed;
        self.bombs_placed += 1;
        let pos = vec2(x, y);
        self.bombs
            .push(Obstacle::bomb(id, name, pos, self.config.bomb_side));

        self.broadcast_except(
            name,
            &ServerMsg::BombPlaced {
                name: name.to_string(),
                pos,
            },
        );
        Some(id)
    }

    // === Encoders ===

    /// `name:score|...`
    pub fn scores(&self) -> String {
        protocol::join_pairs(self.scores.iter())
    }

    /// `name:X..Y..|...`
    pub fn coords(&self) -> String {
        protocol::join_pairs(
            self.players
                .iter()
                .map(|(name, p)| (name, protocol::coord(p.pod.body.pos))),
        )
    }

    /// `name:X..Y..VX..VY..T..|...`
    pub fn vcoords(&self) -> String {
        protocol::join_pairs(self.players.iter().map(|(name, p)| (name, p.pod.vcoord())))
    }

    /// `obs0:X..Y..|obs1:...`
    pub fn obstacle_coords(&self) -> String {
        self.obstacles
            .iter()
            .map(Obstacle::coord)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// `name:B<count>|...`
    pub fn bomb_counts(&self) -> String {
        protocol::join_pairs(
            self.players
                .iter()
                .map(|(name, p)| (name, format!("B{}", p.bombs))),
        )
    }

    pub fn objective_coord(&self) -> String {
        self.objective.coord()
    }

    // === Delivery ===

    pub fn broadcast(&self, msg: &ServerMsg) {
        let frame = msg.to_string();
        for player in self.players.values() {
            player.outbox.deliver(frame.clone());
        }
    }

    pub fn broadcast_except(&self, sender: &str, msg: &ServerMsg) {
        let frame = msg.to_string();
        for player in self.players.values().filter(|p| p.name != sender) {
            player.outbox.deliver(frame.clone());
        }
    }

    /// Deliver to one player. Returns false if no such player is connected.
    pub fn send_to(&self, name: &str, msg: &ServerMsg) -> bool {
        match self.players.get(name) {
            Some(player) => {
                player.outbox.send(msg);
                true
            }
            None => false,
        }
    }

    /// Every connected player's outbox, for snapshot fan-out.
    pub fn outboxes(&self) -> Vec<Outbox> {
        self.players.values().map(|p| p.outbox.clone()).collect()
    }
}

#[cfg(test)]
impl Session {
    /// Put a pod somewhere specific, at rest.
    pub(crate) fn park(&mut self, name: &str, pos: Vec2) {
        if let Some(player) = self.players.get_mut(name) {
            player.pod.body.pos = pos;
            player.pod.velocity = Vec2::ZERO;
        }
    }

    pub(crate) fn move_objective(&mut self, pos: Vec2) {
        self.objective = Objective::new(pos, self.config.objective_side);
    }

    pub(crate) fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }
}

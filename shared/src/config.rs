use std::time::Duration;

/// Game tuning constants shared by server and clients.
///
/// Field names on the wire (JSON) follow the historical `data.json` keys so
/// existing config files load unchanged. Every key is optional.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Half-width of the arena: x lives in `[-arena_half_width, arena_half_width]`
    #[serde(rename = "arena_l")]
    pub arena_half_width: f32,
    /// Half-height of the arena: y lives in `[-arena_half_height, arena_half_height]`
    #[serde(rename = "arena_h")]
    pub arena_half_height: f32,
    /// Snapshot broadcasts per second
    #[serde(rename = "server_tickrate")]
    pub tick_rate: u32,
    /// Start barrier duration in milliseconds
    #[serde(rename = "waiting_time")]
    pub waiting_time_ms: u64,
    /// Velocity added per thrust impulse
    #[serde(rename = "thrust_it")]
    pub thrust: f32,
    /// Score that wins the round
    pub win_cap: u32,
    pub pod_side: f32,
    /// Side of the objective
    #[serde(rename = "ball_side")]
    pub objective_side: f32,
    /// Side of a fixed obstacle
    #[serde(rename = "asteroid_side")]
    pub obstacle_side: f32,
    #[serde(rename = "nb_obstacle")]
    pub obstacle_count: u32,
    /// Bomb inventory handed to each player on spawn
    #[serde(rename = "nb_spirit_bombs")]
    pub starting_bombs: u32,
    #[serde(rename = "spirit_bomb_side")]
    pub bomb_side: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            arena_half_width: 400.0,
            arena_half_height: 300.0,
            tick_rate: 20,
            waiting_time_ms: 10_000,
            thrust: 1.0,
            win_cap: 5,
            pod_side: 20.0,
            objective_side: 20.0,
            obstacle_side: 60.0,
            obstacle_count: 3,
            starting_bombs: 3,
            bomb_side: 20.0,
        }
    }
}

impl GameConfig {
    /// Interval between two tick snapshots (`1000 / tick_rate` milliseconds).
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }

    /// How long the start barrier holds a round before it begins.
    pub fn waiting_time(&self) -> Duration {
        Duration::from_millis(self.waiting_time_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.arena_half_width.is_finite() || self.arena_half_width <= 0.0 {
            return Err("arena_l must be finite and > 0".to_string());
        }
        if !self.arena_half_height.is_finite() || self.arena_half_height <= 0.0 {
            return Err("arena_h must be finite and > 0".to_string());
        }
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err("server_tickrate must be in 1..=1000".to_string());
        }
        if !self.thrust.is_finite() || self.thrust < 0.0 {
            return Err("thrust_it must be finite and >= 0".to_string());
        }
        if self.win_cap == 0 {
            return Err("win_cap must be > 0".to_string());
        }
        for (name, side) in [
            ("pod_side", self.pod_side),
            ("ball_side", self.objective_side),
            ("asteroid_side", self.obstacle_side),
            ("spirit_bomb_side", self.bomb_side),
        ] {
            if !side.is_finite() || side <= 0.0 {
                return Err(format!("{} must be finite and > 0", name));
            }
        }

        // Obstacles plus the objective must leave room to spawn pods.
        if self.occupied_area(0) > self.arena_area() / 2.0 {
            return Err("arena too small for the configured obstacles".to_string());
        }
        Ok(())
    }

    /// Check that `players` pods fit next to the obstacles and the objective
    /// with at least half the arena left free, so random placement settles
    /// quickly.
    pub fn validate_room_for(&self, players: usize) -> Result<(), String> {
        if self.occupied_area(players) > self.arena_area() / 2.0 {
            return Err(format!("arena too small for {} players", players));
        }
        Ok(())
    }

    fn arena_area(&self) -> f32 {
        4.0 * self.arena_half_width * self.arena_half_height
    }

    /// Area covered by the obstacles, the objective and `pods` pods.
    fn occupied_area(&self, pods: usize) -> f32 {
        self.obstacle_count as f32 * self.obstacle_side * self.obstacle_side
            + self.objective_side * self.objective_side
            + pods as f32 * self.pod_side * self.pod_side
    }
}

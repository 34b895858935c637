use std::path::Path;

pub use arena_shared::config::GameConfig;

use crate::error::ConfigError;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Seed for the session RNG. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
    /// Capacity of the scheduler's operation queue
    pub command_queue: usize,
    /// Joins beyond this many connected players are refused
    pub max_players: usize,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:2019".to_string(),
            rng_seed: None,
            command_queue: 1024,
            max_players: 16,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build the process configuration.
    ///
    /// Game constants come from the JSON file at `path` when it exists
    /// (defaults otherwise). `ARENA_LISTEN` and `ARENA_SEED` override the
    /// listen address and RNG seed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = ServerConfig::default();

        if let Some(path) = path {
            if path.exists() {
                config.game = load_game_config(path)?;
                tracing::info!("Loaded game constants from {}", path.display());
            } else {
                tracing::warn!(
                    "Config file {} not found, using default game constants",
                    path.display()
                );
            }
        }

        if let Ok(addr) = std::env::var("ARENA_LISTEN") {
            config.listen_addr = addr;
        }
        if let Ok(seed) = std::env::var("ARENA_SEED") {
            let seed = seed
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(format!("ARENA_SEED is not a u64: {}", seed)))?;
            config.rng_seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_queue == 0 {
            return Err(ConfigError::Invalid("command_queue must be > 0".to_string()));
        }
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("max_players must be > 0".to_string()));
        }
        self.game.validate().map_err(ConfigError::Invalid)?;
        self.game
            .validate_room_for(self.max_players)
            .map_err(ConfigError::Invalid)
    }
}

/// Parse a `data.json`-style file into game constants.
pub fn load_game_config(path: &Path) -> Result<GameConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let game: GameConfig = serde_json::from_str(&text)?;
    Ok(game)
}

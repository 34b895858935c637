//! Error types for the arena server.

/// Errors returned to callers of the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Another connected player already uses this pseudo.
    #[error("pseudo {0} is already taken")]
    NameTaken(String),

    /// The pseudo is empty or contains a protocol separator.
    #[error("pseudo {0:?} is not allowed")]
    InvalidName(String),

    /// The session already holds the configured maximum of players.
    #[error("session is full ({0} players)")]
    SessionFull(usize),

    /// The scheduler task is gone (server shutting down).
    #[error("scheduler is unavailable")]
    Unavailable,
}

/// Errors raised while loading the process configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors ending a single client connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

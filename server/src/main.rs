use std::path::PathBuf;

use arena_server::config::ServerConfig;
use arena_server::{connection, scheduler};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Config file: first argument, else ARENA_CONFIG
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ARENA_CONFIG").ok())
        .map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref())?;

    let (handle, scheduler_task) = scheduler::spawn(&config);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        tick_rate = config.game.tick_rate,
        win_cap = config.game.win_cap,
        "Arena server listening on {}",
        config.listen_addr
    );
    println!("Arena server listening on {}", config.listen_addr);

    tokio::select! {
        result = connection::serve(listener, handle) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Ctrl-C received, shutting down"),
    }

    scheduler_task.abort();
    Ok(())
}

//! LAN Rush - authoritative light-trail arena server.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();

    info!("LAN Rush server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = server::Config::load(&path)?;
    info!("Loaded configuration from {}", path);
    info!("  Address: {}:{}", config.server.bind, config.server.port);
    info!("  Arena: {}x{}", config.arena.size, config.arena.size);
    info!(
        "  Tick: {} Hz, max players: {}",
        config.tick_rate(),
        config.server.max_players
    );

    // Start the game server
    server::run(config).await?;

    Ok(())
}

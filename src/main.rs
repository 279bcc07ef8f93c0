use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use diarynote::config::Config;
use diarynote::events::spawn_transition_logger;
use diarynote::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)?;

    // Subscribes before the listener opens, so no transition is missed.
    spawn_transition_logger(&state.events);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("🚀 Server listening on http://{}", config.listen_addr);
    tracing::info!("✅ All systems operational");

    diarynote::serve(listener, state).await
}

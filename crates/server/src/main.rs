use server::{start_server, state::AppState};
use services::services::{config::Config, profile_sync::ProfileSyncService};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Shared TLS provider for reqwest and sqlx; ignore a second install.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::new(config).await?;

    if state.config.profile_sync_enabled {
        ProfileSyncService::spawn(
            state.db.clone(),
            state.links.clone(),
            state.config.profile_sync_interval_minutes,
        );
    }

    start_server(state).await
}

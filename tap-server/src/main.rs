use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tap_persistence::connection::connect_and_migrate;
use tap_persistence::repositories::{AccountRepository, ProfileRepository};
use tap_persistence::{CredentialStore, LocalProfileStore, ProfileStore};
use tap_server::{
    auth::AuthService,
    config::{Config, StoreBackend},
    create_routes,
    leaderboard::LeaderboardFeed,
    profile_sync::ProfileSync,
    websocket::ConnectionServices,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Tap Rush server...");

    let config = Config::new();
    config.round_config().validate()?;

    let (profiles, credentials): (Arc<dyn ProfileStore>, Arc<dyn CredentialStore>) =
        match config.store_backend {
            StoreBackend::Database => {
                let db = connect_and_migrate(&config.database_url).await?;
                (
                    Arc::new(ProfileRepository::new(db.clone())),
                    Arc::new(AccountRepository::new(db)),
                )
            }
            StoreBackend::Local => {
                let store = Arc::new(LocalProfileStore::open(&config.local_store_path).await?);
                info!("Using local profile store; scores stay on this machine");
                (store.clone(), store)
            }
        };

    let auth_service = Arc::new(AuthService::new(
        credentials,
        profiles.clone(),
        &config.jwt_secret,
        config.session_ttl_minutes,
    ));
    if let Some(identity) = auth_service.remembered_identity().await? {
        info!("Last signed-in account on this store: {}", identity.email);
    }

    let leaderboard = LeaderboardFeed::new(profiles.clone());
    leaderboard.refresh().await;
    let profile_sync = ProfileSync::spawn(profiles.clone(), leaderboard, config.retry_policy());

    let routes = create_routes(ConnectionServices {
        auth: auth_service.clone(),
        profiles,
        sync: profile_sync,
        round_config: config.round_config(),
    });

    // Start cleanup task
    let cleanup_auth_service = auth_service.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = cleanup_auth_service.purge_revoked();
            if purged > 0 {
                info!("Purged {} expired revocations", purged);
            }
        }
    });

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (config.host.parse::<std::net::IpAddr>()?, config.port);

    let (addr, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
        // Wait for SIGINT (Ctrl+C) or SIGTERM
        #[cfg(unix)]
        {
            let (Ok(mut sigint), Ok(mut sigterm)) = (
                signal::unix::signal(signal::unix::SignalKind::interrupt()),
                signal::unix::signal(signal::unix::SignalKind::terminate()),
            ) else {
                tracing::error!("Failed to install signal handlers");
                return;
            };

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl+c: {}", e);
                return;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    })?;

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
    Ok(())
}

use std::time::Duration;

use clap::Parser;
use tower_http::cors::CorsLayer;

use agora_server::config::Config;
use agora_server::{db, routes, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    let port = config.port;

    tracing::info!("Initializing database at {}", config.db_path);
    let pools = match db::init_pool(&config.db_path).await {
        Ok(pools) => pools,
        Err(e) => {
            tracing::error!("Failed to open database: {e}");
            std::process::exit(1);
        }
    };

    let policy = config.policy();
    tracing::info!(
        "Auto-ban policy: {} distinct reporters within {} day(s)",
        policy.threshold,
        policy.window.num_days()
    );

    let state = AppState::new(
        pools,
        config.resolve_jwt_secret(),
        config.external_host.clone(),
        policy,
        Duration::from_secs(config.role_cache_ttl_secs),
    );

    // Expired role cache entries
    let cache = state.role_cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cache.cleanup();
        }
    });

    let app = routes::router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Agora server listening on http://localhost:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {e}");
    }
}

//! tspgate application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Build the shared cache backend (Redis, or in-memory for development)
//! 3. Spawn the expired-entry sweep
//! 4. Build the router with the admission guards
//! 5. Start Axum server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tspgate::{
    auth::middleware::AppState,
    cleanup,
    config::{CacheBackend, Config},
    routes,
    storage::{InMemoryCache, LocalSessionStore, RedisCache, SharedCache, Sweep},
};

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting tspgate on {}", config.bind_addr);

    let local_sessions = Arc::new(LocalSessionStore::new(Duration::from_secs(
        config.local_session_ttl_secs,
    )));
    let mut sweep_targets: Vec<Arc<dyn Sweep>> = vec![local_sessions.clone()];

    let cache: Arc<dyn SharedCache> = match config.cache_backend {
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .expect("REDIS_URL is validated for the redis backend");
            let redis = RedisCache::open(url, Duration::from_millis(config.cache_timeout_ms))
                .expect("Invalid Redis URL");
            redis.ping().await.expect("Failed to connect to Redis");
            tracing::info!("Shared cache: redis");
            Arc::new(redis)
        }
        CacheBackend::Memory => {
            tracing::warn!("Shared cache: in-memory, sessions are not shared with other processes");
            let memory = Arc::new(InMemoryCache::new());
            sweep_targets.push(memory.clone());
            memory
        }
    };

    tokio::spawn(cleanup::run_sweep_loop(
        sweep_targets,
        Duration::from_secs(config.sweep_interval_secs),
    ));

    let bind_addr = config.bind_addr;
    let state = AppState {
        cache,
        local_sessions,
        config: Arc::new(config),
    };

    let app = routes::api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // ConnectInfo is the fallback client address when the proxy header is absent
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

//! Aurora Server - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use aurora_server::config::{Config, DedupStoreKind};
use aurora_server::ratelimit::{RateLimitConfig, RateLimiter};
use aurora_server::reply::MenuRouter;
use aurora_server::webhook::{Dispatcher, RedisDedupStore, ReplayGuard, SignatureVerifier};
use aurora_server::{api, db, persistence, whatsapp};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aurora_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Aurora Server"
    );

    if !config.has_app_secret() {
        warn!("APP_SECRET not set: webhook signatures are NOT verified. Do not run like this in production.");
    }
    if config.verify_token.is_none() {
        warn!("VERIFY_TOKEN not set: subscription handshakes will be refused");
    }
    if !config.has_send_credentials() {
        warn!("WHATSAPP_TOKEN / PHONE_NUMBER_ID not set: replies will not be sent");
    }

    // Initialize database (optional - file persistence otherwise)
    let db_pool = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            Some(pool)
        }
        None => {
            info!(file = %config.messages_file, "DATABASE_URL not set, persisting messages to file");
            None
        }
    };

    // Initialize Redis (optional unless the dedup store needs it)
    let redis = match &config.redis_url {
        Some(url) => match db::create_redis_client(url).await {
            Ok(client) => Some(client),
            Err(e) if config.dedup_store == DedupStoreKind::Redis => return Err(e),
            Err(e) => {
                warn!("Redis unavailable: {}. Falling back to in-memory state.", e);
                None
            }
        },
        None => None,
    };

    // Replay guard
    let guard = match (&config.dedup_store, &redis) {
        (DedupStoreKind::Redis, Some(redis)) => {
            info!(ttl_secs = config.dedup_ttl_secs, "Using Redis dedup store");
            ReplayGuard::with_store(
                Arc::new(RedisDedupStore::new(redis.clone(), config.dedup_ttl_secs)),
                config.replay_threshold_secs,
            )
        }
        _ => ReplayGuard::in_memory(config.dedup_capacity, config.replay_threshold_secs),
    };

    let sender = whatsapp::sender_from_config(&config)?;
    let sink = persistence::sink_from_config(&config, db_pool);

    let dispatcher = Dispatcher::new(
        SignatureVerifier::new(config.app_secret.clone()),
        guard,
        Arc::new(MenuRouter),
        sender,
    )
    .with_sink(sink);

    // Initialize rate limiter (optional)
    let rate_limiter = {
        let rl_config = RateLimitConfig::from_env();
        if rl_config.enabled {
            let limiter = match &redis {
                Some(redis) => RateLimiter::redis(redis.clone(), rl_config),
                None => RateLimiter::in_memory(rl_config),
            };
            info!(backend = limiter.backend_name(), "Rate limiter initialized");
            Some(limiter)
        } else {
            info!("Rate limiting disabled by configuration");
            None
        }
    };

    // Build application state
    let state = api::AppState::new(config.clone(), dispatcher, rate_limiter);
    let dispatcher = Arc::clone(&state.dispatcher);

    // Build router
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    // Let acknowledged deliveries finish replying
    dispatcher.drain().await;

    info!("Server shutdown complete");

    Ok(())
}

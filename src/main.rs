//! Prashna - resilient questionnaire resolution for scheduling flows
//!
//! Standalone server: rule matching, questionnaire assembly, and tiered
//! fallback retrieval behind a REST API.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;

use prashna::config::ServerConfig;
use prashna::handlers::{build_protected_routes, build_public_routes, ServiceState};
use prashna::{auth, metrics, middleware};

/// Max time to drain in-flight requests on shutdown
const GRACEFUL_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
/// Max time to flush RocksDB on shutdown
const DATABASE_FLUSH_TIMEOUT_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(feature = "telemetry")]
    {
        prashna::tracing_setup::init_tracing().expect("Failed to initialize tracing");
    }
    #[cfg(not(feature = "telemetry"))]
    {
        tracing_subscriber::fmt::init();
        info!("📝 Console logging initialized (telemetry disabled)");
    }

    metrics::register_metrics().expect("Failed to register metrics");
    info!("📊 Metrics registered at /metrics");

    info!("🗂️  Starting Prashna server...");

    let server_config = ServerConfig::from_env();
    server_config.log();

    let state = Arc::new(ServiceState::new(server_config.clone())?);
    let state_for_shutdown = Arc::clone(&state);

    // Warm the file fallback from its directory listing, then take the
    // startup snapshot so the fallback tiers are populated before traffic.
    state.engine.warm_cold_stores().await;
    match state.engine.snapshot().rebuild().await {
        Ok(groups) => info!("📦 Startup snapshot: {} groups", groups),
        Err(e) => tracing::warn!("startup snapshot failed (continuing): {e:#}"),
    }

    // Scheduled snapshot rebuilds, self-excluding
    let _snapshot_task = state
        .engine
        .snapshot()
        .spawn_schedule(server_config.snapshot_interval);

    // Rate limiting
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(server_config.rate_limit_per_second)
        .burst_size(server_config.rate_limit_burst)
        .finish()
        .expect("Failed to build governor rate limiter configuration");
    let governor_layer = GovernorLayer::new(governor_conf);
    info!(
        "⚡ Rate limiting enabled: {} req/sec, burst of {}",
        server_config.rate_limit_per_second, server_config.rate_limit_burst
    );

    let cors = server_config.cors.to_layer();

    // Protected API routes: auth + rate limit. Public routes (health,
    // metrics) stay reachable for probes and scraping.
    let protected_routes = build_protected_routes(Arc::clone(&state))
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .layer(governor_layer);
    let public_routes = build_public_routes(Arc::clone(&state));

    let app = axum::Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(ConcurrencyLimitLayer::new(
            server_config.max_concurrent_requests,
        ))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .expect("invalid PRASHNA_HOST/PRASHNA_PORT");
    info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("🔒 Shutdown signal received, flushing store...");

    let cleanup_future = async {
        let flush_future =
            async { tokio::task::spawn_blocking(move || state_for_shutdown.flush()).await };
        match tokio::time::timeout(
            std::time::Duration::from_secs(DATABASE_FLUSH_TIMEOUT_SECS),
            flush_future,
        )
        .await
        {
            Ok(Ok(Ok(()))) => info!("✅ Store flushed"),
            Ok(Ok(Err(e))) => tracing::error!("❌ Store flush failed: {e:#}"),
            Ok(Err(e)) => tracing::error!("❌ Store flush panicked: {e}"),
            Err(_) => tracing::error!(
                "⏱️  Store flush timed out after {}s",
                DATABASE_FLUSH_TIMEOUT_SECS
            ),
        }

        #[cfg(feature = "telemetry")]
        prashna::tracing_setup::shutdown_tracing();
    };

    match tokio::time::timeout(
        std::time::Duration::from_secs(GRACEFUL_SHUTDOWN_TIMEOUT_SECS),
        cleanup_future,
    )
    .await
    {
        Ok(()) => info!("👋 Server shutdown complete"),
        Err(_) => {
            tracing::error!(
                "⏱️  Graceful shutdown timed out after {}s, forcing exit",
                GRACEFUL_SHUTDOWN_TIMEOUT_SECS
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, starting graceful shutdown");
}

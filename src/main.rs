use anyhow::Context;
use scroll_portal::{
    AppState, Backend,
    config::{AppConfig, Env},
    create_router,
    realtime::RealtimeRefresher,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, backend selection, initial landing load, realtime
/// refresher and the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration & Environment Loading
    dotenv::dotenv().ok();
    let config = AppConfig::load().context("invalid configuration")?;

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scroll_portal=debug,tower_http=info,axum=trace".into());

    // 3. Logging Format by Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Backend Selection
    // Missing settings select disabled stand-ins; nothing here aborts startup.
    let backend = Backend::from_config(&config);
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(&backend, config);

    // 5. Realtime Refresher, then the Initial Landing Load.
    let (refresher, snapshot) = RealtimeRefresher::start(
        backend.feed.clone(),
        state.loader.clone(),
        state.landing.clone(),
    )
    .await?;
    tracing::info!(
        featured = ?snapshot.featured_source,
        quick = ?snapshot.quick_source,
        "landing content loaded"
    );

    // 6. Router and Server Startup
    let app = create_router(state);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    refresher.unmount().await;
    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

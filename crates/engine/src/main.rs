//! Play-by-mail engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header::HeaderName;
use axum::http::{HeaderValue, Method};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playbymail_engine::api;
use playbymail_engine::app::{App, Ports};
use playbymail_engine::infrastructure::{
    account_directory::AccountDirectoryClient,
    clock::{SystemClock, SystemRandom},
    config::EngineConfig,
    correlation::CORRELATION_HEADER,
    job_queue::SqliteJobQueue,
    memory::MemoryStore,
    ports::{ClockPort, Store},
    postgres::PostgresStore,
    renderer_client::RendererClient,
    vision_client::VisionClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playbymail_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting play-by-mail engine");

    let config = EngineConfig::from_env();
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to Postgres");
            Arc::new(PostgresStore::connect(url).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, game state is kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!(path = %config.queue_db, "Opening job queue");
    let queue = Arc::new(SqliteJobQueue::new(&config.queue_db, clock.clone()).await?);

    tracing::info!(
        vision = %config.vision_url,
        renderer = %config.renderer_url,
        directory = %config.directory_url,
        max_attempts = config.retry.max_attempts,
        "External services configured"
    );
    let app = Arc::new(App::new(
        Ports {
            store,
            queue,
            vision: Arc::new(VisionClient::new(&config.vision_url, config.scan_timeout)),
            renderer: Arc::new(RendererClient::new(
                &config.renderer_url,
                config.render_timeout,
            )),
            directory: Arc::new(AccountDirectoryClient::new(&config.directory_url)),
            clock,
            random: Arc::new(SystemRandom::new()),
        },
        config.clone(),
    ));

    let shutdown = CancellationToken::new();

    // Spawn job runner
    let runner = app.job_runner();
    let runner_cancel = shutdown.clone();
    let poll = config.worker_poll;
    let runner_task = tokio::spawn(async move { runner.run(poll, runner_cancel).await });

    // Spawn deadline sweeper
    let sweeper = app.deadline_sweeper();
    let sweeper_cancel = shutdown.clone();
    let every = config.deadline_sweep;
    let sweeper_task = tokio::spawn(async move { sweeper.run(every, sweeper_cancel).await });

    let mut router = api::http::routes()
        .with_state(app)
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = build_cors_layer(config.cors_allowed_origins.as_deref()) {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(runner_task, sweeper_task);
    tracing::info!("Engine stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer(allowed_origins: Option<&str>) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins.map(str::trim).filter(|s| !s.is_empty())?;

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        // Callers send X-Account-Id and non-simple content types, which trigger preflights.
        .allow_headers([
            HeaderName::from_static("x-account-id"),
            HeaderName::from_static(CORRELATION_HEADER),
            axum::http::header::CONTENT_TYPE,
        ]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}

//! sloppy-server – entry point.
//!
//! Startup order:
//! 1. Load configuration from the env file and process environment.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Open the SQLite database and run pending migrations.
//! 4. Start the task queue workers and the result-handling pipeline.
//! 5. Watch the env file for credential changes in a background task.
//! 6. Build the Axum router and start the HTTP server with graceful shutdown.

mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sloppy_core::config::ConfigProvider;
use sloppy_core::notify::{BroadcastNotifier, NotificationPublisher, Notifier};
use sloppy_core::providers::Providers;
use sloppy_core::queue::{QueueSettings, TaskQueue};
use sloppy_core::{Pipeline, SqliteScriptStore};
use tracing::{info, warn};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let config = Arc::new(ConfigProvider::load()?);
    let cfg = config.current();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: SLOPPY_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "sloppy-server starting");

    // ── 3. Database ────────────────────────────────────────────────────────────
    let store =
        SqliteScriptStore::connect(&cfg.database_url, cfg.database_max_connections).await?;
    info!(database_url = %cfg.database_url, "database ready");

    // ── 4. Queue and pipeline ──────────────────────────────────────────────────
    let hub = BroadcastNotifier::new(cfg.notify_capacity);
    let providers = Providers::hosted(Arc::clone(&config))?;
    let queue = TaskQueue::start(providers, QueueSettings::from_config(&cfg));
    let notifier: Arc<dyn Notifier> = Arc::new(hub.clone());
    let pipeline = Pipeline::new(
        Arc::new(store),
        queue,
        NotificationPublisher::new(notifier),
        Arc::clone(&config),
    );
    info!(
        workers = cfg.queue_workers,
        handlers = cfg.handler_concurrency,
        "task pipeline started"
    );

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        pipeline,
        hub,
    });

    // ── 5. Config watcher ──────────────────────────────────────────────────────
    let watched = Arc::clone(&config);
    let interval = cfg.config_reload_interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = watched.refresh() {
                warn!(error = %e, "failed to refresh configuration");
            }
        }
    });

    // ── 6. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("sloppy-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

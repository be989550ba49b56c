use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quill_api::access::AccessResolver;
use quill_api::config::{LogFormat, ServerConfig};
use quill_api::router::build_app_router;
use quill_api::state::AppState;
use quill_api::sync::BlockTaskSynchronizer;
use quill_api::ws::Hub;
use quill_db::{OutboxStore, PgStore, Store};
use quill_events::{EventBus, OutboxDispatcher, Publisher};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quill_api=debug,quill_events=debug,tower_http=debug".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = quill_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    quill_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    quill_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let pg_store = Arc::new(PgStore::new(pool));
    let store: Arc<dyn Store> = pg_store.clone();
    let outbox: Arc<dyn OutboxStore> = pg_store;
    let access = Arc::new(AccessResolver::new(Arc::clone(&store)));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // Subscribe before the dispatcher starts so nothing published early is missed.
    let hub_cancel = CancellationToken::new();
    let (hub, hub_handle) = Hub::spawn(
        config.realtime.client_buffer,
        Some(event_bus.subscribe()),
        hub_cancel.clone(),
    );

    let synchronizer = Arc::new(BlockTaskSynchronizer::new(
        Arc::clone(&store),
        Arc::clone(&access),
    ));
    let sync_cancel = CancellationToken::new();
    let sync_handle = tokio::spawn(synchronizer.run(event_bus.subscribe(), sync_cancel.clone()));

    // --- Outbox dispatcher ---
    let publisher: Arc<dyn Publisher> = event_bus.clone();
    let dispatcher = Arc::new(
        OutboxDispatcher::new(outbox, publisher)
            .with_poll_interval(config.outbox_poll_interval),
    );
    dispatcher.start().await;

    tracing::info!("Background services started (dispatcher, synchronizer, hub)");

    // --- App state ---
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        access,
        hub: hub.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    // Stop producing first; the in-flight tick completes.
    if tokio::time::timeout(grace, dispatcher.stop()).await.is_err() {
        tracing::warn!("Outbox dispatcher did not stop in time");
    }

    sync_cancel.cancel();
    let _ = tokio::time::timeout(grace, sync_handle).await;
    tracing::info!("Synchronizer stopped");

    let ws_count = hub.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    hub.shutdown().await;
    if tokio::time::timeout(grace, hub_handle).await.is_err() {
        hub_cancel.cancel();
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

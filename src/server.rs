use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, delete, get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    error::{self, AppError},
    handlers::{self, AppState},
    metrics,
    request_log::{
        log_requests, spawn_retention_task, FileSink, Interceptor, LogDispatcher, LogStore,
        SqliteLogStore,
    },
    signals::shutdown_signal,
};

/// Start the request logging server
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the log store and starts the sink writers
/// 3. Starts the retention task (if enabled)
/// 4. Serves requests until SIGINT/SIGTERM
/// 5. Drains the sink writers before returning
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let store: Arc<dyn LogStore> = Arc::new(
        SqliteLogStore::connect(&config.store.database_url, config.store.max_connections).await?,
    );
    info!(database_url = %config.store.database_url, "Request log store ready");

    let file_sink = FileSink::new(&config.file_sink.directory);
    let (dispatcher, writer_tasks) =
        LogDispatcher::spawn(store.clone(), file_sink.clone(), &config.writer);

    let retention_task = config.retention.enabled.then(|| {
        info!(
            store_days = config.retention.store_days,
            file_days = config.retention.file_days,
            cleanup_hour = config.retention.cleanup_hour,
            "Retention sweeps enabled"
        );
        spawn_retention_task(store.clone(), file_sink.clone(), config.retention.clone())
    });

    let state = AppState {
        store,
        file_sink,
        dispatcher: dispatcher.clone(),
        metrics: metrics_handle,
        max_body_bytes: config.interceptor.max_body_bytes,
    };
    let interceptor = Interceptor::new(dispatcher, &config.interceptor);

    let app = create_router(state, interceptor);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    info!("Starting Flexylog on {}", addr);
    info!(
        "Day-files in {}, writer batch size {}",
        config.file_sink.directory, config.writer.batch_size
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        shutdown_signal().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    if let Some(task) = retention_task {
        task.abort();
    }

    info!("Flushing queued log entries...");
    writer_tasks.join().await;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
///
/// Layer order, outermost first: body limit, CORS, tracing, request logger,
/// panic handler. Panics reach the request logger as 500 responses.
pub fn create_router(state: AppState, interceptor: Interceptor) -> Router {
    Router::new()
        .route("/", get(handlers::index::index))
        .route("/health", get(handlers::index::health_check))
        .route("/test", post(handlers::index::echo))
        .route("/logs", get(handlers::logs_api::list_logs))
        .route("/logs/local", get(handlers::logs_api::list_local_logs))
        .route("/logs/filter", get(handlers::logs_api::filter_logs))
        .route("/logger/stats", get(handlers::logger_api::get_stats))
        .route("/logger/clear", delete(handlers::logger_api::clear_logs))
        .route("/logger/log", any(handlers::logger_api::manual_log))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(middleware::from_fn_with_state(interceptor, log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // Limit extracted request bodies to 10MB
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
}

async fn not_found() -> AppError {
    AppError::RouteNotFound
}

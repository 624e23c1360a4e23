use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wmpro_core::job::JobType;
use wmpro_events::EventBus;
use wmpro_queue::simulated::SimulatedProcessor;
use wmpro_queue::{JobQueue, ProcessorRegistry, QueueConfig};

use wmpro_api::config::ServerConfig;
use wmpro_api::router::build_app_router;
use wmpro_api::state::AppState;
use wmpro_api::ws;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wmpro_api=debug,wmpro_queue=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    let queue_config = QueueConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tokio::fs::create_dir_all(&config.output_dir).await?;
    tokio::fs::create_dir_all(&queue_config.work_dir).await?;

    // --- Event bus ---
    let bus = Arc::new(EventBus::default());

    // --- Job queue ---
    let processors = JobType::ALL
        .into_iter()
        .fold(ProcessorRegistry::new(), |registry, job_type| {
            registry.register(
                job_type,
                Arc::new(SimulatedProcessor::for_type(job_type, &config.output_dir)),
            )
        });
    let queue = Arc::new(JobQueue::new(queue_config, processors, Arc::clone(&bus))?);

    // --- App state ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let state = AppState::new(config, Arc::clone(&queue));
    let ws_manager = Arc::clone(&state.ws_manager);

    // --- Background services ---
    let cancel = CancellationToken::new();
    let broadcaster_handle = tokio::spawn(
        Arc::clone(&state.broadcaster).run(bus.subscribe(), cancel.clone()),
    );
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), cancel.clone());
    tracing::info!("Progress broadcaster and heartbeat started");

    // --- Start server ---
    let addr = state.config.bind_addr();
    let app = build_app_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    queue.shutdown(shutdown_timeout).await;

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), broadcaster_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    drop(bus);

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
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

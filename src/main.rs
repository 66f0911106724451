use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use media_upload_gateway::config::AppConfig;
use media_upload_gateway::infrastructure::{indexing, storage};
use media_upload_gateway::services::worker::{UploadWorker, scan_queue};
use media_upload_gateway::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// HTTP gateway plus the queued upload worker
    Server,
    /// One worker pass over the staging directory, report printed as JSON
    Scan,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_enum, default_value_t = Mode::Server)]
    mode: Mode,

    /// Port for the API server
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_upload_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    let config = Arc::new(config);

    info!("🚀 Starting Media Upload Gateway [Mode: {:?}]...", args.mode);
    info!(
        "🎬 Duration window: {}s..={}s, poll every {:?} (timeout {:?}), delete after index: {}",
        config.min_duration_secs,
        config.max_duration_secs,
        config.indexing.poll_interval,
        config.indexing.poll_timeout,
        config.delete_after_index
    );

    // 2. Infrastructure
    let staging = storage::setup_staging(&config).await?;
    let probe = indexing::setup_duration_probe(&config);
    let client = indexing::setup_indexing_client(&config);

    // 3. Graceful shutdown channel, shared by the server and the worker
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let worker = UploadWorker::new(
        staging.clone(),
        probe,
        client,
        config.as_ref().clone(),
        shutdown_rx,
    );

    if args.mode == Mode::Scan {
        let report = worker.process_staging().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // 4. Worker service
    let (worker_handle, scan_rx) = scan_queue(config.worker_queue_capacity);
    let worker_task = tokio::spawn(worker.run(scan_rx));
    info!("👷 Upload worker initialized.");

    // 5. HTTP server
    let state = AppState {
        config: config.clone(),
        staging,
        worker: worker_handle,
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Err(e) = worker_task.await {
        tracing::error!("Upload worker task failed: {}", e);
    }

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}

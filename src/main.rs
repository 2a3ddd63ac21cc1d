//! Cutout Service
//!
//! Local HTTP service exposing background removal and OCR to the desktop app.
//! `ocr-worker` runs a single recognition and is spawned by the server itself.

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cutout_service::config::Config;
use cutout_service::ocr::{worker, WorkerArgs};
use cutout_service::routes;
use cutout_service::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "cutout-service")]
#[command(about = "Local background removal and OCR service", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Recognize one image and print the raw result as JSON
    #[command(hide = true)]
    OcrWorker(WorkerArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::OcrWorker(args)) => worker::run(args),
        Some(Command::Serve) | None => match serve() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("Server failed: {:#}", e);
                eprintln!("cutout-service: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

#[tokio::main]
async fn serve() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "cutout_service=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting cutout service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        backend = config.ocr.backend.as_str(),
        timeout_secs = config.ocr.timeout_secs,
        "OCR worker configured"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;

    let app_state = AppState::new(config).context("failed to initialize application state")?;
    tracing::info!(remover = app_state.cutout().remover_name(), "Cutout remover configured");

    let app = routes::app(app_state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Cutout service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

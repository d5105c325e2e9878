use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use windowgate::config::WindowgateConfig;
use windowgate::http::HttpServer;
use windowgate::ratelimit::RateLimiter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "windowgate")]
#[command(about = "Dual-window per-client admission control for HTTP services")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configured address's port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    info!("Starting Windowgate admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = WindowgateConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.http_addr.set_port(port);
    }
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limiting)?);
    info!(
        short_window_ms = config.rate_limiting.short_window_ms,
        short_window_max = config.rate_limiting.short_window_max,
        long_window_ms = config.rate_limiting.long_window_ms,
        long_window_max = config.rate_limiting.long_window_max,
        "Rate limiter initialized"
    );

    let server = HttpServer::new(&config.server, rate_limiter);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Windowgate admission service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }
}

/// Resolve once Ctrl+C or SIGTERM arrives. A signal whose handler cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
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
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(signal = "SIGINT", "Draining in-flight requests, admission service shutting down");
        }
        _ = terminate => {
            info!(signal = "SIGTERM", "Draining in-flight requests, admission service shutting down");
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use yuplan::config::YuplanConfig;
use yuplan::http::{HttpServer, RateLimitState};
use yuplan::ratelimit::{RateLimiter, Sweeper};

/// Command line arguments. Flags override the file and environment.
#[derive(Parser, Debug)]
#[command(name = "yuplan")]
#[command(about = "Rate limited gateway for the YUPlan course catalog API", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to run the server on
    #[arg(short, long)]
    port: Option<u16>,

    /// Max requests per client per window
    #[arg(long)]
    rate_limit: Option<u64>,

    /// Rate limit window in seconds
    #[arg(long)]
    rate_window: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
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

    info!("Starting YUPlan API gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    info!(
        addr = %config.server.addr,
        identity_source = ?config.server.identity_source,
        "Configuration loaded"
    );

    if !config.rate_limiting.enabled {
        info!("Rate limiting disabled");
        HttpServer::without_rate_limit(config.server.addr)
            .serve_with_shutdown(shutdown_signal())
            .await?;
        info!("YUPlan API gateway stopped");
        return Ok(());
    }

    // Initialize the rate limiter and its idle client sweeper
    let limits = config.rate_limiting.limit_config();
    let rate_limiter = Arc::new(RateLimiter::new(limits));
    let sweeper = Sweeper::spawn(Arc::clone(&rate_limiter))?;
    info!(
        limit = limits.limit,
        window_secs = limits.window.as_secs(),
        cleanup_interval_secs = limits.cleanup_interval.as_secs(),
        "Rate limiter initialized"
    );

    let state = RateLimitState::new(rate_limiter, config.server.identity_source);
    let result = HttpServer::new(config.server.addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;
    result?;

    info!("YUPlan API gateway stopped");
    Ok(())
}

/// Layer defaults, the config file, the environment and CLI flags.
fn load_config(args: &Args) -> anyhow::Result<YuplanConfig> {
    let mut config = match &args.config {
        Some(path) => YuplanConfig::from_file(path)?,
        None => YuplanConfig::default(),
    };
    config.apply_env()?;

    if let Some(port) = args.port {
        config.server.addr.set_port(port);
    }
    if let Some(limit) = args.rate_limit {
        config.rate_limiting.requests_per_window = limit;
    }
    if let Some(window) = args.rate_window {
        config.rate_limiting.window_secs = window;
    }

    config.validate()?;
    Ok(config)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

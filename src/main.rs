//! Corpora gateway -- HTTP front end for the archive bucket and its
//! download-tracking database.
//!
//! SIGTERM/SIGINT stop accepting connections; in-flight requests get
//! `server.shutdown_timeout` seconds to finish before the process exits.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use corpora_gateway::config::Config;
use corpora_gateway::credentials::CredentialProvider;

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(
    name = "corpora-gateway",
    version,
    about = "Web gateway over an S3 file archive and its metadata database"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "corpora-gateway.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Install the tracing subscriber.  `RUST_LOG` wins over `logging.level`.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = corpora_gateway::config::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        corpora_gateway::metrics::init_metrics();
        corpora_gateway::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let archive = corpora_gateway::storage::open_archive(&config.archive).await?;
    let credentials = Arc::new(CredentialProvider::from_config(&config.database));

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(corpora_gateway::AppState {
        config,
        archive,
        credentials,
    });

    let app = corpora_gateway::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Corpora gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    info!("Corpora gateway shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful
/// shutdown.  A watchdog ends the process if draining outlasts `timeout`.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!("In-flight requests still running after {:?}, exiting", timeout);
        std::process::exit(1);
    });
}

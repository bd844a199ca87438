//! docbroker -- document presign broker server.
//!
//! Startup opens the metadata file (applying the configured load-error
//! policy), builds the presign gateway, logs whether the bucket is
//! reachable and serves until SIGINT/SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use docbroker::config::{Config, StorageBackendKind};
use docbroker::metadata::{DocumentRegistry, MetadataStore};
use docbroker::storage::aws::AwsPresignGateway;
use docbroker::storage::memory::MemoryGateway;
use docbroker::storage::PresignGateway;

/// Command-line arguments for the docbroker server.
#[derive(Parser, Debug)]
#[command(
    name = "docbroker",
    version,
    about = "Document upload/download broker issuing presigned URLs"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "docbroker.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the config.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.effective_level()));

    if config.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = docbroker::config::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Configuration loaded from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        docbroker::metrics::init_metrics()?;
        docbroker::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Open the metadata file; a corrupt file either aborts startup here or
    // is quarantined, depending on the policy.
    let store = MetadataStore::open(&config.metadata.path, config.metadata.on_load_error)?;
    info!(
        "Metadata store opened at {} (on_load_error={})",
        store.path().display(),
        store.policy().as_str()
    );
    let registry = DocumentRegistry::new(store);
    info!("{} document record(s) on file", registry.count().await?);

    let gateway: Arc<dyn PresignGateway> = match config.storage.backend {
        StorageBackendKind::Aws => Arc::new(AwsPresignGateway::new(&config.storage).await?),
        StorageBackendKind::Memory => {
            let bucket = if config.storage.bucket.is_empty() {
                "local-documents".to_string()
            } else {
                config.storage.bucket.clone()
            };
            warn!(
                "Using in-memory presign gateway (bucket={}); URLs are not usable by clients",
                bucket
            );
            Arc::new(MemoryGateway::new(bucket))
        }
    };

    // Reachability is only logged; the service starts either way.
    if gateway.check_reachable().await {
        info!("Bucket '{}' is accessible", gateway.bucket());
    } else {
        warn!(
            "Bucket '{}' is not accessible; starting in degraded mode",
            gateway.bucket()
        );
    }

    let state = Arc::new(docbroker::AppState {
        config: config.clone(),
        registry,
        gateway,
    });

    let app = docbroker::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("docbroker listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("docbroker shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
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
}

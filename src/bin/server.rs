//! evd-server: encrypted vector database server with HTTP API
//!
//! Holds collections in memory; every collection is created by a client
//! uploading its evaluation keys.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use evd::evd::{http, EvdService};
use evd::params::EvdParams;

#[derive(Parser)]
#[command(name = "evd-server")]
#[command(about = "Encrypted vector database server")]
#[command(version)]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:3000", env = "EVD_BIND")]
    bind: String,

    /// Log filter, e.g. `info` or `evd=debug`; RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON parameter file; production parameters when absent
    #[arg(long)]
    params: Option<PathBuf>,
}

fn load_params(path: Option<&PathBuf>) -> Result<EvdParams> {
    let params = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => EvdParams::production(),
    };
    params.validate().context("Invalid parameters")?;
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("EVD server");
    let params = load_params(args.params.as_ref())?;
    info!(
        "Ring degree {}, Q = {}, P = {}",
        params.degree, params.q, params.p
    );

    let service = Arc::new(EvdService::new(params).context("Failed to start service")?);
    let app = http::router(service);

    info!("Starting server on {}", args.bind);
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;

    info!("Endpoints:");
    info!("  GET    /health                      - Health check");
    info!("  POST   /collections/setup           - Register a collection / upload keys");
    info!("  POST   /collections/insert          - Append encrypted entries");
    info!("  POST   /collections/query           - Score an encrypted query");
    info!("  POST   /collections/query_ptxt      - Score a plaintext query");
    info!("  POST   /collections/retrieve        - Fetch a payload by index");
    info!("  POST   /collections/pir_retrieve    - Fetch a payload privately");
    info!("  DELETE /collections/:name           - Drop a collection");
    info!("  POST   /terminate                   - End a session");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

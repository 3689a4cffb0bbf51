use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use opsmon_notify::plugin::ChannelRegistry;
use opsmon_server::app;
use opsmon_server::config::{SeedFile, ServerConfig};
use opsmon_server::seed;
use opsmon_server::state::AppState;
use opsmon_storage::MonitorStore;

const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  opsmon-server [config.toml]                     Start the server");
    eprintln!("  opsmon-server seed <config.toml> <seed.json>    Load channels, targets and rules from a seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    opsmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("opsmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("seed") => {
            let (Some(config_path), Some(seed_path)) = (args.get(2), args.get(3)) else {
                print_usage();
                anyhow::bail!("seed requires <config.toml> and <seed.json> arguments");
            };
            run_seed(config_path, seed_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        other => run_server(other.unwrap_or(DEFAULT_CONFIG_PATH)).await,
    }
}

async fn run_seed(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    config.database.ensure_data_dir()?;
    let store = MonitorStore::new(&config.database.url)
        .await
        .context("Failed to open database")?;
    let seed = SeedFile::load(seed_path)?;
    seed::apply_seed(&store, &ChannelRegistry::default(), &seed).await?;
    tracing::info!(seed = %seed_path, "Seed completed");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        interval_secs = config.monitor.evaluation_interval_secs,
        autostart = config.monitor.autostart,
        "opsmon-server starting"
    );

    config.database.ensure_data_dir()?;
    let store = Arc::new(
        MonitorStore::new(&config.database.url)
            .await
            .context("Failed to open database")?,
    );
    let http_port = config.http_port;
    let autostart = config.monitor.autostart;
    let state = AppState::new(store, config);

    if autostart {
        match state.supervisor.autostart().await {
            Ok(count) => tracing::info!(tenants = count, "Monitoring loops autostarted"),
            Err(e) => tracing::error!(error = %e, "Failed to autostart monitoring loops"),
        }
    }

    let http_addr: SocketAddr = format!("0.0.0.0:{http_port}").parse()?;
    let app = app::build_http_app(state.clone());
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind {http_addr}"))?;

    tracing::info!(http = %http_addr, "Server started");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server error");
    }

    state.supervisor.stop_all().await;
    tracing::info!("Server stopped");
    result.map_err(Into::into)
}

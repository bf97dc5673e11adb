//! Funnel Builder: editor and runtime API for quiz and lead funnels.
//!
//! Main entry point that loads configuration and starts the server.

mod server;

use clap::Parser;
use funnel_core::config::AppConfig;
use server::ApiServer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "funnel-builder")]
#[command(about = "Funnel editor and runtime API")]
#[command(version)]
struct Cli {
    /// Bind address (overrides config)
    #[arg(long, env = "FUNNEL_BUILDER__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "FUNNEL_BUILDER__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Start with an empty store instead of the demo funnel
    #[arg(long, default_value_t = false)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "funnel_builder=info,funnel_management=info,funnel_editor=info,tower_http=info".into()
            }),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Funnel Builder starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if cli.no_seed {
        config.store.seed_demo_data = false;
    }

    info!(
        host = %config.api.host,
        http_port = config.api.http_port,
        max_variants = config.editor.max_variants,
        seed_demo_data = config.store.seed_demo_data,
        "Configuration loaded"
    );

    let api_server = ApiServer::new(config.clone());

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics() {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("Funnel Builder is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}

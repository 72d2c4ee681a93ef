use anyhow::{Context, Result};
use azmon_cloud::{ArmClient, HttpTransport, MonitorCollector};
use azmon_server::app;
use azmon_server::config::{self, ExporterConfig};
use azmon_server::state::AppState;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "azmon-server", about = "Azure Monitor metrics exporter for Prometheus", version)]
struct Cli {
    /// Exporter configuration file
    #[arg(long = "config.file", default_value = "azure.toml", value_name = "PATH")]
    config_file: PathBuf,

    /// Address to expose metrics on
    #[arg(long = "web.listen-address", default_value = ":9276", value_name = "ADDR")]
    listen_address: String,

    /// Print the metric definitions of every configured resource and exit
    #[arg(long = "list.definitions")]
    list_definitions: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("azmon=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = ExporterConfig::load(&cli.config_file)?;
    let targets = config.target_set()?;

    let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
    let client = ArmClient::new(
        transport,
        &config.resource_manager_url,
        &config.credentials.subscription_id,
    );
    let collector = MonitorCollector::new(
        client,
        &config.active_directory_authority_url,
        config.service_principal(),
        targets,
        config.collector_settings(),
    );

    collector
        .token_provider()
        .ensure_fresh_token()
        .await
        .context("Failed to get token")?;

    if cli.list_definitions {
        return list_definitions(&collector).await;
    }

    let addr = config::listen_socket_addr(&cli.listen_address)?;
    let app = app::build_http_app(AppState::new(collector));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(addr = %addr, config = %cli.config_file.display(), "azmon-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

#[allow(clippy::print_stdout)]
async fn list_definitions(collector: &MonitorCollector) -> Result<()> {
    let results = collector
        .metric_definitions()
        .await
        .context("Failed to fetch metric definitions")?;

    for resource in results {
        println!("Resource: {}\n\nAvailable Metrics:", resource.resource_name());
        for definition in &resource.definitions {
            println!("- {}", definition.name.value);
        }
        println!();
    }
    Ok(())
}

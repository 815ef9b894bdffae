//! modlink-node: serves one module over a framed stdio peer link.
//!
//! stdout carries frames, so all logging goes to stderr.

use std::sync::Arc;

use anyhow::Context;
use modlink::bridge::transport::FramedTransport;
use modlink::{
    Characteristic, MODLINK_VERSION, ModuleConfig, ServerConfig, TracingSink, serve,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with MODLINK_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("MODLINK_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!(
            "modlink={level},modlink_node={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn load_config() -> anyhow::Result<ModuleConfig> {
    match std::env::var("MODLINK_CONFIG") {
        Ok(path) => ModuleConfig::from_json_file(&path)
            .with_context(|| format!("loading module config from {path}")),
        Err(_) => Ok(ModuleConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = MODLINK_VERSION, "Starting Modular Computer Smart Loader...");

    let config = load_config()?;
    let characteristic = Arc::new(Characteristic::from_config(&config, Arc::new(TracingSink))?);

    let profile = characteristic.profile();
    info!(
        id = %config.id,
        device = %profile.device_name,
        service = %profile.service_uuid,
        characteristic = %profile.characteristic_uuid,
        value_capacity = profile.value_capacity,
        "Module is ready and advertising."
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                return;
            }
            info!("Received SIGINT, shutting down...");
            shutdown.cancel();
        }
    });

    let transport: FramedTransport<_, _> =
        FramedTransport::new(tokio::io::stdin(), tokio::io::stdout());
    serve(ServerConfig::default(), characteristic, transport, shutdown).await?;

    Ok(())
}

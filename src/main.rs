// src/main.rs
use amid_bus::{MemoryBusPublisher, RedisBusPublisher};
use amid_core::config::{AppConfig, ServiceConfig};
use amid_core::traits::BusPublisher;
use amid_service::AmiService;
use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(service: &ServiceConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "accent_amid={level},amid_ami={level},amid_bus={level},amid_service={level},redis=warn",
            level = service.log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if service.debug {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .init();
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.service);

    info!(
        uuid = %config.service.uuid,
        "Starting accent-amid v{}",
        env!("CARGO_PKG_VERSION")
    );

    let dry_run = std::env::args().any(|arg| arg == "--dry-run");
    let bus: Arc<dyn BusPublisher> = if dry_run {
        warn!("Dry run: AMI events are logged and not published");
        Arc::new(MemoryBusPublisher::discarding())
    } else {
        Arc::new(RedisBusPublisher::from_config(&config.bus))
    };

    if !config.service.publish_ami_events {
        warn!("Publishing of AMI events is disabled, waiting for shutdown signal");
        shutdown_signal().await;
        info!("accent-amid stopped");
        return Ok(());
    }

    let service = Arc::new(AmiService::new(&config, bus));

    let stopper = service.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        stopper.stop();
    });

    service.run().await.context("AMI service failed")?;

    info!("accent-amid stopped");
    Ok(())
}

//! # APISIX Ingress Controller - Main Entry Point
//!
//! Startup sequence:
//!
//! 1. load and validate configuration
//! 2. install logging and the Prometheus exporter
//! 3. connect to the API server and build the gateway client
//! 4. serve health probes and run the controllers until SIGTERM or Ctrl+C

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use apisix_ingress_controller::core::config::KubernetesConfig;
use apisix_ingress_controller::observability::{init_logging, install_prometheus_exporter, serve_health};
use apisix_ingress_controller::{ApisixClient, ControllerConfig, ControllerProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::load().await.context("failed to load configuration")?;
    init_logging(&config.observability.logging);

    info!("🚀 Starting APISIX ingress controller");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    install_prometheus_exporter(&config.observability.metrics)?;

    let kube = kube_client(&config.kubernetes).await?;
    let apisix = Arc::new(ApisixClient::new(&config.apisix)?);
    let config = Arc::new(config);
    let cancel = CancellationToken::new();

    let health = tokio::spawn(serve_health(
        config.observability.health_port,
        apisix.clone(),
        cancel.clone(),
    ));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("🛑 Shutdown signal received, stopping controllers");
            cancel.cancel();
        }
    });

    let provider = ControllerProvider::new(config.clone(), kube, apisix);
    let result = provider.run(cancel.clone()).await;
    cancel.cancel();

    match health.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Health server failed"),
        Err(err) => warn!(error = %err, "Health server task failed"),
    }

    if let Err(err) = result {
        error!(error = %err, "Controller failed");
        return Err(err.into());
    }
    info!("✅ Controller shutdown complete");
    Ok(())
}

/// Client from the configured kubeconfig, or the in-cluster / default one
async fn kube_client(config: &KubernetesConfig) -> anyhow::Result<kube::Client> {
    let kube_config = match &config.kubeconfig_path {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &kube::config::KubeConfigOptions::default())
                .await
                .context("invalid kubeconfig")?
        }
        None => kube::Config::infer().await.context("failed to infer kubernetes config")?,
    };
    kube::Client::try_from(kube_config).context("failed to build kubernetes client")
}

/// Resolves on SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

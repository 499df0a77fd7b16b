#![forbid(unsafe_code)]

mod options;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use ksm_collectors::{default_catalog, Builder, BuilderOptions};
use ksm_server::{metrics_router, serve, telemetry_router, MetricsHandler};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::options::{LogFormat, Options};

fn init_tracing(format: LogFormat) {
    let env = std::env::var("KSM_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => fmt.init(),
        LogFormat::Json => fmt.json().init(),
    }
}

fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().context("install prometheus recorder")?;
    let started = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    metrics::gauge!("process_start_time_seconds").set(started);
    Ok(handle)
}

async fn kube_client(kubeconfig: Option<&str>) -> Result<Client> {
    match kubeconfig {
        Some(path) if !path.is_empty() => {
            let kc = Kubeconfig::read_from(path).with_context(|| format!("read kubeconfig {path}"))?;
            let config = Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                .await
                .context("load kubeconfig")?;
            Client::try_from(config).context("build kube client")
        }
        _ => Client::try_default().await.context("infer kube client config"),
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
    cancel.cancel();
}

/// Log a fatal error through tracing before it is handed back to the runtime.
fn report(res: Result<()>) -> Result<()> {
    if let Err(e) = &res {
        error!(error = %format!("{e:#}"), "kruise-state-metrics exited with error");
    }
    res
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Options::parse();
    init_tracing(opts.log_format);
    report(run(opts).await)
}

async fn run(opts: Options) -> Result<()> {
    let telemetry = init_metrics()?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting kruise-state-metrics");

    let mode = opts.sharding_mode()?;
    if opts.awaits_shard_driver() {
        warn!(
            pod = opts.pod.as_deref().unwrap_or_default(),
            pod_namespace = opts.pod_namespace.as_deref().unwrap_or_default(),
            "autosharding selected by --pod/--pod-namespace but no shard driver is wired in; metrics stay empty until a shard is assigned"
        );
    }
    let filter = opts.family_filter()?;
    let client = kube_client(opts.kubeconfig.as_deref()).await?;
    let builder = Builder::new(
        Arc::new(default_catalog(client)),
        BuilderOptions {
            collectors: opts.collectors.clone(),
            namespaces: opts.namespaces.clone(),
            family_filter: Some(filter),
        },
    )?;
    info!(namespaces = ?builder.namespaces(), "watching namespaces (empty means all)");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let handler = Arc::new(MetricsHandler::new(builder, opts.enable_gzip_encoding, shutdown.clone()));
    let servers = async {
        let res = tokio::try_join!(
            serve("telemetry", opts.telemetry_addr(), telemetry_router(telemetry), shutdown.clone()),
            serve("metrics", opts.metrics_addr(), metrics_router(handler.clone()), shutdown.clone()),
        );
        if res.is_err() {
            shutdown.cancel();
        }
        res
    };
    let ((), servers) = tokio::join!(handler.run(mode), servers);
    servers?;
    info!("kruise-state-metrics stopped");
    Ok(())
}

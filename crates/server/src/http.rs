//! HTTP endpoints: the main metrics server and the self-telemetry server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handler::MetricsHandler;

pub const METRICS_PATH: &str = "/metrics";
pub const HEALTHZ_PATH: &str = "/healthz";
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const METRICS_INDEX: &str = r#"<html>
<head><title>Kruise Metrics Server</title></head>
<body>
<h1>Kruise Metrics</h1>
<ul>
<li><a href='/metrics'>metrics</a></li>
<li><a href='/healthz'>healthz</a></li>
</ul>
</body>
</html>"#;

const TELEMETRY_INDEX: &str = r#"<html>
<head><title>Kruise-State-Metrics Metrics Server</title></head>
<body>
<h1>Kruise-State-Metrics Metrics</h1>
<ul>
<li><a href='/metrics'>metrics</a></li>
</ul>
</body>
</html>"#;

/// Router for the object metrics: `/metrics`, `/healthz` and an index page.
pub fn metrics_router(handler: Arc<MetricsHandler>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(serve_metrics))
        .route(HEALTHZ_PATH, get(healthz))
        .route("/", get(|| async { Html(METRICS_INDEX) }))
        .with_state(handler)
}

/// Router for the exporter's own metrics.
pub fn telemetry_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route(METRICS_PATH, get(serve_telemetry))
        .route("/", get(|| async { Html(TELEMETRY_INDEX) }))
        .with_state(handle)
}

async fn serve_metrics(State(handler): State<Arc<MetricsHandler>>, headers: HeaderMap) -> Response {
    let accept = headers.get(header::ACCEPT_ENCODING).and_then(|v| v.to_str().ok());
    match handler.scrape(accept).await {
        Ok(scrape) => {
            let mut resp = (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], scrape.body).into_response();
            if scrape.gzip {
                resp.headers_mut().insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            }
            resp
        }
        Err(e) => {
            warn!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn serve_telemetry(State(handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], handle.render()).into_response()
}

async fn healthz() -> &'static str {
    "OK"
}

/// Bind `addr` and serve `router` until `shutdown` fires.
pub async fn serve(name: &'static str, addr: SocketAddr, router: Router, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {name} server to {addr}: {e}"))?;
    info!(server = name, %addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| anyhow::anyhow!("{name} server error: {e}"))?;
    info!(server = name, "stopped");
    Ok(())
}

//! kruise-state-metrics server: reconfigurable metrics handler and HTTP endpoints.

#![forbid(unsafe_code)]

pub mod handler;
pub mod http;

pub use handler::{accepts_gzip, MetricsHandler, Scrape, ShardingMode};
pub use http::{metrics_router, serve, telemetry_router};

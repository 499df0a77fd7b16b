use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use ksm_core::{AllowDenyList, Error, FamilyFilter, ShardAssignment};
use ksm_server::ShardingMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "kruise-state-metrics", version, about = "Expose OpenKruise workload state as Prometheus metrics")]
pub struct Options {
    /// Host to expose object metrics on.
    #[arg(long, env = "KSM_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,
    /// Port to expose object metrics on.
    #[arg(long, env = "KSM_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Host to expose exporter self-metrics on.
    #[arg(long, env = "KSM_TELEMETRY_HOST", default_value = "0.0.0.0")]
    pub telemetry_host: IpAddr,
    /// Port to expose exporter self-metrics on.
    #[arg(long, env = "KSM_TELEMETRY_PORT", default_value_t = 8081)]
    pub telemetry_port: u16,
    /// Comma-separated collectors to enable; empty enables all.
    #[arg(long, value_delimiter = ',', default_value = "clonesets")]
    pub collectors: Vec<String>,
    /// Comma-separated namespaces to watch; empty watches all.
    #[arg(long, value_delimiter = ',')]
    pub namespaces: Vec<String>,
    /// Comma-separated regexes of metric families to expose. Exclusive with the denylist.
    #[arg(long, value_delimiter = ',')]
    pub metric_allowlist: Vec<String>,
    /// Comma-separated regexes of metric families to hide. Exclusive with the allowlist.
    #[arg(long, value_delimiter = ',')]
    pub metric_denylist: Vec<String>,
    /// Zero-indexed shard ordinal of this instance.
    #[arg(long, default_value_t = 0)]
    pub shard: u32,
    /// Number of shards the object set is split across.
    #[arg(long, default_value_t = 1)]
    pub total_shards: u32,
    /// Pod name; with --pod-namespace the shard is assigned externally.
    #[arg(long, env = "POD_NAME")]
    pub pod: Option<String>,
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,
    /// Gzip responses for clients that accept it.
    #[arg(long)]
    pub enable_gzip_encoding: bool,
    /// Kubeconfig path; defaults to in-cluster or KUBECONFIG inference.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Options {
    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn telemetry_addr(&self) -> SocketAddr {
        SocketAddr::new(self.telemetry_host, self.telemetry_port)
    }

    pub fn family_filter(&self) -> Result<Arc<dyn FamilyFilter>, Error> {
        let list = AllowDenyList::new(self.metric_allowlist.iter(), self.metric_denylist.iter())?;
        Ok(Arc::new(list))
    }

    /// True when the shard is to be assigned by an external driver.
    pub fn awaits_shard_driver(&self) -> bool {
        matches!(self.sharding_mode(), Ok(ShardingMode::External))
    }

    pub fn sharding_mode(&self) -> Result<ShardingMode, Error> {
        match (&self.pod, &self.pod_namespace) {
            (Some(pod), Some(ns)) if !pod.is_empty() && !ns.is_empty() => Ok(ShardingMode::External),
            _ => Ok(ShardingMode::Static(ShardAssignment::new(self.shard, self.total_shards)?)),
        }
    }
}

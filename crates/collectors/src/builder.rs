//! Builder: validated configuration that assembles one store + watch tasks per enabled kind.

use std::sync::Arc;

use ksm_core::{Error, FamilyFilter, ShardAssignment};
use ksm_kubehub::WatchTasks;
use ksm_store::MetricsWriter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::{BuildContext, Catalog};

/// Raw builder inputs, validated as a whole by [`Builder::new`].
#[derive(Default)]
pub struct BuilderOptions {
    /// Collector names; empty selects every registered collector.
    pub collectors: Vec<String>,
    /// Namespaces to watch; empty watches cluster-wide.
    pub namespaces: Vec<String>,
    /// Required.
    pub family_filter: Option<Arc<dyn FamilyFilter>>,
}

/// Stores of one configuration (in collector order) and their watch tasks.
#[derive(Default)]
pub struct Built {
    pub stores: Vec<Arc<dyn MetricsWriter>>,
    pub tasks: WatchTasks,
}

pub struct Builder {
    catalog: Arc<Catalog>,
    collectors: Vec<String>,
    namespaces: Vec<String>,
    filter: Arc<dyn FamilyFilter>,
}

impl Builder {
    pub fn new(catalog: Arc<Catalog>, opts: BuilderOptions) -> Result<Self, Error> {
        let mut collectors = if opts.collectors.is_empty() { catalog.names() } else { opts.collectors };
        for name in &collectors {
            if !catalog.contains(name) {
                return Err(Error::UnknownCollector { name: name.clone(), available: catalog.names() });
            }
        }
        collectors.sort();
        collectors.dedup();

        let mut namespaces: Vec<String> = opts.namespaces.into_iter().filter(|ns| !ns.is_empty()).collect();
        namespaces.sort();
        namespaces.dedup();

        let filter = opts.family_filter.ok_or(Error::MissingFamilyFilter)?;
        Ok(Self { catalog, collectors, namespaces, filter })
    }

    pub fn collectors(&self) -> &[String] {
        &self.collectors
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Names of the families that survive the filter, per enabled collector order.
    pub fn enabled_families(&self) -> Vec<&'static str> {
        self.collectors
            .iter()
            .filter_map(|name| self.catalog.get(name))
            .flat_map(|c| c.family_names())
            .filter(|f| self.filter.is_included(f))
            .collect()
    }

    /// Build fresh stores under `shard`; every spawned task stops when `cancel` fires.
    pub fn build(&self, shard: ShardAssignment, cancel: &CancellationToken) -> Built {
        let ctx = BuildContext { filter: self.filter.as_ref(), namespaces: &self.namespaces, shard, cancel };
        let mut built = Built::default();
        for name in &self.collectors {
            if let Some(collector) = self.catalog.get(name) {
                let c = collector.build(&ctx);
                built.stores.push(c.store);
                built.tasks.extend(c.tasks);
            }
        }
        info!(collectors = %self.collectors.join(","), shard = shard.shard(), total_shards = shard.total(), "active collectors");
        debug!(families = %self.enabled_families().join(","), "enabled metric families");
        built
    }
}

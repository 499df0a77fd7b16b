//! Resource catalog: the registry of supported kinds, built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use ksm_core::{compose, extract_headers, filter_families, FamilyFilter, FamilyGenerator, ShardAssignment};
use ksm_kubehub::{spawn_reflector, Instrumented, ListWatch, Sharded, WatchTasks};
use ksm_store::{MetricsStore, MetricsWriter};
use kube::Resource;
use tokio_util::sync::CancellationToken;

pub type ListWatchFactory<K> = Arc<dyn Fn(Option<&str>) -> Box<dyn ListWatch<K>> + Send + Sync>;

/// Everything `Collector::build` needs from the current configuration.
pub struct BuildContext<'a> {
    pub filter: &'a dyn FamilyFilter,
    /// Empty means cluster-wide.
    pub namespaces: &'a [String],
    pub shard: ShardAssignment,
    pub cancel: &'a CancellationToken,
}

impl BuildContext<'_> {
    fn scopes(&self) -> Vec<Option<&str>> {
        if self.namespaces.is_empty() {
            vec![None]
        } else {
            self.namespaces.iter().map(|ns| Some(ns.as_str())).collect()
        }
    }
}

/// A freshly built store with the watch tasks feeding it.
pub struct BuiltCollector {
    pub store: Arc<dyn MetricsWriter>,
    pub tasks: WatchTasks,
}

/// Type-erased catalog entry.
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    fn family_names(&self) -> Vec<&'static str>;

    fn build(&self, ctx: &BuildContext<'_>) -> BuiltCollector;
}

/// Kind name, metric families, identity labels and list-watch constructor for `K`.
pub struct ResourceDescriptor<K> {
    name: &'static str,
    generators: Vec<FamilyGenerator<K>>,
    identity_keys: &'static [&'static str],
    identity_values: fn(&K) -> Vec<String>,
    list_watch: ListWatchFactory<K>,
}

impl<K> ResourceDescriptor<K> {
    pub fn new<F>(
        name: &'static str,
        generators: Vec<FamilyGenerator<K>>,
        identity_keys: &'static [&'static str],
        identity_values: fn(&K) -> Vec<String>,
        list_watch: F,
    ) -> Self
    where
        F: Fn(Option<&str>) -> Box<dyn ListWatch<K>> + Send + Sync + 'static,
    {
        Self { name, generators, identity_keys, identity_values, list_watch: Arc::new(list_watch) }
    }
}

impl<K> Collector for ResourceDescriptor<K>
where
    K: Resource + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn family_names(&self) -> Vec<&'static str> {
        self.generators.iter().map(|g| g.name).collect()
    }

    fn build(&self, ctx: &BuildContext<'_>) -> BuiltCollector {
        let generators = filter_families(ctx.filter, &self.generators);
        let headers = extract_headers(&generators);
        let composed = compose(generators, self.identity_keys, self.identity_values);
        let store = Arc::new(MetricsStore::new(self.name, headers, composed));

        let mut tasks = WatchTasks::default();
        for ns in ctx.scopes() {
            let lw = Instrumented::new((self.list_watch)(ns), self.name, ns);
            let lw = Sharded::new(lw, ctx.shard);
            tasks.push(spawn_reflector(self.name, ns, lw, Arc::clone(&store), ctx.cancel.clone()));
        }
        BuiltCollector { store, tasks }
    }
}

/// Explicit registry of collectors, keyed by name.
#[derive(Default)]
pub struct Catalog {
    collectors: BTreeMap<String, Arc<dyn Collector>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, collector: impl Collector + 'static) -> &mut Self {
        self.collectors.insert(collector.name().to_string(), Arc::new(collector));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Collector>> {
        self.collectors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collectors.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.collectors.keys().cloned().collect()
    }
}

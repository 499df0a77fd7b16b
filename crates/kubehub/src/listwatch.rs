//! List-watch sources. A source yields an initial `Restarted` snapshot followed
//! by incremental `Applied`/`Deleted` events; retries and relists are handled
//! by the kube watcher with its default backoff.

use std::fmt::Debug;
use std::time::Instant;

use futures::{future, stream, StreamExt};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::Api,
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client, Resource,
};
use ksm_core::{ObjectKey, ShardAssignment};
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;

use crate::scope_label;

pub type EventStream<K> = futures::stream::BoxStream<'static, watcher::Result<Event<K>>>;

/// Something that can list and then watch objects of kind `K`.
pub trait ListWatch<K>: Send + Sync + 'static {
    fn stream(&self) -> EventStream<K>;
}

impl<K: 'static> ListWatch<K> for Box<dyn ListWatch<K>> {
    fn stream(&self) -> EventStream<K> {
        (**self).stream()
    }
}

/// Kube API backed source for one namespace, or cluster-wide.
pub struct KubeListWatch<K> {
    api: Api<K>,
    config: watcher::Config,
}

impl<K> KubeListWatch<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// `None` watches all namespaces.
    pub fn scoped(client: Client, namespace: Option<&str>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        Self { api, config: watcher::Config::default() }
    }
}

impl<K> ListWatch<K> for KubeListWatch<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn stream(&self) -> EventStream<K> {
        watcher::watcher(self.api.clone(), self.config.clone()).default_backoff().boxed()
    }
}

/// In-memory source: replays fixed events, then stays open without further events.
/// Useful for tests and synthetic catalogs.
pub struct StaticListWatch<K> {
    events: Vec<Event<K>>,
}

impl<K: Clone> StaticListWatch<K> {
    /// A single initial list of `objects`.
    pub fn new(objects: Vec<K>) -> Self {
        Self { events: vec![Event::Restarted(objects)] }
    }

    pub fn with_events(events: Vec<Event<K>>) -> Self {
        Self { events }
    }
}

impl<K: Clone + Send + Sync + 'static> ListWatch<K> for StaticListWatch<K> {
    fn stream(&self) -> EventStream<K> {
        stream::iter(self.events.clone().into_iter().map(Ok)).chain(stream::pending()).boxed()
    }
}

/// Records list/watch call counts and initial list duration, labeled by resource and namespace.
pub struct Instrumented<L> {
    inner: L,
    resource: String,
    namespace: String,
}

impl<L> Instrumented<L> {
    pub fn new(inner: L, resource: &str, namespace: Option<&str>) -> Self {
        Self { inner, resource: resource.to_string(), namespace: scope_label(namespace) }
    }
}

impl<K: 'static, L: ListWatch<K>> ListWatch<K> for Instrumented<L> {
    fn stream(&self) -> EventStream<K> {
        let resource = self.resource.clone();
        let namespace = self.namespace.clone();
        let mut list_started = Some(Instant::now());
        self.inner
            .stream()
            .inspect(move |ev| {
                let (family, result) = match ev {
                    Ok(Event::Restarted(_)) => {
                        if let Some(started) = list_started.take() {
                            histogram!(
                                "kruise_state_metrics_list_duration_seconds",
                                "resource" => resource.clone(),
                                "namespace" => namespace.clone()
                            )
                            .record(started.elapsed().as_secs_f64());
                        }
                        ("kruise_state_metrics_list_total", "success")
                    }
                    Ok(_) => ("kruise_state_metrics_watch_total", "success"),
                    Err(e) => {
                        list_started.get_or_insert_with(Instant::now);
                        match e {
                            watcher::Error::InitialListFailed(_) => ("kruise_state_metrics_list_total", "error"),
                            _ => ("kruise_state_metrics_watch_total", "error"),
                        }
                    }
                };
                counter!(family, "resource" => resource.clone(), "namespace" => namespace.clone(), "result" => result)
                    .increment(1);
            })
            .boxed()
    }
}

/// Admits only objects whose identity hashes into `shard`.
pub struct Sharded<L> {
    inner: L,
    shard: ShardAssignment,
}

impl<L> Sharded<L> {
    pub fn new(inner: L, shard: ShardAssignment) -> Self {
        Self { inner, shard }
    }
}

impl<K: Resource + Send + 'static, L: ListWatch<K>> ListWatch<K> for Sharded<L> {
    fn stream(&self) -> EventStream<K> {
        if !self.shard.is_sharded() {
            return self.inner.stream();
        }
        let shard = self.shard;
        let owns = move |o: &K| shard.owns(&ObjectKey::of(o));
        self.inner
            .stream()
            .filter_map(move |ev| {
                let out = match ev {
                    Ok(Event::Applied(o)) => owns(&o).then_some(Ok(Event::Applied(o))),
                    Ok(Event::Deleted(o)) => owns(&o).then_some(Ok(Event::Deleted(o))),
                    Ok(Event::Restarted(list)) => {
                        Some(Ok(Event::Restarted(list.into_iter().filter(|o| owns(o)).collect())))
                    }
                    Err(e) => Some(Err(e)),
                };
                future::ready(out)
            })
            .boxed()
    }
}

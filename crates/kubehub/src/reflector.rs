//! Watch tasks: drive a list-watch source into a metrics store until cancelled.

use std::sync::Arc;

use futures::StreamExt;
use kube::{runtime::watcher::Event, Resource};
use ksm_store::MetricsStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{scope_label, ListWatch};

/// Handle of one (resource, namespace) watch task.
#[derive(Debug)]
pub struct WatchTask {
    pub resource: String,
    pub namespace: String,
    handle: JoinHandle<()>,
}

impl WatchTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to exit. Panics inside the task are logged, not propagated.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(resource = %self.resource, ns = %self.namespace, error = %e, "watch task did not exit cleanly");
        }
    }
}

/// Every watch task of one configuration.
#[derive(Debug, Default)]
pub struct WatchTasks {
    tasks: Vec<WatchTask>,
}

impl WatchTasks {
    pub fn push(&mut self, task: WatchTask) {
        self.tasks.push(task);
    }

    pub fn extend(&mut self, other: WatchTasks) {
        self.tasks.extend(other.tasks);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchTask> {
        self.tasks.iter()
    }

    /// Await every task. Callers cancel the shared token first.
    pub async fn join_all(self) {
        futures::future::join_all(self.tasks.into_iter().map(WatchTask::join)).await;
    }
}

/// Spawn a task that feeds `lw` into `store` until `cancel` fires or the stream ends.
pub fn spawn_reflector<K, L>(
    resource: &str,
    namespace: Option<&str>,
    lw: L,
    store: Arc<MetricsStore<K>>,
    cancel: CancellationToken,
) -> WatchTask
where
    K: Resource + Send + Sync + 'static,
    L: ListWatch<K>,
{
    let resource = resource.to_string();
    let scope = namespace.map(str::to_string);
    let namespace = scope_label(namespace);
    let handle = tokio::spawn({
        let resource = resource.clone();
        let namespace = namespace.clone();
        async move {
            let mut stream = lw.stream();
            info!(resource = %resource, ns = %namespace, "watcher started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(resource = %resource, ns = %namespace, "watcher cancelled");
                        break;
                    }
                    ev = stream.next() => match ev {
                        Some(Ok(Event::Applied(o))) => store.update(&o),
                        Some(Ok(Event::Deleted(o))) => store.delete(&o),
                        Some(Ok(Event::Restarted(list))) => {
                            debug!(resource = %resource, ns = %namespace, count = list.len(), "watch restart");
                            store.replace(scope.as_deref(), list);
                        }
                        Some(Err(e)) => {
                            warn!(resource = %resource, ns = %namespace, error = %e, "watch error; retrying with backoff");
                        }
                        None => {
                            warn!(resource = %resource, ns = %namespace, "watcher stream ended");
                            break;
                        }
                    }
                }
            }
        }
    });
    WatchTask { resource, namespace, handle }
}

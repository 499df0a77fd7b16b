//! kruise-state-metrics store: precomputed metric text per object, keyed by identity.

#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::sync::{Arc, PoisonError, RwLock};

use ksm_core::{ComposedFn, ObjectKey};
use kube::Resource;
use metrics::counter;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// Type-erased view of a store used by the serving path.
pub trait MetricsWriter: Send + Sync {
    /// Collector name the store was built for.
    fn resource(&self) -> &str;

    /// Render the family headers and every held object's text.
    fn write_all(&self, w: &mut dyn Write) -> io::Result<()>;
}

/// Rendered text of one object, one entry per family (in header order).
type Rendered = Arc<[String]>;

/// Concurrent keyed cache of rendered metric text for objects of type `K`.
///
/// Rendering happens outside the lock; an object's text is published in a
/// single map insert, so `write_all` never observes a partial entry.
pub struct MetricsStore<K> {
    resource: String,
    headers: Vec<String>,
    generate: ComposedFn<K>,
    entries: RwLock<FxHashMap<ObjectKey, Rendered>>,
}

impl<K: Resource> MetricsStore<K> {
    pub fn new(resource: impl Into<String>, headers: Vec<String>, generate: ComposedFn<K>) -> Self {
        Self { resource: resource.into(), headers, generate, entries: RwLock::new(FxHashMap::default()) }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).contains_key(key)
    }

    pub fn add(&self, obj: &K) {
        let key = ObjectKey::of(obj);
        match self.render(&key, obj) {
            Some(text) => {
                self.entries.write().unwrap_or_else(PoisonError::into_inner).insert(key, text);
            }
            None => self.delete_key(&key),
        }
    }

    pub fn update(&self, obj: &K) {
        self.add(obj)
    }

    pub fn delete(&self, obj: &K) {
        self.delete_key(&ObjectKey::of(obj))
    }

    pub fn delete_key(&self, key: &ObjectKey) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(key);
    }

    /// Swap the content of one watch scope for `objs` (initial list or relist).
    /// `Some(ns)` leaves entries of other namespaces alone; `None` swaps everything.
    pub fn replace(&self, namespace: Option<&str>, objs: impl IntoIterator<Item = K>) {
        let mut fresh = FxHashMap::default();
        for obj in objs {
            let key = ObjectKey::of(&obj);
            if let Some(text) = self.render(&key, &obj) {
                fresh.insert(key, text);
            }
        }
        debug!(resource = %self.resource, ns = namespace.unwrap_or(""), count = fresh.len(), "store replaced");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match namespace {
            Some(ns) => {
                entries.retain(|key, _| key.namespace.as_deref() != Some(ns));
                entries.extend(fresh);
            }
            None => *entries = fresh,
        }
    }

    fn render(&self, key: &ObjectKey, obj: &K) -> Option<Rendered> {
        match (self.generate)(obj) {
            Ok(families) => Some(families.iter().map(|f| f.render()).collect()),
            Err(e) => {
                warn!(resource = %self.resource, object = %key, error = %e, "skipping object: metric generation failed");
                counter!("kruise_state_metrics_generate_errors_total", "resource" => self.resource.clone()).increment(1);
                None
            }
        }
    }
}

impl<K: Resource + Send + Sync> MetricsWriter for MetricsStore<K> {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn write_all(&self, w: &mut dyn Write) -> io::Result<()> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut ordered: Vec<(&ObjectKey, &Rendered)> = entries.iter().collect();
        ordered.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (i, header) in self.headers.iter().enumerate() {
            w.write_all(header.as_bytes())?;
            w.write_all(b"\n")?;
            for (_, text) in &ordered {
                if let Some(lines) = text.get(i) {
                    w.write_all(lines.as_bytes())?;
                }
            }
        }
        Ok(())
    }
}

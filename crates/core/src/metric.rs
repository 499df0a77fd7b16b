//! Metric families: the per-object generator contract and text exposition rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::{FamilyFilter, GenerateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Counter,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }
}

/// One sample. `label_keys` and `label_values` always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metric {
    label_keys: SmallVec<[String; 4]>,
    label_values: SmallVec<[String; 4]>,
    pub value: f64,
}

impl Metric {
    pub fn new(value: f64) -> Self {
        Self { value, ..Default::default() }
    }

    /// Build a labeled sample. Pairs keep the order they are given in.
    pub fn labeled<I, K, V>(labels: I, value: f64) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut m = Self::new(value);
        for (k, v) in labels {
            m.label_keys.push(k.into());
            m.label_values.push(v.into());
        }
        m
    }

    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Insert `keys`/`values` ahead of the existing labels.
    fn prepend_labels(&mut self, keys: &[&str], values: &[String]) {
        debug_assert_eq!(keys.len(), values.len());
        let mut k: SmallVec<[String; 4]> = keys.iter().map(|s| s.to_string()).collect();
        let mut v: SmallVec<[String; 4]> = values.iter().cloned().collect();
        k.extend(self.label_keys.drain(..));
        v.extend(self.label_values.drain(..));
        self.label_keys = k;
        self.label_values = v;
    }

    fn write_to(&self, name: &str, out: &mut String) {
        out.push_str(name);
        if !self.label_keys.is_empty() {
            out.push('{');
            for (i, (k, v)) in self.label_keys.iter().zip(self.label_values.iter()).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push_str("=\"");
                escape_label_value(v, out);
                out.push('"');
            }
            out.push('}');
        }
        out.push(' ');
        write_value(self.value, out);
        out.push('\n');
    }
}

fn escape_label_value(v: &str, out: &mut String) {
    for c in v.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

fn write_value(v: f64, out: &mut String) {
    if v.is_nan() {
        out.push_str("NaN");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    } else {
        let _ = write!(out, "{}", v);
    }
}

/// Ordered samples of one named family for one object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Family {
    pub name: String,
    pub metrics: Vec<Metric>,
}

impl Family {
    pub fn from_metrics(metrics: Vec<Metric>) -> Self {
        Self { name: String::new(), metrics }
    }

    pub fn single(value: f64) -> Self {
        Self::from_metrics(vec![Metric::new(value)])
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Render every sample as exposition lines (no header).
    pub fn render(&self) -> String {
        let mut out = String::new();
        for m in &self.metrics {
            m.write_to(&self.name, &mut out);
        }
        out
    }
}

pub type GenerateFn<K> = fn(&K) -> Result<Family, GenerateError>;

/// Declaration of one metric family for objects of type `K`.
pub struct FamilyGenerator<K> {
    pub name: &'static str,
    pub kind: MetricType,
    pub help: &'static str,
    pub generate: GenerateFn<K>,
}

impl<K> Clone for FamilyGenerator<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for FamilyGenerator<K> {}

impl<K> std::fmt::Debug for FamilyGenerator<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyGenerator").field("name", &self.name).field("kind", &self.kind).finish()
    }
}

impl<K> FamilyGenerator<K> {
    pub fn new(name: &'static str, kind: MetricType, help: &'static str, generate: GenerateFn<K>) -> Self {
        Self { name, kind, help, generate }
    }

    /// `# HELP` / `# TYPE` lines without the trailing newline.
    pub fn header(&self) -> String {
        format!("# HELP {} {}\n# TYPE {} {}", self.name, self.help, self.name, self.kind.as_str())
    }
}

/// All families of one object, in generator order, identity labels already prepended.
pub type ComposedFn<K> = Arc<dyn Fn(&K) -> Result<Vec<Family>, GenerateError> + Send + Sync>;

pub fn filter_families<K>(filter: &dyn FamilyFilter, generators: &[FamilyGenerator<K>]) -> Vec<FamilyGenerator<K>> {
    generators.iter().filter(|g| filter.is_included(g.name)).copied().collect()
}

pub fn extract_headers<K>(generators: &[FamilyGenerator<K>]) -> Vec<String> {
    generators.iter().map(FamilyGenerator::header).collect()
}

/// Combine `generators` into one function. Every produced metric gets
/// `identity_keys`/`identity_values(obj)` as its leading labels.
pub fn compose<K: 'static>(
    generators: Vec<FamilyGenerator<K>>,
    identity_keys: &'static [&'static str],
    identity_values: fn(&K) -> Vec<String>,
) -> ComposedFn<K> {
    Arc::new(move |obj: &K| {
        let values = identity_values(obj);
        let mut out = Vec::with_capacity(generators.len());
        for g in &generators {
            let mut family = (g.generate)(obj)?;
            family.name = g.name.to_string();
            for m in family.metrics.iter_mut() {
                m.prepend_labels(identity_keys, &values);
            }
            out.push(family);
        }
        Ok(out)
    })
}

const CONDITION_STATUSES: [&str; 3] = ["True", "False", "Unknown"];

/// One sample per possible condition status; the observed one is 1, the others 0.
pub fn condition_metrics(condition: &str, observed: &str) -> [Metric; 3] {
    CONDITION_STATUSES.map(|status| {
        Metric::labeled(
            [("condition", condition), ("status", status)],
            bool_value(status == observed),
        )
    })
}

pub fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Kubernetes labels as `label_<sanitized key>` pairs, sorted by key.
/// When several keys sanitize to the same name only the first one in key order is kept.
pub fn kube_labels_to_prometheus(labels: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(labels.len());
    for (k, v) in labels {
        let name = format!("label_{}", sanitize_label_name(k));
        if seen.insert(name.clone()) {
            out.push((name, v.clone()));
        } else {
            debug!(key = %k, label = %name, "dropping kubernetes label that collides after sanitizing");
        }
    }
    out
}

pub fn sanitize_label_name(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

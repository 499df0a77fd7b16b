//! kruise-state-metrics core types: metric model, family filters, sharding.

#![forbid(unsafe_code)]

use std::fmt;

use kube::{Resource, ResourceExt};

pub mod error;
pub mod filter;
pub mod intstr;
pub mod metric;
pub mod shard;

pub use error::{Error, GenerateError};
pub use filter::{AllowDenyList, FamilyFilter};
pub use intstr::{resolve_int_or_percent, Rounding};
pub use metric::{
    compose, extract_headers, filter_families, ComposedFn, Family, FamilyGenerator, Metric,
    MetricType,
};
pub use shard::ShardAssignment;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stable identity of a watched object: namespace (absent for cluster-scoped kinds) and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self { namespace: namespace.map(str::to_string), name: name.to_string() }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        Self { namespace: obj.namespace(), name: obj.name_any() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

pub mod prelude {
    pub use super::{
        AllowDenyList, ComposedFn, Error, Family, FamilyFilter, FamilyGenerator, GenerateError,
        Metric, MetricType, ObjectKey, Rounding, ShardAssignment,
    };
}

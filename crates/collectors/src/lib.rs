//! kruise-state-metrics collectors: resource catalog, builder and the CloneSet families.

#![forbid(unsafe_code)]

pub mod builder;
pub mod catalog;
pub mod cloneset;

pub use builder::{Builder, BuilderOptions, Built};
pub use catalog::{BuildContext, BuiltCollector, Catalog, Collector, ResourceDescriptor};
pub use cloneset::CloneSet;

/// Catalog with every built-in collector wired to the kube API.
pub fn default_catalog(client: kube::Client) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register(cloneset::descriptor(client));
    catalog
}

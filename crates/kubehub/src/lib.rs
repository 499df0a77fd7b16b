//! kruise-state-metrics kubehub: list-watch sources, decorators and watch tasks.

#![forbid(unsafe_code)]

pub mod listwatch;
pub mod reflector;

pub use listwatch::{EventStream, Instrumented, KubeListWatch, ListWatch, Sharded, StaticListWatch};
pub use reflector::{spawn_reflector, WatchTask, WatchTasks};

/// Namespace label value used for cluster-wide watches.
pub const ALL_NAMESPACES: &str = "";

pub(crate) fn scope_label(namespace: Option<&str>) -> String {
    namespace.unwrap_or(ALL_NAMESPACES).to_string()
}

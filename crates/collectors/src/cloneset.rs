//! CloneSet (apps.kruise.io/v1alpha1) resource and its metric families.

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use ksm_core::metric::{bool_value, condition_metrics, kube_labels_to_prometheus};
use ksm_core::{resolve_int_or_percent, Family, FamilyGenerator, GenerateError, Metric, MetricType, Rounding};
use ksm_kubehub::{KubeListWatch, ListWatch};
use kube::{Client, CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

use crate::catalog::ResourceDescriptor;

pub const COLLECTOR: &str = "clonesets";

/// Identity labels leading every CloneSet sample.
pub const DEFAULT_LABELS: &[&str] = &["namespace", "cloneset"];

/// Replica count assumed when `spec.replicas` is unset (API server default).
const DEFAULT_REPLICAS: i32 = 1;

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize)]
#[kube(
    group = "apps.kruise.io",
    version = "v1alpha1",
    kind = "CloneSet",
    namespaced,
    status = "CloneSetStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub update_strategy: CloneSetUpdateStrategy,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetUpdateStrategy {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<IntOrString>,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub available_replicas: i32,
    #[serde(default)]
    pub updated_replicas: i32,
    #[serde(default)]
    pub updated_ready_replicas: i32,
    #[serde(default)]
    pub conditions: Vec<CloneSetCondition>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn status_value(cs: &CloneSet, f: fn(&CloneSetStatus) -> i64) -> f64 {
    cs.status.as_ref().map(f).unwrap_or(0) as f64
}

fn desired_replicas(cs: &CloneSet) -> i32 {
    cs.spec.replicas.unwrap_or(DEFAULT_REPLICAS)
}

fn rolling_update_bound(
    cs: &CloneSet,
    field: &'static str,
    value: Option<&IntOrString>,
    rounding: Rounding,
) -> Result<Family, GenerateError> {
    match value {
        None => Ok(Family::empty()),
        Some(v) => {
            let resolved = resolve_int_or_percent(field, v, desired_replicas(cs), rounding)?;
            Ok(Family::single(resolved as f64))
        }
    }
}

fn gauge(name: &'static str, help: &'static str, generate: fn(&CloneSet) -> Result<Family, GenerateError>) -> FamilyGenerator<CloneSet> {
    FamilyGenerator::new(name, MetricType::Gauge, help, generate)
}

pub fn families() -> Vec<FamilyGenerator<CloneSet>> {
    vec![
        gauge("kube_cloneset_created", "Unix creation timestamp", |cs| {
            let created = cs.metadata.creation_timestamp.as_ref().map(|t| t.0.timestamp() as f64);
            Ok(created.map(Family::single).unwrap_or_default())
        }),
        gauge("kube_cloneset_status_replicas", "The number of replicas per cloneset.", |cs| {
            Ok(Family::single(status_value(cs, |s| s.replicas.into())))
        }),
        gauge("kube_cloneset_status_replicas_available", "The number of available replicas per cloneset.", |cs| {
            Ok(Family::single(status_value(cs, |s| s.available_replicas.into())))
        }),
        gauge(
            "kube_cloneset_status_replicas_unavailable",
            "The number of unavailable replicas per cloneset.",
            |cs| Ok(Family::single(status_value(cs, |s| i64::from(s.replicas) - i64::from(s.available_replicas)))),
        ),
        gauge("kube_cloneset_status_replicas_updated", "The number of updated replicas per cloneset.", |cs| {
            Ok(Family::single(status_value(cs, |s| s.updated_replicas.into())))
        }),
        gauge(
            "kube_cloneset_status_replicas_ready_updated",
            "The number of ready updated replicas per cloneset.",
            |cs| Ok(Family::single(status_value(cs, |s| s.updated_ready_replicas.into()))),
        ),
        gauge(
            "kube_cloneset_status_observed_generation",
            "The generation observed by the cloneset controller.",
            |cs| Ok(Family::single(status_value(cs, |s| s.observed_generation))),
        ),
        gauge("kube_cloneset_status_condition", "The current status conditions of a cloneset.", |cs| {
            let conditions = cs.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default();
            let metrics = conditions.iter().flat_map(|c| condition_metrics(&c.type_, &c.status)).collect();
            Ok(Family::from_metrics(metrics))
        }),
        gauge("kube_cloneset_spec_replicas", "Number of desired pods for a cloneset.", |cs| {
            Ok(cs.spec.replicas.map(|r| Family::single(r as f64)).unwrap_or_default())
        }),
        gauge(
            "kube_cloneset_spec_paused",
            "Whether the cloneset is paused and will not be processed by the cloneset controller.",
            |cs| Ok(Family::single(bool_value(cs.spec.update_strategy.paused))),
        ),
        gauge(
            "kube_cloneset_spec_strategy_rollingupdate_max_unavailable",
            "Maximum number of unavailable replicas during a rolling update of a cloneset.",
            |cs| {
                let v = cs.spec.update_strategy.max_unavailable.as_ref();
                rolling_update_bound(cs, "spec.updateStrategy.maxUnavailable", v, Rounding::Down)
            },
        ),
        gauge(
            "kube_cloneset_spec_strategy_rollingupdate_max_surge",
            "Maximum number of replicas that can be scheduled above the desired number of replicas during a rolling update of a cloneset.",
            |cs| {
                let v = cs.spec.update_strategy.max_surge.as_ref();
                rolling_update_bound(cs, "spec.updateStrategy.maxSurge", v, Rounding::Up)
            },
        ),
        gauge(
            "kube_cloneset_metadata_generation",
            "Sequence number representing a specific generation of the desired state.",
            |cs| Ok(Family::single(cs.metadata.generation.unwrap_or_default() as f64)),
        ),
        gauge("kube_cloneset_labels", "Kubernetes labels converted to Prometheus labels.", |cs| {
            Ok(Family::from_metrics(vec![Metric::labeled(kube_labels_to_prometheus(cs.labels()), 1.0)]))
        }),
    ]
}

pub fn identity(cs: &CloneSet) -> Vec<String> {
    vec![cs.namespace().unwrap_or_default(), cs.name_any()]
}

/// Catalog entry for CloneSets backed by the kube API.
pub fn descriptor(client: Client) -> ResourceDescriptor<CloneSet> {
    ResourceDescriptor::new(
        COLLECTOR,
        families(),
        DEFAULT_LABELS,
        identity,
        move |ns| Box::new(KubeListWatch::<CloneSet>::scoped(client.clone(), ns)) as Box<dyn ListWatch<CloneSet>>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksm_core::compose;

    fn cloneset(v: serde_json::Value) -> CloneSet {
        serde_json::from_value(v).unwrap()
    }

    fn web() -> CloneSet {
        cloneset(serde_json::json!({
            "apiVersion": "apps.kruise.io/v1alpha1",
            "kind": "CloneSet",
            "metadata": {
                "name": "web",
                "namespace": "default",
                "generation": 4,
                "creationTimestamp": "2020-01-01T00:00:00Z",
                "labels": {"app": "web", "app.kubernetes.io/part-of": "shop"}
            },
            "spec": {
                "replicas": 11,
                "updateStrategy": {"maxUnavailable": "50%", "maxSurge": "50%", "paused": true}
            },
            "status": {
                "observedGeneration": 3,
                "replicas": 3,
                "availableReplicas": 2,
                "updatedReplicas": 1,
                "updatedReadyReplicas": 1,
                "conditions": [{"type": "FailedScale", "status": "False"}]
            }
        }))
    }

    fn render(cs: &CloneSet) -> String {
        let f = compose(families(), DEFAULT_LABELS, identity);
        f(cs).unwrap().iter().map(|fam| fam.render()).collect()
    }

    #[test]
    fn every_sample_leads_with_identity_labels() {
        let f = compose(families(), DEFAULT_LABELS, identity);
        let fams = f(&web()).unwrap();
        assert_eq!(fams.len(), 14);
        for fam in &fams {
            for m in &fam.metrics {
                assert_eq!(m.label_keys().len(), m.label_values().len());
                assert_eq!(&m.label_keys()[..2], &["namespace".to_string(), "cloneset".to_string()]);
                assert_eq!(&m.label_values()[..2], &["default".to_string(), "web".to_string()]);
            }
        }
    }

    #[test]
    fn replica_counts() {
        let out = render(&web());
        assert!(out.contains("kube_cloneset_status_replicas{namespace=\"default\",cloneset=\"web\"} 3\n"));
        assert!(out.contains("kube_cloneset_status_replicas_available{namespace=\"default\",cloneset=\"web\"} 2\n"));
        assert!(out.contains("kube_cloneset_status_replicas_unavailable{namespace=\"default\",cloneset=\"web\"} 1\n"));
        assert!(out.contains("kube_cloneset_status_replicas_updated{namespace=\"default\",cloneset=\"web\"} 1\n"));
        assert!(out.contains("kube_cloneset_status_observed_generation{namespace=\"default\",cloneset=\"web\"} 3\n"));
        assert!(out.contains("kube_cloneset_spec_replicas{namespace=\"default\",cloneset=\"web\"} 11\n"));
        assert!(out.contains("kube_cloneset_metadata_generation{namespace=\"default\",cloneset=\"web\"} 4\n"));
        assert!(out.contains("kube_cloneset_created{namespace=\"default\",cloneset=\"web\"} 1577836800\n"));
        assert!(out.contains("kube_cloneset_spec_paused{namespace=\"default\",cloneset=\"web\"} 1\n"));
    }

    #[test]
    fn rolling_update_bounds_round_per_field() {
        let out = render(&web());
        assert!(out.contains("kube_cloneset_spec_strategy_rollingupdate_max_unavailable{namespace=\"default\",cloneset=\"web\"} 5\n"));
        assert!(out.contains("kube_cloneset_spec_strategy_rollingupdate_max_surge{namespace=\"default\",cloneset=\"web\"} 6\n"));
    }

    #[test]
    fn absent_bounds_emit_nothing() {
        let mut cs = web();
        cs.spec.update_strategy.max_surge = None;
        cs.spec.update_strategy.max_unavailable = Some(IntOrString::Int(2));
        let out = render(&cs);
        assert!(!out.contains("max_surge"));
        assert!(out.contains("kube_cloneset_spec_strategy_rollingupdate_max_unavailable{namespace=\"default\",cloneset=\"web\"} 2\n"));
    }

    #[test]
    fn invalid_percent_is_an_error() {
        let mut cs = web();
        cs.spec.update_strategy.max_surge = Some(IntOrString::String("lots".into()));
        let f = compose(families(), DEFAULT_LABELS, identity);
        let err = f(&cs).unwrap_err();
        assert_eq!(
            err,
            GenerateError::InvalidIntOrPercent { field: "spec.updateStrategy.maxSurge", value: "lots".into() }
        );
    }

    #[test]
    fn condition_matrix() {
        let out = render(&web());
        assert!(out.contains("kube_cloneset_status_condition{namespace=\"default\",cloneset=\"web\",condition=\"FailedScale\",status=\"True\"} 0\n"));
        assert!(out.contains("kube_cloneset_status_condition{namespace=\"default\",cloneset=\"web\",condition=\"FailedScale\",status=\"False\"} 1\n"));
        assert!(out.contains("kube_cloneset_status_condition{namespace=\"default\",cloneset=\"web\",condition=\"FailedScale\",status=\"Unknown\"} 0\n"));
    }

    #[test]
    fn labels_family() {
        let out = render(&web());
        assert!(out.contains(
            "kube_cloneset_labels{namespace=\"default\",cloneset=\"web\",label_app=\"web\",label_app_kubernetes_io_part_of=\"shop\"} 1\n"
        ));
    }

    #[test]
    fn missing_status_and_replicas() {
        let cs = cloneset(serde_json::json!({
            "apiVersion": "apps.kruise.io/v1alpha1",
            "kind": "CloneSet",
            "metadata": {"name": "bare", "namespace": "ns"},
            "spec": {"updateStrategy": {"maxSurge": "100%"}}
        }));
        let out = render(&cs);
        assert!(!out.contains("kube_cloneset_created"));
        assert!(!out.contains("kube_cloneset_spec_replicas"));
        assert!(!out.contains("kube_cloneset_status_condition"));
        assert!(out.contains("kube_cloneset_status_replicas{namespace=\"ns\",cloneset=\"bare\"} 0\n"));
        assert!(out.contains("kube_cloneset_spec_strategy_rollingupdate_max_surge{namespace=\"ns\",cloneset=\"bare\"} 1\n"));
    }
}

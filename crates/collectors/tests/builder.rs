#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use ksm_collectors::cloneset::{self, CloneSet};
use ksm_collectors::{Builder, BuilderOptions, Built, Catalog, ResourceDescriptor};
use ksm_core::{AllowDenyList, Error, FamilyFilter, ShardAssignment};
use ksm_kubehub::{ListWatch, StaticListWatch};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;

fn cloneset(ns: &str, name: &str, replicas: i32, available: i32) -> CloneSet {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "apps.kruise.io/v1alpha1",
        "kind": "CloneSet",
        "metadata": {"name": name, "namespace": ns, "labels": {"app": name}},
        "spec": {"replicas": replicas},
        "status": {"replicas": replicas, "availableReplicas": available}
    }))
    .unwrap()
}

fn catalog(objects: Vec<CloneSet>) -> Arc<Catalog> {
    let mut catalog = Catalog::new();
    catalog.register(ResourceDescriptor::new(
        cloneset::COLLECTOR,
        cloneset::families(),
        cloneset::DEFAULT_LABELS,
        cloneset::identity,
        move |ns| {
            let scoped: Vec<CloneSet> = objects.iter().filter(|o| ns.is_none() || o.namespace().as_deref() == ns).cloned().collect();
            Box::new(StaticListWatch::new(scoped)) as Box<dyn ListWatch<CloneSet>>
        },
    ));
    Arc::new(catalog)
}

fn options(filter: AllowDenyList) -> BuilderOptions {
    BuilderOptions {
        collectors: vec!["clonesets".into()],
        namespaces: Vec::new(),
        family_filter: Some(Arc::new(filter) as Arc<dyn FamilyFilter>),
    }
}

async fn render_when(built: &Built, pred: impl Fn(&str) -> bool) -> String {
    for _ in 0..200 {
        let mut out = Vec::new();
        for s in &built.stores {
            s.write_all(&mut out).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        if pred(&text) {
            return text;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("stores never reached the expected state");
}

#[test]
fn unknown_collector_lists_available() {
    let mut opts = options(AllowDenyList::allow_all());
    opts.collectors = vec!["deployments".into()];
    let err = Builder::new(catalog(Vec::new()), opts).err().expect("must fail");
    match &err {
        Error::UnknownCollector { name, available } => {
            assert_eq!(name, "deployments");
            assert_eq!(available, &vec!["clonesets".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.to_string(), "collector deployments does not exist. Available collectors: clonesets");
}

#[test]
fn family_filter_is_required() {
    let mut opts = options(AllowDenyList::allow_all());
    opts.family_filter = None;
    let err = Builder::new(catalog(Vec::new()), opts).err().expect("must fail");
    assert!(matches!(err, Error::MissingFamilyFilter));
}

#[test]
fn collectors_and_namespaces_are_normalized() {
    let mut opts = options(AllowDenyList::allow_all());
    opts.collectors = vec!["clonesets".into(), "clonesets".into()];
    opts.namespaces = vec!["b".into(), "".into(), "a".into(), "b".into()];
    let b = Builder::new(catalog(Vec::new()), opts).unwrap();
    assert_eq!(b.collectors(), &["clonesets".to_string()]);
    assert_eq!(b.namespaces(), &["a".to_string(), "b".to_string()]);

    let mut opts = options(AllowDenyList::allow_all());
    opts.collectors.clear();
    let b = Builder::new(catalog(Vec::new()), opts).unwrap();
    assert_eq!(b.collectors(), &["clonesets".to_string()]);
}

#[tokio::test]
async fn end_to_end_render() {
    let b = Builder::new(catalog(vec![cloneset("default", "web", 3, 2)]), options(AllowDenyList::allow_all())).unwrap();
    let cancel = CancellationToken::new();
    let built = b.build(ShardAssignment::unsharded(), &cancel);
    assert_eq!(built.stores.len(), 1);
    assert_eq!(built.tasks.len(), 1);

    let text = render_when(&built, |t| t.contains("cloneset=\"web\"")).await;
    assert!(text.contains("kube_cloneset_status_replicas{namespace=\"default\",cloneset=\"web\"} 3\n"));
    assert!(text.contains("kube_cloneset_status_replicas_available{namespace=\"default\",cloneset=\"web\"} 2\n"));
    assert!(text.contains("kube_cloneset_status_replicas_unavailable{namespace=\"default\",cloneset=\"web\"} 1\n"));
    assert!(text.contains("# TYPE kube_cloneset_status_replicas gauge\n"));

    cancel.cancel();
    built.tasks.join_all().await;
}

#[tokio::test]
async fn excluded_family_leaves_others_unchanged() {
    let objects = vec![cloneset("default", "web", 3, 2), cloneset("prod", "api", 5, 5)];
    let cancel = CancellationToken::new();

    let full = Builder::new(catalog(objects.clone()), options(AllowDenyList::allow_all())).unwrap();
    let full = full.build(ShardAssignment::unsharded(), &cancel);
    let full_text = render_when(&full, |t| t.contains("cloneset=\"web\"") && t.contains("cloneset=\"api\"")).await;

    let deny = AllowDenyList::new(Vec::<String>::new(), ["kube_cloneset_labels"]).unwrap();
    let filtered = Builder::new(catalog(objects), options(deny)).unwrap();
    let filtered = filtered.build(ShardAssignment::unsharded(), &cancel);
    let filtered_text =
        render_when(&filtered, |t| t.contains("cloneset=\"web\"") && t.contains("cloneset=\"api\"")).await;

    assert!(!filtered_text.contains("kube_cloneset_labels"));
    let expected: String = full_text
        .lines()
        .filter(|l| !l.contains("kube_cloneset_labels"))
        .map(|l| format!("{}\n", l))
        .collect();
    assert_eq!(filtered_text, expected);

    cancel.cancel();
    full.tasks.join_all().await;
    filtered.tasks.join_all().await;
}

#[tokio::test]
async fn one_task_per_namespace() {
    let objects = vec![cloneset("a", "x", 1, 1), cloneset("b", "y", 1, 1), cloneset("c", "z", 1, 1)];
    let mut opts = options(AllowDenyList::allow_all());
    opts.namespaces = vec!["a".into(), "b".into()];
    let b = Builder::new(catalog(objects), opts).unwrap();
    let cancel = CancellationToken::new();
    let built = b.build(ShardAssignment::unsharded(), &cancel);
    let scopes: Vec<_> = built.tasks.iter().map(|t| t.namespace.clone()).collect();
    assert_eq!(scopes, vec!["a".to_string(), "b".to_string()]);

    let text = render_when(&built, |t| t.contains("cloneset=\"x\"") && t.contains("cloneset=\"y\"")).await;
    assert!(!text.contains("cloneset=\"z\""));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), built.tasks.join_all()).await.expect("tasks exit on cancel");
}

#[test]
fn enabled_families_follow_the_filter() {
    let all = Builder::new(catalog(Vec::new()), options(AllowDenyList::allow_all())).unwrap();
    let families = all.enabled_families();
    assert_eq!(families.len(), cloneset::families().len());
    assert!(families.contains(&"kube_cloneset_labels"));

    let allow = AllowDenyList::new(["kube_cloneset_status_replicas.*"], Vec::<String>::new()).unwrap();
    let some = Builder::new(catalog(Vec::new()), options(allow)).unwrap();
    let families = some.enabled_families();
    assert!(families.iter().all(|f| f.starts_with("kube_cloneset_status_replicas")));
    assert!(families.contains(&"kube_cloneset_status_replicas_available"));
    assert!(!families.contains(&"kube_cloneset_labels"));
}

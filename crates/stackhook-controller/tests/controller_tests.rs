//! Tests for stackhook-controller: resolution, render passes, setup, loop hosting, local store

use async_trait::async_trait;
use serde_json::json;
use stackhook_controller::*;
use stackhook_core::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CATALOG: &str = r#"
apiVersion: stacks.crossplane.io/v1alpha1
kind: StackConfiguration
metadata:
  name: stack-configuration
  namespace: default
spec:
  behaviors:
    source:
      image: example/widget-stack:0.1.0
    crds:
      Widget.example.com/v1:
        engine:
          type: helm2
        hooks:
          created:
            - directory: charts/widget
      Gadget.example.com/v1:
        hooks:
          created:
            - directory: charts/gadget
"#;

fn catalog() -> BehaviorCatalog {
    BehaviorCatalog::from_yaml(CATALOG).unwrap()
}

fn widget_type() -> TypeIdentity {
    TypeIdentity::new("example.com", "v1", "Widget")
}

fn instance(kind: &str, spec: serde_json::Value) -> Instance {
    Instance::new(json!({
        "apiVersion": "example.com/v1",
        "kind": kind,
        "metadata": {"name": "w1", "namespace": "team-a"},
        "spec": spec,
    }))
    .unwrap()
}

fn coordinator(
    cluster: Arc<MemoryCluster>,
    type_id: TypeIdentity,
    catalog: BehaviorCatalog,
) -> RenderCoordinator {
    RenderCoordinator::new(
        type_id,
        cluster,
        SharedCatalog::new(catalog),
        &ControllerConfig::default(),
        Arc::new(LogStatusReporter),
    )
}

fn jobs(cluster: &MemoryCluster) -> Vec<Instance> {
    cluster.objects_of("batch/v1", "Job")
}

fn config_maps(cluster: &MemoryCluster) -> Vec<Instance> {
    cluster.objects_of("v1", "ConfigMap")
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

// ===========================================================================
// Resolution
// ===========================================================================

#[test]
fn unknown_type_has_no_behavior() {
    let gizmo = Instance::new(json!({
        "apiVersion": "other.io/v2",
        "kind": "Gizmo",
        "metadata": {"name": "g", "namespace": "ns"}
    }))
    .unwrap();
    let resolution = resolve(&gizmo, &catalog(), EventName::Created).unwrap();
    assert_eq!(
        resolution,
        Resolution::NoBehaviorConfigured(TypeKey::from("Gizmo.other.io/v2"))
    );
}

#[test]
fn event_without_hooks() {
    let resolution = resolve(&instance("Widget", json!({})), &catalog(), EventName::Deleted).unwrap();
    assert!(matches!(resolution, Resolution::NoHooksForEvent(_, EventName::Deleted)));
}

#[test]
fn type_level_engine_beats_catalog_default() {
    let mut catalog = catalog();
    catalog.default_engine = EngineChoice {
        engine_type: EngineType::Overlay,
        kustomize: None,
    };
    let resolution = resolve(&instance("Widget", json!({})), &catalog, EventName::Created).unwrap();
    assert_eq!(resolution.hooks()[0].engine.engine_type, EngineType::Chart);
}

#[test]
fn catalog_default_used_when_type_is_empty() {
    let mut catalog = catalog();
    catalog.default_engine = EngineChoice::chart();
    let resolution = resolve(&instance("Gadget", json!({})), &catalog, EventName::Created).unwrap();
    assert_eq!(resolution.hooks()[0].engine.engine_type, EngineType::Chart);
}

#[test]
fn hook_order_preserved() {
    let mut catalog = catalog();
    let behavior = catalog
        .behaviors
        .get_mut(&TypeKey::from("Widget.example.com/v1"))
        .unwrap();
    behavior.set_hooks(
        EventName::Updated,
        vec![HookSpec::new("first"), HookSpec::new("second"), HookSpec::new("third")],
    );
    let resolution = resolve(&instance("Widget", json!({})), &catalog, EventName::Updated).unwrap();
    let directories: Vec<&str> = resolution.hooks().iter().map(|h| h.directory.as_str()).collect();
    assert_eq!(directories, vec!["first", "second", "third"]);
    match resolution {
        Resolution::Hooks(resolved) => {
            assert_eq!(resolved.source.as_deref(), Some("example/widget-stack:0.1.0"))
        }
        other => panic!("expected hooks, got {:?}", other),
    }
}

// ===========================================================================
// Render passes
// ===========================================================================

#[tokio::test]
async fn created_widget_renders_chart() {
    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({"replicas": 3}))).unwrap();
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog());

    let report = coordinator
        .reconcile(&ReconcileRequest::new(widget.key()))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Executed);
    assert_eq!(report.event, Some(EventName::Created));
    assert!(report.first_error().is_none());
    assert_eq!(report.hooks.len(), 1);

    let maps = config_maps(&cluster);
    assert_eq!(maps.len(), 1);
    let map = &maps[0];
    assert!(map.name().starts_with(&format!("{}-", widget.uid())));
    assert_eq!(map.name().len(), widget.uid().len() + 11);
    assert_eq!(map.namespace(), "team-a");
    assert_eq!(map.as_value()["data"]["values.yaml"], json!("replicas: 3\n"));

    let jobs = jobs(&cluster);
    assert_eq!(jobs.len(), 1);
    let job: Job = jobs[0].clone().into_typed().unwrap();
    assert!(job.metadata.name.starts_with("helm-template-apply-"));
    assert_eq!(job.metadata.owner_references[0].uid, widget.uid());
    assert_eq!(job.spec.backoff_limit, 0);
    let pod = &job.spec.template.spec;
    assert_eq!(pod.init_containers.len() + pod.containers.len(), 3);
    assert!(pod.init_containers[0].command[2].starts_with("/.registry/resources/charts/widget"));

    let submitted: Vec<&Submission> = report.submitted().collect();
    assert_eq!(submitted[0].config.name, map.name());
    assert_eq!(submitted[0].job_name, job.metadata.name);
}

#[tokio::test]
async fn no_engine_anywhere_creates_nothing() {
    let cluster = Arc::new(MemoryCluster::new());
    let gadget = cluster.insert(instance("Gadget", json!({"size": 1}))).unwrap();
    let coordinator = coordinator(
        cluster.clone(),
        TypeIdentity::new("example.com", "v1", "Gadget"),
        catalog(),
    );

    let report = coordinator
        .reconcile(&ReconcileRequest::new(gadget.key()))
        .await
        .unwrap();

    assert!(matches!(report.first_error(), Some(Error::UnrecognizedEngine(_))));
    assert!(!report.should_retry());
    assert!(config_maps(&cluster).is_empty());
    assert!(jobs(&cluster).is_empty());
}

#[tokio::test]
async fn ungoverned_type_creates_nothing() {
    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({"replicas": 3}))).unwrap();
    let coordinator = coordinator(cluster.clone(), widget_type(), BehaviorCatalog::default());

    let report = coordinator
        .reconcile(&ReconcileRequest::new(widget.key()))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::NoBehaviorConfigured);
    assert_eq!(cluster.len(), 1);
}

#[derive(Clone, Default)]
struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[tokio::test]
async fn configuration_absence_logs_at_info() {
    let logs = LogCapture::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({}))).unwrap();

    let ungoverned = coordinator(cluster.clone(), widget_type(), BehaviorCatalog::default());
    ungoverned
        .reconcile(&ReconcileRequest::new(widget.key()))
        .await
        .unwrap();

    let governed = coordinator(cluster.clone(), widget_type(), catalog());
    let report = governed
        .reconcile(&ReconcileRequest::new(widget.key()).with_event(EventName::Deleted))
        .await
        .unwrap();
    assert_eq!(report.outcome, PassOutcome::NoHooksForEvent);

    let output = logs.contents();
    assert!(output
        .lines()
        .any(|l| l.contains("INFO") && l.contains("no behavior configured")));
    assert!(output
        .lines()
        .any(|l| l.contains("INFO") && l.contains("no hooks for event")));
}

#[tokio::test]
async fn missing_instance_is_noop() {
    let cluster = Arc::new(MemoryCluster::new());
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog());

    let report = coordinator
        .reconcile(&ReconcileRequest::new(ObjectKey::new("team-a", "gone")))
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::InstanceGone);
    assert!(cluster.is_empty());
}

#[tokio::test]
async fn failing_hook_does_not_stop_later_hooks() {
    let mut catalog = catalog();
    let behavior = catalog
        .behaviors
        .get_mut(&TypeKey::from("Widget.example.com/v1"))
        .unwrap();
    behavior.set_hooks(
        EventName::Created,
        vec![
            HookSpec::new("overlays/widget").with_engine(EngineChoice {
                engine_type: EngineType::Overlay,
                kustomize: None,
            }),
            HookSpec::new("charts/widget"),
        ],
    );

    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({"replicas": 3}))).unwrap();
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog);

    let report = coordinator
        .reconcile(&ReconcileRequest::new(widget.key()))
        .await
        .unwrap();

    let failed: Vec<usize> = report.failed_hooks().map(|h| h.index).collect();
    assert_eq!(failed, vec![0]);
    assert!(matches!(report.first_error(), Some(Error::EngineConfig { .. })));
    assert_eq!(report.submitted().count(), 1);
    assert_eq!(jobs(&cluster).len(), 1);
}

#[tokio::test]
async fn store_failure_requests_redelivery() {
    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({"replicas": 3}))).unwrap();
    cluster.fail_creates_of("Job", "scheduler unavailable");
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog());

    let report = coordinator
        .reconcile(&ReconcileRequest::new(widget.key()))
        .await
        .unwrap();
    assert!(report.should_retry());
    assert!(matches!(report.first_error(), Some(Error::Cluster(_))));

    let action = coordinator.handle(ReconcileRequest::new(widget.key())).await.unwrap();
    assert_eq!(action, Action::Requeue);
}

#[tokio::test]
async fn rerender_reuses_config_map() {
    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({"replicas": 3}))).unwrap();
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog());
    let request = ReconcileRequest::new(widget.key());

    let first = coordinator.reconcile(&request).await.unwrap();
    let second = coordinator.reconcile(&request).await.unwrap();

    let first: Vec<&Submission> = first.submitted().collect();
    let second: Vec<&Submission> = second.submitted().collect();
    assert!(first[0].config.created);
    assert!(!second[0].config.created);
    assert_eq!(first[0].config.name, second[0].config.name);
    assert_eq!(config_maps(&cluster).len(), 1);
    assert_eq!(jobs(&cluster).len(), 2);
}

#[tokio::test]
async fn missing_source_fails_before_distribution() {
    let mut catalog = catalog();
    catalog.source = None;
    let cluster = Arc::new(MemoryCluster::new());
    let widget = cluster.insert(instance("Widget", json!({"replicas": 3}))).unwrap();
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog);

    let report = coordinator
        .reconcile(&ReconcileRequest::new(widget.key()))
        .await
        .unwrap();

    assert!(matches!(report.first_error(), Some(Error::MissingArtifactSource(_))));
    assert!(config_maps(&cluster).is_empty());
}

#[tokio::test]
async fn deletion_runs_deleted_hooks() {
    let mut catalog = catalog();
    let behavior = catalog
        .behaviors
        .get_mut(&TypeKey::from("Widget.example.com/v1"))
        .unwrap();
    behavior.set_hooks(EventName::Deleted, vec![HookSpec::new("charts/cleanup")]);

    let cluster = Arc::new(MemoryCluster::new());
    let mut deleting = instance("Widget", json!({}));
    deleting.set_metadata("deletionTimestamp", "2024-01-01T00:00:00Z");
    let deleting = cluster.insert(deleting).unwrap();
    let coordinator = coordinator(cluster.clone(), widget_type(), catalog);

    let report = coordinator
        .reconcile(&ReconcileRequest::new(deleting.key()).with_event(EventName::Updated))
        .await
        .unwrap();

    assert_eq!(report.event, Some(EventName::Deleted));
    assert_eq!(report.submitted().count(), 1);
}

struct StalledCluster;

#[async_trait]
impl Cluster for StalledCluster {
    async fn get(&self, _type_id: &TypeIdentity, _key: &ObjectKey) -> Result<Instance> {
        std::future::pending().await
    }

    async fn create(&self, object: Instance) -> Result<Instance> {
        Ok(object)
    }

    async fn list(&self, _type_id: &TypeIdentity) -> Result<Vec<Instance>> {
        Ok(Vec::new())
    }

    fn location(&self) -> String {
        "stalled".into()
    }
}

#[tokio::test]
async fn pass_deadline_abandons_stalled_reads() {
    let mut config = ControllerConfig::default();
    config.reconcile.pass_timeout_secs = 0;
    let coordinator = RenderCoordinator::new(
        widget_type(),
        Arc::new(StalledCluster),
        SharedCatalog::new(catalog()),
        &config,
        Arc::new(LogStatusReporter),
    );

    let err = coordinator
        .reconcile(&ReconcileRequest::new(ObjectKey::new("team-a", "w1")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded(_)));
    assert!(err.is_transient());
}

// ===========================================================================
// Setup
// ===========================================================================

fn setup_coordinator(cluster: Arc<MemoryCluster>) -> (SetupCoordinator, Arc<ControllerRegistry>) {
    let host = Arc::new(ChannelHost::new(Duration::from_millis(10), 8));
    let registry = Arc::new(ControllerRegistry::new());
    let setup = SetupCoordinator::new(
        cluster,
        host,
        registry.clone(),
        Arc::new(LogStatusReporter),
        ControllerConfig::default(),
    );
    (setup, registry)
}

#[tokio::test]
async fn setup_registers_each_type_once() {
    let (setup, registry) = setup_coordinator(Arc::new(MemoryCluster::new()));

    let first = setup.setup(catalog()).await;
    assert_eq!(first.registered.len(), 2);
    assert!(first.is_clean());

    let second = setup.setup(catalog()).await;
    assert!(second.registered.is_empty());
    assert_eq!(second.skipped.len(), 2);
    assert_eq!(
        registry.keys(),
        vec![TypeKey::from("Gadget.example.com/v1"), TypeKey::from("Widget.example.com/v1")]
    );

    registry.shutdown().await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn setup_reports_unparseable_keys() {
    let (setup, registry) = setup_coordinator(Arc::new(MemoryCluster::new()));
    let mut catalog = catalog();
    catalog.behaviors.insert(TypeKey::from("NoGroupOrVersion"), Behavior::default());

    let report = setup.setup(catalog).await;
    assert_eq!(report.registered.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.should_retry());
    registry.shutdown().await;
}

#[tokio::test]
async fn sync_reads_catalog_object() {
    let cluster = Arc::new(MemoryCluster::new());
    let (setup, registry) = setup_coordinator(cluster.clone());
    let key = ObjectKey::new("default", "stack-configuration");

    assert!(setup.sync(&key).await.unwrap().is_none());

    cluster.insert(Instance::from_yaml(CATALOG).unwrap()).unwrap();
    let report = setup.sync(&key).await.unwrap().unwrap();
    assert_eq!(report.registered.len(), 2);
    assert_eq!(setup.catalog().snapshot().await.len(), 2);
    registry.shutdown().await;
}

#[tokio::test]
async fn registered_loop_renders_on_request() {
    let cluster = Arc::new(MemoryCluster::new());
    let (setup, registry) = setup_coordinator(cluster.clone());
    setup.setup(catalog()).await;

    let widget = cluster.insert(instance("Widget", json!({"replicas": 2}))).unwrap();
    let queue = registry
        .sender(&TypeKey::from("Widget.example.com/v1"))
        .unwrap();
    queue.send(ReconcileRequest::new(widget.key())).await.unwrap();

    wait_for(|| jobs(&cluster).len() == 1).await;
    registry.shutdown().await;
}

// ===========================================================================
// Loop hosting
// ===========================================================================

struct Recorder {
    active: AtomicUsize,
    max_active: AtomicUsize,
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Reconciler for Recorder {
    async fn handle(&self, request: ReconcileRequest) -> Result<Action> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        let _ = self.seen.send(request.key.name);
        Ok(Action::Done)
    }
}

#[tokio::test]
async fn one_request_at_a_time_per_type() {
    let (seen, mut rx) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
        seen,
    });
    let host = ChannelHost::new(Duration::from_millis(10), 16);
    let handle = host.register(widget_type(), recorder.clone()).await.unwrap();

    for i in 0..5 {
        handle
            .enqueue(ReconcileRequest::new(ObjectKey::new("ns", format!("w{}", i))))
            .await
            .unwrap();
    }

    let mut order = Vec::new();
    for _ in 0..5 {
        let name = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        order.push(name);
    }
    assert_eq!(order, vec!["w0", "w1", "w2", "w3", "w4"]);
    assert_eq!(recorder.max_active.load(Ordering::SeqCst), 1);
    handle.join().await;
}

// ===========================================================================
// Local cluster
// ===========================================================================

#[tokio::test]
async fn local_cluster_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new(tmp.path());

    let created = cluster.create(instance("Widget", json!({"replicas": 3}))).await.unwrap();
    assert!(!created.uid().is_empty());
    assert!(tmp.path().join("example.com/v1/Widget/team-a/w1.yaml").exists());

    let read = cluster.get(&widget_type(), &created.key()).await.unwrap();
    assert_eq!(read, created);

    let err = cluster.create(instance("Widget", json!({}))).await.unwrap_err();
    assert!(err.is_already_exists());

    let err = cluster
        .get(&widget_type(), &ObjectKey::new("team-a", "missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let listed = cluster.list(&widget_type()).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn local_cluster_generates_names() {
    let tmp = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new(tmp.path());
    let job = Instance::new(json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {"generateName": "helm-template-apply-", "namespace": "team-a"}
    }))
    .unwrap();

    let a = cluster.create(job.clone()).await.unwrap();
    let b = cluster.create(job).await.unwrap();
    assert!(a.name().starts_with("helm-template-apply-"));
    assert_ne!(a.name(), b.name());
    assert_eq!(cluster.list(&TypeIdentity::new("batch", "v1", "Job")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn directory_snapshot_reports_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let cluster = LocalCluster::new(tmp.path());
    let dir = local::type_dir(tmp.path(), &widget_type());
    let mut snapshot = watcher::DirectorySnapshot::default();

    assert!(snapshot.rescan(&dir).is_empty());

    let widget = cluster.put(instance("Widget", json!({}))).await.unwrap();
    assert_eq!(snapshot.rescan(&dir), vec![widget.key()]);
    assert!(snapshot.rescan(&dir).is_empty());

    std::fs::remove_file(cluster.object_path(&widget_type(), &widget.key())).unwrap();
    assert_eq!(snapshot.rescan(&dir), vec![widget.key()]);
}

// ===========================================================================
// Config
// ===========================================================================

#[test]
fn config_images_override() {
    let config = ControllerConfig::parse(
        r#"
[images]
chart = "registry.local/helm-engine:2"
"#,
    )
    .unwrap();
    assert_eq!(config.images.chart, "registry.local/helm-engine:2");
    assert_eq!(config.images.apply, "crossplane/kubectl:latest");
}

#[test]
fn config_rejects_bad_types() {
    let err = ControllerConfig::parse("[reconcile]\nrequeue_secs = \"soon\"\n").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

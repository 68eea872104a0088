//! End-to-end lifecycle through the persister, queue and actuator.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use steward_core::{
    ActuationEventKind, ChannelCheckQueue, CheckOutcome, EventPublisher, HandlerRegistry,
    InMemoryResourceRepository, Resource, ResourceActuator, ResourceCheckEvent, ResourceDiff,
    ResourceHandler, ResourceKind, ResourcePersister, ResourceRepository,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClusterSpec {
    replicas: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Create(String),
    Update(String, String),
    Finalize(String),
}

/// Cloud stand-in: holds observed specs and records every mutation.
#[derive(Default)]
struct FakeCloud {
    observed: Mutex<Option<ClusterSpec>>,
    calls: Mutex<Vec<Call>>,
}

struct ClusterHandler(Arc<FakeCloud>);

#[async_trait]
impl ResourceHandler for ClusterHandler {
    type Spec = ClusterSpec;

    fn supported_kind(&self) -> ResourceKind {
        ResourceKind::new("v1", "cluster")
    }

    async fn current(
        &self,
        _resource: &Resource<ClusterSpec>,
    ) -> steward_core::handler::Result<Option<ClusterSpec>> {
        Ok(self.0.observed.lock().unwrap().clone())
    }

    async fn create(&self, resource: &Resource<ClusterSpec>) -> steward_core::handler::Result<()> {
        self.0
            .calls
            .lock()
            .unwrap()
            .push(Call::Create(resource.name().to_string()));
        *self.0.observed.lock().unwrap() = Some(resource.spec.clone());
        Ok(())
    }

    async fn update(
        &self,
        resource: &Resource<ClusterSpec>,
        diff: &ResourceDiff,
    ) -> steward_core::handler::Result<()> {
        self.0
            .calls
            .lock()
            .unwrap()
            .push(Call::Update(resource.name().to_string(), diff.to_debug()));
        *self.0.observed.lock().unwrap() = Some(resource.spec.clone());
        Ok(())
    }

    async fn finalize(&self, name: &str) -> steward_core::handler::Result<()> {
        self.0.calls.lock().unwrap().push(Call::Finalize(name.to_string()));
        *self.0.observed.lock().unwrap() = None;
        Ok(())
    }
}

/// Records observed kinds so tests can assert dispatch.
struct NamedHandler {
    kind: ResourceKind,
    seen: Arc<Mutex<Vec<(ResourceKind, String)>>>,
}

#[async_trait]
impl ResourceHandler for NamedHandler {
    type Spec = serde_json::Value;

    fn supported_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    async fn current(
        &self,
        resource: &Resource<serde_json::Value>,
    ) -> steward_core::handler::Result<Option<serde_json::Value>> {
        self.seen
            .lock()
            .unwrap()
            .push((self.kind.clone(), resource.name().to_string()));
        Ok(Some(resource.spec.clone()))
    }

    async fn create(
        &self,
        _resource: &Resource<serde_json::Value>,
    ) -> steward_core::handler::Result<()> {
        Ok(())
    }

    async fn update(
        &self,
        _resource: &Resource<serde_json::Value>,
        _diff: &ResourceDiff,
    ) -> steward_core::handler::Result<()> {
        Ok(())
    }
}

fn web_1(replicas: u32) -> Resource {
    Resource::new(
        ResourceKind::new("v1", "cluster"),
        "web-1",
        json!({"replicas": replicas}),
    )
}

#[tokio::test]
async fn test_create_update_delete_lifecycle() {
    let cloud = Arc::new(FakeCloud::default());
    let repo = Arc::new(InMemoryResourceRepository::new());
    let mut registry = HandlerRegistry::new();
    registry.register(ClusterHandler(cloud.clone()));
    let registry = Arc::new(registry);

    let (queue, mut checks) = ChannelCheckQueue::new(16);
    let persister = ResourcePersister::new(repo.clone(), registry.clone(), Arc::new(queue));
    let events = EventPublisher::default();
    let mut subscriber = events.subscribe();
    let actuator = ResourceActuator::new(
        repo.clone(),
        registry,
        events,
        std::time::Duration::from_secs(5),
    );

    // CREATE stores the resource and requests exactly one check.
    persister.create(web_1(3)).await.unwrap();
    assert_eq!(repo.get("web-1").await.unwrap().spec, json!({"replicas": 3}));
    let check = checks.recv().await.unwrap();
    assert_eq!(check, ResourceCheckEvent::new("web-1", "v1", "cluster"));

    // The cloud already runs an older shape of the cluster.
    *cloud.observed.lock().unwrap() = Some(ClusterSpec { replicas: 1 });
    assert_eq!(actuator.check_resource(&check).await.unwrap(), CheckOutcome::Updated);
    assert_eq!(
        *cloud.calls.lock().unwrap(),
        vec![Call::Update("web-1".into(), "<root>:\n  replicas: 1 -> 3\n".into())]
    );

    let kinds: Vec<&'static str> = std::iter::from_fn(|| subscriber.try_recv().ok())
        .map(|event| event.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec!["resource_delta_detected", "resource_actuation_launched"]
    );

    // Converged: a second pass is a no-op.
    assert_eq!(actuator.check_resource(&check).await.unwrap(), CheckOutcome::Valid);
    assert_eq!(cloud.calls.lock().unwrap().len(), 1);
    assert!(matches!(
        subscriber.try_recv().unwrap().kind,
        ActuationEventKind::ResourceValid
    ));

    // DELETE removes the resource and requests one final check.
    persister.delete(web_1(3)).await.unwrap();
    assert!(repo.is_empty().await);
    let check = checks.recv().await.unwrap();
    assert_eq!(actuator.check_resource(&check).await.unwrap(), CheckOutcome::Finalized);
    assert_eq!(
        cloud.calls.lock().unwrap().last(),
        Some(&Call::Finalize("web-1".into()))
    );

    drop(persister);
    assert!(checks.recv().await.is_none());
}

#[tokio::test]
async fn test_checks_dispatch_to_the_handler_for_their_kind() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cluster = ResourceKind::new("v1", "cluster");
    let bucket = ResourceKind::new("storage/v2", "bucket");

    let mut registry = HandlerRegistry::new();
    registry
        .register(NamedHandler {
            kind: cluster.clone(),
            seen: seen.clone(),
        })
        .register(NamedHandler {
            kind: bucket.clone(),
            seen: seen.clone(),
        });

    let repo = Arc::new(InMemoryResourceRepository::new());
    repo.store(&Resource::new(cluster.clone(), "web-1", json!({"replicas": 1})))
        .await
        .unwrap();
    repo.store(&Resource::new(bucket.clone(), "assets", json!({"public": false})))
        .await
        .unwrap();

    let actuator = ResourceActuator::new(
        repo,
        Arc::new(registry),
        EventPublisher::default(),
        std::time::Duration::from_secs(5),
    );

    for check in [
        ResourceCheckEvent::new("web-1", "v1", "cluster"),
        ResourceCheckEvent::new("assets", "storage/v2", "bucket"),
    ] {
        assert_eq!(actuator.check_resource(&check).await.unwrap(), CheckOutcome::Valid);
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(cluster, "web-1".to_string()), (bucket, "assets".to_string())]
    );
}

#[tokio::test]
async fn test_unknown_kind_fails_without_touching_other_handlers() {
    let cloud = Arc::new(FakeCloud::default());
    let mut registry = HandlerRegistry::new();
    registry.register(ClusterHandler(cloud.clone()));

    let actuator = ResourceActuator::new(
        Arc::new(InMemoryResourceRepository::new()),
        Arc::new(registry),
        EventPublisher::default(),
        std::time::Duration::from_secs(5),
    );

    let err = actuator
        .check_resource(&ResourceCheckEvent::new("web-1", "v1", "load-balancer"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("v1/load-balancer"));
    assert!(cloud.calls.lock().unwrap().is_empty());
}

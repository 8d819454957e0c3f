//! End-to-end tests: config → write → build → check over the memory store.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rsacl_domain::{Acl, ClosureCacheStore, NsObject, TupleRelationChecker};
use rsacl_server::builder::BuilderConfig;
use rsacl_server::handlers::{CheckSource, RebuildTrigger};
use rsacl_server::{
    CacheBuildOrchestrator, CheckHandler, CheckRequest, DataStoreClosureCache,
    DataStoreTupleReader, ServerConfig, WriteHandler,
};
use rsacl_storage::MemoryDataStore;

type Reader = DataStoreTupleReader<MemoryDataStore>;
type Cache = DataStoreClosureCache<MemoryDataStore>;
type Checker = TupleRelationChecker<Reader>;

struct Service {
    orchestrator: Arc<CacheBuildOrchestrator<Reader, Cache, Checker>>,
    writer: WriteHandler<MemoryDataStore, Reader, Cache, Checker>,
    checks: CheckHandler<Reader, Cache, Checker>,
    cache: Arc<Cache>,
}

impl Service {
    fn from_config(config: &ServerConfig) -> Self {
        let storage = MemoryDataStore::new_shared();
        let reader = Arc::new(DataStoreTupleReader::new(Arc::clone(&storage)));
        let cache = Arc::new(DataStoreClosureCache::new(Arc::clone(&storage)));
        let orchestrator = Arc::new(CacheBuildOrchestrator::new(
            BuilderConfig::from(&config.user_relations),
            Arc::clone(&reader),
            Arc::new(config.relation_config()),
            Arc::clone(&cache),
            Arc::new(TupleRelationChecker::new(reader)),
        ));
        Self {
            writer: WriteHandler::new(storage, Arc::clone(&orchestrator)),
            checks: CheckHandler::new(Arc::clone(&orchestrator)),
            orchestrator,
            cache,
        }
    }

    async fn write(&self, tuple: &str) {
        self.writer.write(&Acl::parse(tuple).unwrap()).await.unwrap();
    }

    async fn allowed(&self, user: &str, namespace: &str, object: &str, relation: &str) -> bool {
        self.checks
            .check(&CheckRequest::new(user, namespace, object, relation))
            .await
            .unwrap()
            .allowed
    }
}

fn config_from_yaml(yaml: &str) -> ServerConfig {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    ServerConfig::load(file.path()).unwrap()
}

const CONFIG: &str = r#"
user_relations:
  enabled: true
  update_on_acl_change: true
  scheduled_period_ms: 20
  page_size: 2
  workers: 2
namespaces:
  ns:
    member: [viewer]
"#;

/// Same rules, but writes trigger no builds.
const MANUAL_CONFIG: &str = r#"
user_relations:
  update_on_acl_change: false
  page_size: 2
namespaces:
  ns:
    member: [viewer]
"#;

async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_member_reaches_viewer_through_userset() {
    let service = Service::from_config(&config_from_yaml(MANUAL_CONFIG));
    service.write("ns:o1#member@u1").await;
    service.write("ns:o2#viewer@ns:o1#member").await;

    let closure = service
        .orchestrator
        .resolver()
        .closure_for("u1")
        .await
        .unwrap();
    assert_eq!(
        closure,
        HashSet::from([NsObject::new("ns", "o1"), NsObject::new("ns", "o2")])
    );

    assert!(service.orchestrator.rebuild_all().await.unwrap());
    let record = service.cache.get("u1").await.unwrap().unwrap();
    assert!(record.contains("ns:o2#viewer"));

    let response = service
        .checks
        .check(&CheckRequest::new("u1", "ns", "o2", "viewer"))
        .await
        .unwrap();
    assert!(response.allowed);
    assert_eq!(response.source, CheckSource::Cache);
    assert!(service.allowed("u1", "ns", "o1", "member").await);
    assert!(!service.allowed("u2", "ns", "o2", "viewer").await);
}

#[tokio::test]
async fn test_workers_keep_records_fresh_after_writes() {
    let service = Service::from_config(&config_from_yaml(CONFIG));
    service.orchestrator.start();

    service.write("ns:o2#viewer@ns:o1#member").await;
    let outcome = service
        .writer
        .write(&Acl::parse("ns:o1#member@u1").unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.rebuild, RebuildTrigger::User("u1".to_string()));

    let cache = &service.cache;
    eventually(|| async move {
        cache
            .get("u1")
            .await
            .unwrap()
            .is_some_and(|record| record.contains("ns:o2#viewer"))
    })
    .await;

    let orchestrator = &service.orchestrator;
    eventually(|| async move { orchestrator.can_use_cache("u1") }).await;
    assert!(service.allowed("u1", "ns", "o2", "viewer").await);

    service.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_first_time_build_pages_every_user() {
    let service = Service::from_config(&config_from_yaml(MANUAL_CONFIG));
    service.write("ns:shared#viewer@ns:team#member").await;
    for user in ["u1", "u2", "u3", "u4", "u5"] {
        service.write(&format!("ns:team#member@{user}")).await;
    }

    assert_eq!(service.cache.count().await.unwrap(), 0);
    assert!(service.orchestrator.first_time_build().await.unwrap());
    assert_eq!(service.cache.count().await.unwrap(), 5);
    for user in ["u1", "u2", "u3", "u4", "u5"] {
        let record = service.cache.get(user).await.unwrap().unwrap();
        assert!(record.contains("ns:shared#viewer"), "{user}");
    }

    assert!(!service.orchestrator.first_time_build().await.unwrap());
}

#[tokio::test]
async fn test_rebuild_with_no_namespaces_writes_nothing() {
    let service = Service::from_config(&config_from_yaml(CONFIG));

    assert!(!service.orchestrator.rebuild_all().await.unwrap());
    assert!(!service.orchestrator.first_time_build().await.unwrap());
    assert_eq!(service.cache.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_disabled_config_answers_live() {
    let yaml = r#"
user_relations:
  enabled: false
namespaces:
  ns:
    member: [viewer]
"#;
    let service = Service::from_config(&config_from_yaml(yaml));
    service.write("ns:o1#member@u1").await;
    service.write("ns:o2#viewer@ns:o1#member").await;

    assert!(!service.orchestrator.build_one("u1").await.unwrap());
    assert!(!service.orchestrator.can_use_cache("u1"));

    let response = service
        .checks
        .check(&CheckRequest::new("u1", "ns", "o2", "viewer"))
        .await
        .unwrap();
    assert!(response.allowed);
    assert_eq!(response.source, CheckSource::Live);
    assert_eq!(service.cache.count().await.unwrap(), 0);
}

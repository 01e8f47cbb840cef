//! Integration tests for the directory backend and the services manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use janus_registry::{
    InMemoryServiceRegistryDao, JsonServiceRegistryDao, LoadFailurePolicy, RegistryError,
    ServiceRegistryDao, ServicesManager,
};
use janus_services::{AccessRequest, AccessStrategy, AccessDenied, Principal, RegisteredService, ServicePattern};
use tempfile::TempDir;

fn ant(name: &str, pattern: &str, order: i32) -> RegisteredService {
    RegisteredService::builder(name, ServicePattern::ant(pattern).unwrap())
        .evaluation_order(order)
        .build()
        .unwrap()
}

fn write_definition(dir: &TempDir, file: &str, body: &str) {
    std::fs::write(dir.path().join(file), body).unwrap();
}

#[tokio::test]
async fn test_directory_round_trip_preserves_pattern_kind() {
    let dir = TempDir::new().unwrap();
    let dao = JsonServiceRegistryDao::new(dir.path()).unwrap();

    let regex = RegisteredService::builder(
        "Regex",
        ServicePattern::regex_with_case(r"^https://example\.org/.*$", true).unwrap(),
    )
    .build()
    .unwrap();
    dao.save(regex).await.unwrap();
    dao.save(ant("Ant", "https://example.org/*", 0)).await.unwrap();

    let reopened = JsonServiceRegistryDao::new(dir.path()).unwrap();
    let mut loaded = reopened.load().await.unwrap();
    loaded.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].name, "Ant");
    assert!(matches!(loaded[0].service_id, ServicePattern::Ant(_)));
    assert!(matches!(loaded[1].service_id, ServicePattern::Regex(_)));
    assert!(loaded[1].matches("https://EXAMPLE.org/APP"));
}

#[tokio::test]
async fn test_keep_previous_rejects_scan_with_bad_file() {
    let dir = TempDir::new().unwrap();
    let dao = Arc::new(JsonServiceRegistryDao::new(dir.path()).unwrap());
    let manager = ServicesManager::new(dao.clone());

    manager.save(ant("Good", "https://good.test/**", 0)).await.unwrap();
    assert_eq!(manager.reload().await.unwrap(), 1);

    write_definition(&dir, "Broken.json", "{ not json");
    let err = manager.reload().await.unwrap_err();
    assert!(matches!(err, RegistryError::LoadRejected { failed: 1 }));

    // previous snapshot still served
    assert_eq!(manager.count(), 1);
    assert!(manager.matches_existing_service("https://good.test/app"));
    assert_eq!(dao.cached_count(), 1);
}

#[tokio::test]
async fn test_partial_policy_accepts_valid_files() {
    let dir = TempDir::new().unwrap();
    write_definition(
        &dir,
        "Good.json",
        r#"{"id": 7, "name": "Good", "serviceId": {"type": "ant", "pattern": "https://good.test/**"}}"#,
    );
    write_definition(&dir, "Broken.json", "{ not json");

    let dao = JsonServiceRegistryDao::new(dir.path())
        .unwrap()
        .with_load_failure_policy(LoadFailurePolicy::Partial);
    let manager = ServicesManager::new(Arc::new(dao));

    assert_eq!(manager.reload().await.unwrap(), 1);
    assert_eq!(manager.find_service_by_id(7).unwrap().name, "Good");
}

#[tokio::test]
async fn test_invalid_regex_file_is_a_parse_failure() {
    let dir = TempDir::new().unwrap();
    write_definition(
        &dir,
        "Bad.json",
        r#"{"id": 1, "name": "Bad", "serviceId": {"type": "regex", "pattern": "^(unclosed"}}"#,
    );
    let dao = JsonServiceRegistryDao::new(dir.path()).unwrap();
    assert!(matches!(
        dao.load().await,
        Err(RegistryError::LoadRejected { failed: 1 })
    ));
}

#[tokio::test]
async fn test_temporary_and_foreign_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    write_definition(&dir, ".tmp123", "{ partial");
    write_definition(&dir, "notes.txt", "not a service");
    let dao = JsonServiceRegistryDao::new(dir.path()).unwrap();
    assert!(dao.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_end_to_end_order_and_sso() {
    let dao = Arc::new(InMemoryServiceRegistryDao::new());
    let manager = ServicesManager::new(dao);

    let a = RegisteredService::builder("A", ServicePattern::ant("https://a.test/*").unwrap())
        .evaluation_order(10)
        .access_strategy(AccessStrategy::new().with_sso_enabled(false))
        .build()
        .unwrap();
    manager.save(ant("B", "https://*.test/*", 20)).await.unwrap();
    manager.save(a).await.unwrap();

    let found = manager.find_service_by("https://a.test/login").unwrap();
    assert_eq!(found.name, "A");

    let principal = Principal::new("casuser");
    assert_eq!(
        found.authorize(&AccessRequest::sso(&principal.attributes)),
        Err(AccessDenied::SsoDisabled)
    );
    assert!(found.authorize(&AccessRequest::fresh(&principal.attributes)).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reload_is_atomic_for_readers() {
    let first: Vec<_> = (1..=1000)
        .map(|i| {
            RegisteredService::builder(format!("svc-{i}"), ServicePattern::ant(format!("https://s{i}.test/**")).unwrap())
                .id(i)
                .build()
                .unwrap()
        })
        .collect();
    let second: Vec<_> = (1001..=1500)
        .map(|i| {
            RegisteredService::builder(format!("svc-{i}"), ServicePattern::ant(format!("https://s{i}.test/**")).unwrap())
                .id(i)
                .build()
                .unwrap()
        })
        .collect();

    let dao = Arc::new(InMemoryServiceRegistryDao::with_services(first.clone()));
    let manager = Arc::new(ServicesManager::new(dao.clone()));
    manager.reload().await.unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut observed = 0usize;
            while !done.load(Ordering::SeqCst) {
                let snapshot = manager.get_all_services();
                let len = snapshot.len();
                assert!(len == 1000 || len == 500, "torn snapshot of {len}");

                let mut ids: Vec<_> = snapshot.iter().map(|s| s.id).collect();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), len);
                observed += 1;
                tokio::task::yield_now().await;
            }
            observed
        }));
    }

    for round in 0..20 {
        let next = if round % 2 == 0 { &second } else { &first };
        dao.replace_all(next.clone());
        manager.reload().await.unwrap();
        tokio::task::yield_now().await;
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
}

#[tokio::test]
async fn test_concurrent_saves_get_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let dao = Arc::new(JsonServiceRegistryDao::new(dir.path()).unwrap());
    let manager = Arc::new(ServicesManager::new(dao));

    let mut tasks = Vec::new();
    for i in 0..10 {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            manager
                .save(ant(&format!("svc-{i}"), &format!("https://s{i}.test/**"), 0))
                .await
                .unwrap()
                .id
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 10);
    assert_eq!(manager.count(), 10);
}

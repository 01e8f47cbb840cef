//! Hot reload tests against a real directory.

use std::sync::Arc;
use std::time::Duration;

use janus_registry::{
    JsonServiceRegistryDao, RegistryError, ServiceDirectoryWatcher, ServicesManager,
    ShutdownSignal,
};
use tempfile::TempDir;
use tokio::time::{sleep, timeout, Instant};

const DEBOUNCE: Duration = Duration::from_millis(50);

/// Long enough for any event batch to have been applied.
const SETTLE: Duration = Duration::from_millis(500);

fn definition(id: i64, name: &str, host: &str) -> String {
    format!(
        r#"{{"id": {id}, "name": "{name}", "serviceId": {{"type": "ant", "pattern": "https://{host}/**"}}}}"#
    )
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    check()
}

struct Fixture {
    dir: TempDir,
    manager: Arc<ServicesManager>,
    shutdown: ShutdownSignal,
    task: tokio::task::JoinHandle<Result<(), RegistryError>>,
}

impl Fixture {
    fn write(&self, file: &str, body: &str) {
        std::fs::write(self.dir.path().join(file), body).unwrap();
    }

    fn remove(&self, file: &str) {
        std::fs::remove_file(self.dir.path().join(file)).unwrap();
    }

    async fn stop(self) {
        self.shutdown.trigger();
        let result = timeout(Duration::from_secs(2), self.task)
            .await
            .expect("watcher did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}

async fn start() -> Fixture {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Portal.json"), definition(1, "Portal", "portal.test")).unwrap();

    let dao = Arc::new(JsonServiceRegistryDao::new(dir.path()).unwrap());
    let manager = Arc::new(ServicesManager::new(dao.clone()));
    manager.reload().await.unwrap();

    let shutdown = ShutdownSignal::new();
    let task = ServiceDirectoryWatcher::new(dao, manager.clone())
        .with_debounce(DEBOUNCE)
        .spawn(shutdown.clone());
    // give the watch time to register
    sleep(Duration::from_millis(100)).await;

    Fixture {
        dir,
        manager,
        shutdown,
        task,
    }
}

#[tokio::test]
async fn test_created_file_is_picked_up() {
    let fx = start().await;
    fx.write("Mail.json", &definition(2, "Mail", "mail.test"));

    assert!(wait_until(|| fx.manager.count() == 2).await, "created file not applied");
    assert!(fx.manager.matches_existing_service("https://mail.test/inbox"));

    fx.stop().await;
}

#[tokio::test]
async fn test_modified_file_replaces_definition() {
    let fx = start().await;
    fx.write("Portal.json", &definition(1, "Portal", "new-portal.test"));

    assert!(
        wait_until(|| fx.manager.matches_existing_service("https://new-portal.test/")).await,
        "modified file not applied"
    );
    assert_eq!(fx.manager.count(), 1);
    assert!(!fx.manager.matches_existing_service("https://portal.test/"));

    fx.stop().await;
}

#[tokio::test]
async fn test_identical_rewrite_keeps_snapshot() {
    let fx = start().await;
    let before = fx.manager.get_all_services();

    fx.write("Portal.json", &definition(1, "Portal", "portal.test"));
    sleep(SETTLE).await;

    assert!(Arc::ptr_eq(&before, &fx.manager.get_all_services()));

    fx.stop().await;
}

#[tokio::test]
async fn test_deleted_file_is_dropped() {
    let fx = start().await;
    fx.remove("Portal.json");

    assert!(wait_until(|| fx.manager.count() == 0).await, "deleted file not applied");
    assert!(fx.manager.find_service_by_id(1).is_none());

    fx.stop().await;
}

#[tokio::test]
async fn test_deleted_file_is_dropped_despite_broken_sibling() {
    let fx = start().await;
    fx.write("Mail.json", &definition(2, "Mail", "mail.test"));
    assert!(wait_until(|| fx.manager.count() == 2).await, "created file not applied");

    // a full reload is now rejected under the default policy
    fx.write("Broken.json", "{ not json");
    sleep(SETTLE).await;
    assert_eq!(fx.manager.count(), 2);

    fx.remove("Portal.json");
    assert!(
        wait_until(|| fx.manager.find_service_by_id(1).is_none()).await,
        "deleted file still served"
    );
    assert_eq!(fx.manager.count(), 1);
    assert!(fx.manager.matches_existing_service("https://mail.test/inbox"));

    fx.stop().await;
}

#[tokio::test]
async fn test_colliding_id_overwrites_existing_service() {
    let fx = start().await;
    fx.write("Copy.json", &definition(1, "Copy", "copy.test"));

    assert!(
        wait_until(|| fx.manager.matches_existing_service("https://copy.test/")).await,
        "colliding file not applied"
    );
    assert_eq!(fx.manager.count(), 1);
    assert_eq!(fx.manager.find_service_by_id(1).unwrap().name, "Copy");
    assert!(!fx.manager.matches_existing_service("https://portal.test/"));

    fx.stop().await;
}

#[tokio::test]
async fn test_started_watcher_sees_immediate_change() {
    let dir = TempDir::new().unwrap();
    let dao = Arc::new(JsonServiceRegistryDao::new(dir.path()).unwrap());
    let manager = Arc::new(ServicesManager::new(dao.clone()));
    let shutdown = ShutdownSignal::new();

    let task = ServiceDirectoryWatcher::new(dao, manager.clone())
        .with_debounce(DEBOUNCE)
        .start(shutdown.clone())
        .unwrap();
    // written before the event loop has had a chance to run
    std::fs::write(dir.path().join("Mail.json"), definition(2, "Mail", "mail.test")).unwrap();

    assert!(wait_until(|| manager.count() == 1).await, "change after start not applied");

    shutdown.trigger();
    let result = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_removed_directory_stops_watcher() {
    let fx = start().await;
    std::fs::remove_dir_all(fx.dir.path()).unwrap();

    let result = timeout(Duration::from_secs(3), fx.task)
        .await
        .expect("watcher kept running after its directory was removed")
        .unwrap();
    assert!(matches!(result, Err(RegistryError::WatchDirectoryGone(_))));
    // previous snapshot is still served
    assert_eq!(fx.manager.count(), 1);
}

//! End-to-end evaluation through a started runtime.

use std::path::Path;

use janus::prelude::*;
use janus::config::{RegistryConfig, ReleaseConfig};
use janus::services::AttributeValue as Value;
use tempfile::TempDir;

fn memory_config(consent_enabled: bool) -> JanusConfig {
    JanusConfig::builder()
        .registry(RegistryConfig {
            backend: BackendKind::Memory,
            reload_interval_secs: 0,
            ..Default::default()
        })
        .release(ReleaseConfig {
            anonymous_id_salt: "pepper".to_string(),
            consent_enabled,
        })
        .build()
}

fn directory_config(location: &Path, policy: LoadFailurePolicy) -> JanusConfig {
    JanusConfig::builder()
        .registry(RegistryConfig {
            backend: BackendKind::Directory,
            location: location.to_path_buf(),
            watch: false,
            reload_interval_secs: 0,
            load_failure_policy: policy,
            ..Default::default()
        })
        .build()
}

async fn register_a_and_b(runtime: &Runtime) {
    let a = RegisteredService::builder("A", ServicePattern::ant("https://a.test/*").unwrap())
        .evaluation_order(10)
        .access_strategy(AccessStrategy::new().with_sso_enabled(false))
        .attribute_release_policy(AttributeReleasePolicy::return_allowed(["mail"]))
        .build()
        .unwrap();
    let b = RegisteredService::builder("B", ServicePattern::ant("https://*.test/*").unwrap())
        .evaluation_order(20)
        .access_strategy(AccessStrategy::new().require_attribute("dept", ["eng"]))
        .build()
        .unwrap();
    runtime.manager().save(a).await.unwrap();
    runtime.manager().save(b).await.unwrap();
}

fn casuser() -> Principal {
    Principal::new("casuser")
        .attribute("mail", "cas@example.org")
        .attribute("dept", "eng")
        .attribute("phone", "555-0100")
}

#[tokio::test]
async fn test_lower_order_service_wins_and_filters_release() {
    let runtime = Runtime::start(memory_config(false)).await.unwrap();
    register_a_and_b(&runtime).await;

    let release = runtime
        .evaluate("https://a.test/login", &casuser(), CredentialUse::Fresh, None)
        .unwrap();
    assert_eq!(release.service.name, "A");
    assert_eq!(release.username, "casuser");
    assert_eq!(release.attributes.len(), 1);
    assert_eq!(
        release.attributes.get("mail"),
        Some(&Value::from("cas@example.org"))
    );
    assert!(!release.consent_required);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sso_session_refused_by_sso_disabled_service() {
    let runtime = Runtime::start(memory_config(false)).await.unwrap();
    register_a_and_b(&runtime).await;

    let refusal = runtime
        .evaluate("https://a.test/login", &casuser(), CredentialUse::SsoSession, None)
        .unwrap_err();
    let a_id = runtime.manager().find_service_by("https://a.test/login").unwrap().id;
    assert_eq!(
        refusal,
        Refusal::Denied {
            service_id: a_id,
            reason: AccessDenied::SsoDisabled,
        }
    );

    // B still participates in SSO
    let release = runtime
        .evaluate("https://b.test/app", &casuser(), CredentialUse::SsoSession, None)
        .unwrap();
    assert_eq!(release.service.name, "B");

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_required_attribute_refused() {
    let runtime = Runtime::start(memory_config(false)).await.unwrap();
    register_a_and_b(&runtime).await;

    let outsider = Principal::new("guest").attribute("dept", "finance");
    let refusal = runtime
        .evaluate("https://b.test/app", &outsider, CredentialUse::Fresh, None)
        .unwrap_err();
    assert_eq!(refusal.code(), AccessDenied::UnsatisfiedAttributes.code());

    let unknown = runtime
        .evaluate("https://other.example/", &outsider, CredentialUse::Fresh, None)
        .unwrap_err();
    assert_eq!(unknown, Refusal::UnknownService);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_consent_required_until_recorded() {
    let runtime = Runtime::start(memory_config(true)).await.unwrap();
    register_a_and_b(&runtime).await;
    let principal = casuser();

    let first = runtime
        .evaluate("https://b.test/app", &principal, CredentialUse::Fresh, None)
        .unwrap();
    assert!(first.consent_required);

    runtime
        .consent()
        .unwrap()
        .set_attribute_release_consented(&first.service, &principal);

    let second = runtime
        .evaluate("https://b.test/app", &principal, CredentialUse::Fresh, None)
        .unwrap();
    assert!(!second.consent_required);

    // consent is per service
    let other = runtime
        .evaluate("https://a.test/app", &principal, CredentialUse::Fresh, None)
        .unwrap();
    assert!(other.consent_required);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_anonymous_username_is_stable_per_service() {
    let runtime = Runtime::start(memory_config(false)).await.unwrap();
    let service = RegisteredService::builder("Anon", ServicePattern::ant("https://anon.test/**").unwrap())
        .anonymous_access(true)
        .build()
        .unwrap();
    runtime.manager().save(service).await.unwrap();

    let principal = casuser();
    let first = runtime
        .evaluate("https://anon.test/a/b", &principal, CredentialUse::Fresh, None)
        .unwrap();
    let second = runtime
        .evaluate("https://anon.test/c", &principal, CredentialUse::Fresh, None)
        .unwrap();
    assert_ne!(first.username, "casuser");
    assert_eq!(first.username, second.username);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_directory_backend_loads_on_start() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("App-1.json"),
        r#"{"id": 1, "name": "App", "serviceId": {"type": "ant", "pattern": "https://app.test/**"}}"#,
    )
    .unwrap();

    let runtime = Runtime::start(directory_config(dir.path(), LoadFailurePolicy::KeepPrevious))
        .await
        .unwrap();
    assert_eq!(runtime.manager().count(), 1);
    assert!(!runtime.is_watching());

    let release = runtime
        .evaluate("https://app.test/x", &Principal::new("u"), CredentialUse::Fresh, None)
        .unwrap();
    assert_eq!(release.service.id, 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_broken_definition_fails_start_unless_partial() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("App-1.json"),
        r#"{"id": 1, "name": "App", "serviceId": {"type": "ant", "pattern": "https://app.test/**"}}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("Broken-2.json"), "{ not json").unwrap();

    let strict = Runtime::start(directory_config(dir.path(), LoadFailurePolicy::KeepPrevious)).await;
    assert!(matches!(strict, Err(JanusError::Registry(_))));

    let partial = Runtime::start(directory_config(dir.path(), LoadFailurePolicy::Partial))
        .await
        .unwrap();
    assert_eq!(partial.manager().count(), 1);
    partial.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watching_runtime_shuts_down() {
    let dir = TempDir::new().unwrap();
    let mut config = directory_config(dir.path(), LoadFailurePolicy::KeepPrevious);
    config.registry.watch = true;
    config.registry.reload_interval_secs = 60;

    let runtime = Runtime::start(config).await.unwrap();
    assert!(runtime.is_watching());
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watching_runtime_sees_change_made_right_after_start() {
    let dir = TempDir::new().unwrap();
    let mut config = directory_config(dir.path(), LoadFailurePolicy::KeepPrevious);
    config.registry.watch = true;
    config.registry.watch_debounce_ms = 50;

    let runtime = Runtime::start(config).await.unwrap();
    std::fs::write(
        dir.path().join("Late.json"),
        r#"{"id": 5, "name": "Late", "serviceId": {"type": "ant", "pattern": "https://late.test/**"}}"#,
    )
    .unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(3);
    while runtime.manager().count() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    assert_eq!(runtime.manager().find_service_by_id(5).unwrap().name, "Late");

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = memory_config(false);
    config.registry.file_extension = String::new();
    assert!(matches!(
        Runtime::start(config).await,
        Err(JanusError::Config(_))
    ));
}

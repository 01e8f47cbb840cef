//! Wiring of configuration, telemetry, persistence and background reload.
//!
//! [`Runtime::start`] builds the DAO named by the configuration, establishes
//! the directory watch, performs the initial load and spawns the periodic
//! reload task. [`Runtime::shutdown`] stops both tasks and waits for them.
//!
//! ```no_run
//! use janus::{ConfigLoader, Runtime};
//!
//! # async fn example() -> Result<(), janus::JanusError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("janus.toml")?
//!     .with_env_prefix("JANUS")
//!     .load()?;
//!
//! let runtime = Runtime::bootstrap(config).await?;
//! // serve requests through runtime.manager() or runtime.evaluate(..)
//! runtime.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use janus_config::{BackendKind, JanusConfig};
use janus_registry::{
    InMemoryServiceRegistryDao, JsonServiceRegistryDao, RegistryResult, ReloadScheduler,
    ServiceDirectoryWatcher, ServiceRegistryDao, ServicesManager, ShutdownSignal,
};
use janus_services::{
    AccessRequest, ConsentStrategy, CredentialUse, InMemoryConsentStore, Principal,
    PrincipalAttributeSource, RegisteredService,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::decision::{Refusal, Release};
use crate::error::JanusResult;

/// A running registry with its background tasks.
pub struct Runtime {
    config: JanusConfig,
    manager: Arc<ServicesManager>,
    consent: Option<Arc<dyn ConsentStrategy>>,
    shutdown: ShutdownSignal,
    watcher: Option<JoinHandle<RegistryResult<()>>>,
    scheduler: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("backend", &self.config.registry.backend)
            .field("services", &self.manager.count())
            .field("watching", &self.is_watching())
            .field("consent", &self.consent.is_some())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Initialize telemetry, then [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Fails if telemetry cannot be installed or the registry cannot start.
    pub async fn bootstrap(config: JanusConfig) -> JanusResult<Self> {
        janus_telemetry::init_telemetry(&config.telemetry.to_telemetry_config())?;
        Self::start(config).await
    }

    /// Validate the configuration, load the registry and spawn background
    /// tasks. Telemetry is left to the caller.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, a missing service directory, or an
    /// initial load rejected by the load failure policy.
    pub async fn start(config: JanusConfig) -> JanusResult<Self> {
        config.validate()?;
        let registry = &config.registry;
        let shutdown = ShutdownSignal::new();

        let (manager, watcher) = match registry.backend {
            BackendKind::Memory => {
                let dao: Arc<dyn ServiceRegistryDao> = Arc::new(InMemoryServiceRegistryDao::new());
                (Arc::new(ServicesManager::new(dao)), None)
            }
            BackendKind::Directory => {
                let directory = Arc::new(
                    JsonServiceRegistryDao::new(&registry.location)?
                        .with_extension(registry.file_extension.clone())
                        .with_load_failure_policy(registry.load_failure_policy),
                );
                let dao: Arc<dyn ServiceRegistryDao> = directory.clone();
                let manager = Arc::new(ServicesManager::new(dao));
                (manager, registry.watch.then_some(directory))
            }
        };

        // watch before loading so a change during the initial scan is not lost
        let watcher = match watcher {
            Some(directory) => Some(
                ServiceDirectoryWatcher::new(directory, manager.clone())
                    .with_debounce(registry.watch_debounce())
                    .start(shutdown.clone())?,
            ),
            None => None,
        };

        let count = match manager.reload().await {
            Ok(count) => count,
            Err(e) => {
                shutdown.trigger();
                return Err(e.into());
            }
        };
        let scheduler = registry.reload_interval().map(|interval| {
            ReloadScheduler::new(manager.clone(), interval).spawn(shutdown.clone())
        });

        let consent: Option<Arc<dyn ConsentStrategy>> = config
            .release
            .consent_enabled
            .then(|| Arc::new(InMemoryConsentStore::new()) as Arc<dyn ConsentStrategy>);

        info!(
            service_name = %config.telemetry.service_name,
            environment = %config.telemetry.environment,
            backend = ?registry.backend,
            count,
            watching = watcher.is_some(),
            periodic_reload = scheduler.is_some(),
            "janus registry started"
        );

        Ok(Self {
            config,
            manager,
            consent,
            shutdown,
            watcher,
            scheduler,
        })
    }

    /// Replace the consent store, e.g. with one shared across nodes.
    #[must_use]
    pub fn with_consent_strategy(mut self, consent: Arc<dyn ConsentStrategy>) -> Self {
        self.consent = Some(consent);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &JanusConfig {
        &self.config
    }

    /// The services manager serving lookups.
    pub fn manager(&self) -> &Arc<ServicesManager> {
        &self.manager
    }

    /// The consent store, if consent tracking is enabled.
    pub fn consent(&self) -> Option<&Arc<dyn ConsentStrategy>> {
        self.consent.as_ref()
    }

    /// A handle that stops the background tasks when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Returns `true` while the directory watcher is running.
    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Username released to `service` for `principal`.
    pub fn username_for(&self, service: &RegisteredService, principal: &Principal) -> String {
        service.resolve_username(principal, &self.config.release.anonymous_id_salt)
    }

    /// Find the service for `candidate`, authorize the request and compute
    /// what is released to it.
    ///
    /// # Errors
    ///
    /// Returns [`Refusal::UnknownService`] if nothing matches and
    /// [`Refusal::Denied`] with the precise cause if access is denied.
    pub fn evaluate(
        &self,
        candidate: &str,
        principal: &Principal,
        credentials: CredentialUse,
        source: Option<&dyn PrincipalAttributeSource>,
    ) -> Result<Release, Refusal> {
        let service = self
            .manager
            .find_service_by(candidate)
            .ok_or(Refusal::UnknownService)?;

        let request = AccessRequest {
            credentials,
            ..AccessRequest::fresh(&principal.attributes)
        };
        if let Err(reason) = service.authorize(&request) {
            debug!(service_id = service.id, reason = reason.code(), "access denied");
            return Err(Refusal::Denied {
                service_id: service.id,
                reason,
            });
        }

        let attributes = service.release_attributes(principal, source);
        let consent_required = self
            .consent
            .as_ref()
            .is_some_and(|consent| consent.is_attribute_release_consented(&service, principal));
        let username = self.username_for(&service, principal);

        Ok(Release {
            service,
            username,
            attributes,
            consent_required,
        })
    }

    /// Stop the background tasks and wait for them.
    ///
    /// # Errors
    ///
    /// Returns the watcher's error if it had already stopped on a fatal
    /// condition, or a task error if a task panicked.
    pub async fn shutdown(mut self) -> JanusResult<()> {
        self.shutdown.trigger();

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.await?;
        }
        if let Some(watcher) = self.watcher.take() {
            if let Err(e) = watcher.await? {
                error!(error = %e, "directory watcher had stopped");
                return Err(e.into());
            }
        }

        info!("janus registry stopped");
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

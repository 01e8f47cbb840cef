//! The services manager: an atomically swapped, ordered registry snapshot.
//!
//! Readers load the current [`ServicesSnapshot`] with a single atomic
//! pointer read and never take a lock. Writers (`save`, `delete`, `reload`,
//! `refresh`) are serialized by one async mutex, build a complete replacement
//! snapshot off to the side and publish it with a single swap. A reader that
//! loaded the old snapshot keeps using it until it drops the `Arc`.
//!
//! ```rust
//! use std::sync::Arc;
//! use janus_registry::{InMemoryServiceRegistryDao, ServicesManager};
//! use janus_services::{RegisteredService, ServicePattern};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ServicesManager::new(Arc::new(InMemoryServiceRegistryDao::new()));
//! let portal = RegisteredService::builder("Portal", ServicePattern::ant("https://portal.test/**")?)
//!     .build()?;
//! manager.save(portal).await?;
//!
//! assert!(manager.matches_existing_service("https://portal.test/home"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use janus_services::{sort_by_evaluation_order, RegisteredService};
use janus_telemetry::metrics::{self, ReloadOutcome};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dao::ServiceRegistryDao;
use crate::error::RegistryResult;

/// A point-in-time, read-only view of every registered service.
///
/// Services are held in evaluation order. Snapshots are never mutated after
/// construction.
#[derive(Debug, Default)]
pub struct ServicesSnapshot {
    services: Vec<RegisteredService>,
    by_id: HashMap<i64, usize>,
}

impl ServicesSnapshot {
    /// Build a snapshot. When two services share an id the later one wins.
    pub fn new(services: impl IntoIterator<Item = RegisteredService>) -> Self {
        let mut unique: HashMap<i64, RegisteredService> = HashMap::new();
        for service in services {
            if let Some(previous) = unique.insert(service.id, service) {
                warn!(
                    service_id = previous.id,
                    service_name = %previous.name,
                    "duplicate service id in snapshot, later definition wins"
                );
            }
        }

        let mut services: Vec<_> = unique.into_values().collect();
        sort_by_evaluation_order(&mut services);
        let by_id = services
            .iter()
            .enumerate()
            .map(|(position, service)| (service.id, position))
            .collect();

        Self { services, by_id }
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if the snapshot holds no services.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterate in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, RegisteredService> {
        self.services.iter()
    }

    /// The services in evaluation order.
    pub fn as_slice(&self) -> &[RegisteredService] {
        &self.services
    }

    /// A service by id.
    pub fn get(&self, id: i64) -> Option<&RegisteredService> {
        self.by_id.get(&id).map(|position| &self.services[*position])
    }

    /// The first service, in evaluation order, whose pattern matches.
    pub fn find(&self, candidate: &str) -> Option<&RegisteredService> {
        if candidate.is_empty() {
            return None;
        }
        self.services.iter().find(|service| service.matches(candidate))
    }
}

impl<'a> IntoIterator for &'a ServicesSnapshot {
    type Item = &'a RegisteredService;
    type IntoIter = std::slice::Iter<'a, RegisteredService>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Serves registry lookups and coordinates writes against a DAO.
pub struct ServicesManager {
    dao: Arc<dyn ServiceRegistryDao>,
    snapshot: ArcSwap<ServicesSnapshot>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for ServicesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicesManager")
            .field("services", &self.count())
            .finish_non_exhaustive()
    }
}

impl ServicesManager {
    /// Create a manager with an empty snapshot. Call [`reload`](Self::reload)
    /// to populate it.
    pub fn new(dao: Arc<dyn ServiceRegistryDao>) -> Self {
        Self {
            dao,
            snapshot: ArcSwap::from_pointee(ServicesSnapshot::default()),
            writer: Mutex::new(()),
        }
    }

    /// The backing DAO.
    pub fn dao(&self) -> &Arc<dyn ServiceRegistryDao> {
        &self.dao
    }

    /// Replace the whole snapshot with a fresh load from the DAO.
    ///
    /// On failure the previous snapshot stays in place and the error is
    /// returned.
    pub async fn reload(&self) -> RegistryResult<usize> {
        let _guard = self.writer.lock().await;
        self.reload_locked().await
    }

    /// Rebuild the snapshot from the DAO's in-memory index when it has one,
    /// otherwise perform a full [`reload`](Self::reload).
    ///
    /// Called by the directory watcher after it updated the DAO index.
    pub async fn refresh(&self) -> RegistryResult<usize> {
        let _guard = self.writer.lock().await;
        match self.dao.indexed_services() {
            Some(services) => Ok(self.publish(services, "refreshed services from index")),
            None => self.reload_locked().await,
        }
    }

    async fn reload_locked(&self) -> RegistryResult<usize> {
        match self.dao.load().await {
            Ok(services) => Ok(self.publish(services, "reloaded services")),
            Err(e) => {
                metrics::record_reload(ReloadOutcome::Failure);
                warn!(
                    error = %e,
                    count = self.snapshot.load().len(),
                    "service reload failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }

    fn publish(&self, services: Vec<RegisteredService>, message: &'static str) -> usize {
        let snapshot = ServicesSnapshot::new(services);
        let count = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));
        metrics::record_reload(ReloadOutcome::Success);
        metrics::set_registry_size(count);
        info!(count, "{message}");
        count
    }

    /// The first service in evaluation order that matches `candidate`.
    ///
    /// Returns an owned copy.
    pub fn find_service_by(&self, candidate: &str) -> Option<RegisteredService> {
        let snapshot = self.snapshot.load();
        let found = snapshot.find(candidate).cloned();
        metrics::record_lookup(found.is_some());
        if found.is_none() {
            debug!(service = candidate, "no registered service matches");
        }
        found
    }

    /// A service by id. Returns an owned copy.
    pub fn find_service_by_id(&self, id: i64) -> Option<RegisteredService> {
        self.snapshot.load().get(id).cloned()
    }

    /// Every service satisfying `predicate`, in evaluation order.
    pub fn find_services_by<P>(&self, mut predicate: P) -> Vec<RegisteredService>
    where
        P: FnMut(&RegisteredService) -> bool,
    {
        self.snapshot
            .load()
            .iter()
            .filter(|service| predicate(service))
            .cloned()
            .collect()
    }

    /// Returns `true` if [`find_service_by`](Self::find_service_by) would
    /// return a service.
    pub fn matches_existing_service(&self, candidate: &str) -> bool {
        self.snapshot.load().find(candidate).is_some()
    }

    /// The current snapshot, ordered by evaluation order.
    pub fn get_all_services(&self) -> Arc<ServicesSnapshot> {
        self.snapshot.load_full()
    }

    /// Number of services in the current snapshot.
    pub fn count(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Persist a service and publish it.
    ///
    /// Returns the stored representation carrying the DAO-assigned id.
    pub async fn save(&self, service: RegisteredService) -> RegistryResult<RegisteredService> {
        let _guard = self.writer.lock().await;
        let saved = self.dao.save(service).await?;

        let current = self.snapshot.load();
        let services = current
            .iter()
            .filter(|existing| existing.id != saved.id)
            .cloned()
            .chain(std::iter::once(saved.clone()));
        let snapshot = ServicesSnapshot::new(services);
        let count = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));
        metrics::set_registry_size(count);

        info!(service_id = saved.id, service_name = %saved.name, "saved registered service");
        Ok(saved)
    }

    /// Remove a service by id.
    ///
    /// Returns the removed service, or `None` if no such service exists.
    pub async fn delete(&self, id: i64) -> RegistryResult<Option<RegisteredService>> {
        let _guard = self.writer.lock().await;

        let cached = self.snapshot.load().get(id).cloned();
        let service = match cached {
            Some(service) => service,
            None => match self.dao.find_service_by_id(id).await? {
                Some(service) => service,
                None => return Ok(None),
            },
        };

        if !self.dao.delete(&service).await? {
            debug!(service_id = id, "service already absent from store");
        }

        let current = self.snapshot.load();
        let snapshot =
            ServicesSnapshot::new(current.iter().filter(|existing| existing.id != id).cloned());
        let count = snapshot.len();
        self.snapshot.store(Arc::new(snapshot));
        metrics::set_registry_size(count);

        info!(service_id = id, service_name = %service.name, "deleted registered service");
        Ok(Some(service))
    }
}

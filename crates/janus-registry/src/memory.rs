//! In-memory persistence backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use janus_services::RegisteredService;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::dao::{next_id, ServiceRegistryDao};
use crate::error::RegistryResult;

/// Keeps services in a process-local map. Used by tests and the `memory`
/// backend.
#[derive(Debug, Default)]
pub struct InMemoryServiceRegistryDao {
    services: RwLock<BTreeMap<i64, RegisteredService>>,
}

impl InMemoryServiceRegistryDao {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with services.
    ///
    /// Services without an id are assigned one in iteration order.
    pub fn with_services(services: impl IntoIterator<Item = RegisteredService>) -> Self {
        let mut map = BTreeMap::new();
        for mut service in services {
            if service.is_new() {
                match next_id(map.keys()) {
                    Ok(id) => service.id = id,
                    Err(e) => {
                        warn!(service_name = %service.name, error = %e, "skipping service without an id");
                        continue;
                    }
                }
            }
            map.insert(service.id, service);
        }
        Self {
            services: RwLock::new(map),
        }
    }

    /// Replace the full contents.
    pub fn replace_all(&self, services: impl IntoIterator<Item = RegisteredService>) {
        let map = services.into_iter().map(|s| (s.id, s)).collect();
        *self.services.write() = map;
    }

    /// Number of stored services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

#[async_trait]
impl ServiceRegistryDao for InMemoryServiceRegistryDao {
    async fn save(&self, mut service: RegisteredService) -> RegistryResult<RegisteredService> {
        service.validate()?;
        let mut services = self.services.write();
        if service.is_new() {
            service.id = next_id(services.keys())?;
        }
        debug!(service_id = service.id, service_name = %service.name, "saved service in memory");
        services.insert(service.id, service.clone());
        Ok(service)
    }

    async fn delete(&self, service: &RegisteredService) -> RegistryResult<bool> {
        Ok(self.services.write().remove(&service.id).is_some())
    }

    async fn load(&self) -> RegistryResult<Vec<RegisteredService>> {
        Ok(self.services.read().values().cloned().collect())
    }

    async fn find_service_by_id(&self, id: i64) -> RegistryResult<Option<RegisteredService>> {
        Ok(self.services.read().get(&id).cloned())
    }
}

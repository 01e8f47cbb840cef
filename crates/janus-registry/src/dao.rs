//! Persistence contract for registered services.

use async_trait::async_trait;
use janus_services::RegisteredService;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Storage backend for registered services.
///
/// Implementations assign an id on first save when the service carries
/// [`janus_services::INITIAL_IDENTIFIER_VALUE`]. A failed call must leave
/// previously persisted state intact.
#[async_trait]
pub trait ServiceRegistryDao: Send + Sync {
    /// Persist a service and return the stored representation.
    async fn save(&self, service: RegisteredService) -> RegistryResult<RegisteredService>;

    /// Remove a service. Returns `false` if it was not stored.
    async fn delete(&self, service: &RegisteredService) -> RegistryResult<bool>;

    /// Load every stored service.
    async fn load(&self) -> RegistryResult<Vec<RegisteredService>>;

    /// Look up a stored service by id.
    async fn find_service_by_id(&self, id: i64) -> RegistryResult<Option<RegisteredService>>;

    /// Services held in the backend's own in-memory index, if it keeps one.
    ///
    /// Lets the manager pick up incremental index updates without a rescan.
    fn indexed_services(&self) -> Option<Vec<RegisteredService>> {
        None
    }
}

/// What a directory scan does when some records fail to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Reject the scan and keep serving the previous index.
    #[default]
    KeepPrevious,
    /// Accept the valid records and drop the failed ones.
    Partial,
}

/// Next id for a new service: one past the largest id in use.
///
/// Never hands out [`janus_services::INITIAL_IDENTIFIER_VALUE`], which would
/// leave the service looking unsaved.
pub(crate) fn next_id<'a>(ids: impl Iterator<Item = &'a i64>) -> RegistryResult<i64> {
    let max = ids
        .copied()
        .filter(|id| *id != janus_services::INITIAL_IDENTIFIER_VALUE)
        .max();
    match max {
        None => Ok(1),
        Some(max) => max
            .checked_add(1)
            .filter(|id| *id != janus_services::INITIAL_IDENTIFIER_VALUE)
            .ok_or(RegistryError::IdsExhausted),
    }
}

//! Attribute release consent tracking.
//!
//! Note the polarity of [`ConsentStrategy::is_attribute_release_consented`]:
//! `true` means consent is still required, `false` means the principal has
//! already consented and the prompt can be skipped.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use crate::principal::Principal;
use crate::service::RegisteredService;

/// Records which services a principal has authorized to receive attributes.
pub trait ConsentStrategy: Send + Sync {
    /// Returns `true` if consent must still be obtained for this pair.
    fn is_attribute_release_consented(
        &self,
        service: &RegisteredService,
        principal: &Principal,
    ) -> bool;

    /// Record consent for this pair. Idempotent.
    fn set_attribute_release_consented(&self, service: &RegisteredService, principal: &Principal);
}

/// Process-local consent store keyed by principal id and service id.
///
/// Not shared across nodes; multi-node deployments need an external store
/// behind [`ConsentStrategy`].
#[derive(Debug, Default)]
pub struct InMemoryConsentStore {
    records: RwLock<HashMap<String, BTreeSet<i64>>>,
}

impl InMemoryConsentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Service ids the principal has consented to.
    pub fn consented_services(&self, principal_id: &str) -> BTreeSet<i64> {
        self.records
            .read()
            .get(principal_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Withdraw consent for one service. Returns `true` if a record existed.
    pub fn revoke(&self, service_id: i64, principal_id: &str) -> bool {
        let mut records = self.records.write();
        let Some(services) = records.get_mut(principal_id) else {
            return false;
        };
        let removed = services.remove(&service_id);
        if services.is_empty() {
            records.remove(principal_id);
        }
        removed
    }
}

impl ConsentStrategy for InMemoryConsentStore {
    fn is_attribute_release_consented(
        &self,
        service: &RegisteredService,
        principal: &Principal,
    ) -> bool {
        !self
            .records
            .read()
            .get(&principal.id)
            .is_some_and(|services| services.contains(&service.id))
    }

    fn set_attribute_release_consented(&self, service: &RegisteredService, principal: &Principal) {
        let inserted = self
            .records
            .write()
            .entry(principal.id.clone())
            .or_default()
            .insert(service.id);
        if inserted {
            debug!(principal = %principal.id, service_id = service.id, "recorded attribute release consent");
        }
    }
}

//! Principal attribute resolution for release policies.
//!
//! A release policy resolves the principal's current attribute bag before
//! selecting what to disclose. The repository decides whether to reuse the
//! attributes captured at authentication time or to refresh them from an
//! external [`PrincipalAttributeSource`], optionally caching the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::principal::{Attributes, Principal};

/// External attribute store, such as a directory service.
pub trait PrincipalAttributeSource: Send + Sync {
    /// Fetch the current attributes for a principal id.
    ///
    /// `None` means the source has no record for the principal.
    fn attributes_for(&self, principal_id: &str) -> Option<Attributes>;
}

/// Strategy for resolving a principal's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrincipalAttributesRepository {
    /// Use the attributes captured on the principal.
    #[default]
    Default,
    /// Refresh from the source and cache per principal for a fixed duration.
    Caching(CachingAttributesRepository),
}

impl PrincipalAttributesRepository {
    /// Resolve attributes for `principal`.
    pub fn resolve(
        &self,
        principal: &Principal,
        source: Option<&dyn PrincipalAttributeSource>,
    ) -> Attributes {
        match self {
            Self::Default => principal.attributes.clone(),
            Self::Caching(repo) => repo.resolve(principal, source),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedAttributes {
    attributes: Attributes,
    created_at: Instant,
}

impl CachedAttributes {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Caches resolved attributes per principal id.
///
/// Only the expiration is persisted; cached entries live in memory and are
/// shared between clones of the same repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachingAttributesRepository {
    /// How long resolved attributes stay valid, in seconds.
    pub expiration_secs: u64,

    #[serde(skip)]
    cache: Arc<Mutex<HashMap<String, CachedAttributes>>>,
}

impl CachingAttributesRepository {
    /// Create a repository with the given expiration.
    pub fn new(expiration: Duration) -> Self {
        Self {
            expiration_secs: expiration.as_secs(),
            cache: Arc::default(),
        }
    }

    /// The configured expiration.
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }

    /// Resolve attributes, consulting the cache first.
    ///
    /// On a miss the source is queried; when no source is configured, or it
    /// has no record, the principal's own attributes are used.
    pub fn resolve(
        &self,
        principal: &Principal,
        source: Option<&dyn PrincipalAttributeSource>,
    ) -> Attributes {
        let ttl = self.expiration();
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&principal.id) {
                if !entry.is_expired(ttl) {
                    debug!(principal = %principal.id, "using cached principal attributes");
                    return entry.attributes.clone();
                }
            }
        }

        let attributes = source
            .and_then(|s| s.attributes_for(&principal.id))
            .unwrap_or_else(|| principal.attributes.clone());

        let mut cache = self.cache.lock();
        cache.retain(|_, entry| !entry.is_expired(ttl));
        cache.insert(
            principal.id.clone(),
            CachedAttributes {
                attributes: attributes.clone(),
                created_at: Instant::now(),
            },
        );
        attributes
    }

    /// Number of cached principals.
    pub fn cached_principals(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl PartialEq for CachingAttributesRepository {
    fn eq(&self, other: &Self) -> bool {
        self.expiration_secs == other.expiration_secs
    }
}

impl Eq for CachingAttributesRepository {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl PrincipalAttributeSource for CountingSource {
        fn attributes_for(&self, principal_id: &str) -> Option<Attributes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut attrs = Attributes::new();
            attrs.insert("uid".into(), principal_id.into());
            Some(attrs)
        }
    }

    #[test]
    fn test_default_uses_principal_attributes() {
        let principal = Principal::new("casuser").attribute("cn", "Cas User");
        let attrs = PrincipalAttributesRepository::Default.resolve(&principal, None);
        assert_eq!(attrs, principal.attributes);
    }

    #[test]
    fn test_caching_hits_source_once() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
        };
        let repo = CachingAttributesRepository::new(Duration::from_secs(60));
        let principal = Principal::new("casuser");

        let first = repo.resolve(&principal, Some(&source));
        let second = repo.resolve(&principal, Some(&source));

        assert_eq!(first, second);
        assert_eq!(first["uid"].first(), Some("casuser"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.cached_principals(), 1);
    }

    #[test]
    fn test_caching_expired_entry_refreshes() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
        };
        let repo = CachingAttributesRepository::new(Duration::ZERO);
        let principal = Principal::new("casuser");

        repo.resolve(&principal, Some(&source));
        std::thread::sleep(Duration::from_millis(5));
        repo.resolve(&principal, Some(&source));

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_caching_without_source_falls_back() {
        let repo = CachingAttributesRepository::new(Duration::from_secs(60));
        let principal = Principal::new("casuser").attribute("cn", "Cas User");
        let attrs = repo.resolve(&principal, None);
        assert_eq!(attrs, principal.attributes);
    }

    #[test]
    fn test_clones_share_cache() {
        let repo = CachingAttributesRepository::new(Duration::from_secs(60));
        let copy = repo.clone();
        repo.resolve(&Principal::new("a"), None);
        assert_eq!(copy.cached_principals(), 1);
        copy.clear();
        assert_eq!(repo.cached_principals(), 0);
    }

    #[test]
    fn test_serde_tagged() {
        let json = r#"{"type":"caching","expirationSecs":30}"#;
        let repo: PrincipalAttributesRepository = serde_json::from_str(json).unwrap();
        assert_eq!(
            repo,
            PrincipalAttributesRepository::Caching(CachingAttributesRepository::new(
                Duration::from_secs(30)
            ))
        );
    }
}

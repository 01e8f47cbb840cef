//! Directory-backed persistence: one JSON file per service.
//!
//! Each service is stored as `{name}.{extension}` under a root directory.
//! The record carries an explicit `type` discriminator for its service
//! pattern, so Ant and regex services round-trip without sniffing the
//! pattern text.
//!
//! # Write protocol
//!
//! A save writes to a temporary file in the same directory and renames it
//! over the target, so a scan never observes a half-written record.
//! Temporary files carry no service extension and are ignored by scans.
//!
//! # Load protocol
//!
//! A scan parses every matching file. Parse failures are logged per file;
//! what happens next is governed by [`LoadFailurePolicy`]:
//!
//! - [`LoadFailurePolicy::KeepPrevious`] rejects the scan with
//!   [`RegistryError::LoadRejected`] and keeps the previous index.
//! - [`LoadFailurePolicy::Partial`] installs the valid records.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use janus_services::RegisteredService;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dao::{next_id, LoadFailurePolicy, ServiceRegistryDao};
use crate::error::{RegistryError, RegistryResult};

/// Default file extension for service definitions.
pub const DEFAULT_EXTENSION: &str = "json";

/// Result of applying one changed file to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A service id not previously indexed.
    Added(i64),
    /// An indexed service was replaced.
    Replaced {
        /// Service id.
        id: i64,
        /// The id was previously held by a different file.
        collision: bool,
    },
    /// The file matches what is already indexed.
    Unchanged(i64),
}

impl ApplyOutcome {
    /// The affected service id.
    pub const fn id(&self) -> i64 {
        match self {
            Self::Added(id) | Self::Unchanged(id) | Self::Replaced { id, .. } => *id,
        }
    }

    /// Returns `true` if the index changed.
    pub const fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }
}

#[derive(Debug, Default)]
struct DirectoryIndex {
    services: HashMap<i64, RegisteredService>,
    files: HashMap<i64, PathBuf>,
}

impl DirectoryIndex {
    fn id_for_path(&self, path: &Path) -> Option<i64> {
        self.files
            .iter()
            .find(|(_, p)| p.as_path() == path)
            .map(|(id, _)| *id)
    }

    fn insert(&mut self, service: RegisteredService, path: PathBuf) {
        self.files.insert(service.id, path);
        self.services.insert(service.id, service);
    }

    fn remove(&mut self, id: i64) {
        self.files.remove(&id);
        self.services.remove(&id);
    }
}

/// Stores services as JSON files in a directory.
#[derive(Debug)]
pub struct JsonServiceRegistryDao {
    location: PathBuf,
    extension: String,
    policy: LoadFailurePolicy,
    index: RwLock<DirectoryIndex>,
    mutation: Mutex<()>,
}

impl JsonServiceRegistryDao {
    /// Create a backend rooted at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MissingDirectory`] if `location` is not an
    /// existing directory.
    pub fn new(location: impl Into<PathBuf>) -> RegistryResult<Self> {
        let location = location.into();
        if !location.is_dir() {
            return Err(RegistryError::MissingDirectory(location));
        }
        Ok(Self {
            location,
            extension: DEFAULT_EXTENSION.to_string(),
            policy: LoadFailurePolicy::default(),
            index: RwLock::default(),
            mutation: Mutex::new(()),
        })
    }

    /// Set the service file extension (without the dot).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the load failure policy.
    #[must_use]
    pub fn with_load_failure_policy(mut self, policy: LoadFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The root directory.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The service file extension.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The load failure policy.
    pub fn load_failure_policy(&self) -> LoadFailurePolicy {
        self.policy
    }

    /// Returns `true` if `path` names a service definition file.
    pub fn is_service_file(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('.'));
        !hidden && path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }

    /// The file a service is persisted to.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidName`] if the name cannot be a file name.
    pub fn file_path_for(&self, service: &RegisteredService) -> RegistryResult<PathBuf> {
        let name = service.name.trim();
        let invalid = name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(RegistryError::InvalidName(service.name.clone()));
        }
        Ok(self.location.join(format!("{name}.{}", self.extension)))
    }

    /// Parse and validate one definition file.
    pub async fn read_service_file(&self, path: &Path) -> RegistryResult<RegisteredService> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RegistryError::io(path, e))?;
        let service: RegisteredService =
            serde_json::from_str(&content).map_err(|e| RegistryError::parse(path, e))?;
        service.validate()?;
        Ok(service)
    }

    /// Load a single changed file into the index.
    ///
    /// Used for create and modify events. A record without an id keeps the
    /// id previously indexed for the same file, or receives a new one.
    pub async fn apply_file(&self, path: &Path) -> RegistryResult<ApplyOutcome> {
        let _guard = self.mutation.lock().await;
        let mut service = self.read_service_file(path).await?;

        let mut index = self.index.write();
        if service.is_new() {
            service.id = match index.id_for_path(path) {
                Some(id) => id,
                None => next_id(index.services.keys())?,
            };
        }
        let id = service.id;

        let same_file = index.files.get(&id).map(PathBuf::as_path) == Some(path);
        let outcome = match index.services.get(&id) {
            None => ApplyOutcome::Added(id),
            Some(existing) if same_file && *existing == service => ApplyOutcome::Unchanged(id),
            Some(_) => ApplyOutcome::Replaced {
                id,
                collision: !same_file,
            },
        };

        if outcome.is_changed() {
            if let Some(stale) = index.id_for_path(path).filter(|other| *other != id) {
                index.remove(stale);
            }
            index.insert(service, path.to_path_buf());
        }
        Ok(outcome)
    }

    /// Drop whatever the index holds for a file that no longer exists.
    ///
    /// Returns the id that was indexed for `path`, if any.
    pub async fn forget_file(&self, path: &Path) -> Option<i64> {
        let _guard = self.mutation.lock().await;
        let mut index = self.index.write();
        let id = index.id_for_path(path)?;
        index.remove(id);
        Some(id)
    }

    /// A cached service by id, without touching the filesystem.
    pub fn cached_service(&self, id: i64) -> Option<RegisteredService> {
        self.index.read().services.get(&id).cloned()
    }

    /// Number of indexed services.
    pub fn cached_count(&self) -> usize {
        self.index.read().services.len()
    }

    async fn scan(&self) -> RegistryResult<DirectoryIndex> {
        let mut entries = match tokio::fs::read_dir(&self.location).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::MissingDirectory(self.location.clone()))
            }
            Err(e) => return Err(RegistryError::io(&self.location, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RegistryError::io(&self.location, e))?
        {
            let path = entry.path();
            if self.is_service_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut parsed = Vec::with_capacity(paths.len());
        let mut failed = 0usize;
        for path in paths {
            match self.read_service_file(&path).await {
                Ok(service) => parsed.push((service, path)),
                Err(e) => {
                    failed += 1;
                    warn!(path = %path.display(), error = %e, "failed to load service definition");
                }
            }
        }

        if failed > 0 && self.policy == LoadFailurePolicy::KeepPrevious {
            warn!(
                path = %self.location.display(),
                failed,
                "rejecting service directory scan, keeping previous index"
            );
            return Err(RegistryError::LoadRejected { failed });
        }

        let previous = self.index.read();
        let mut index = DirectoryIndex::default();
        let mut unsaved = Vec::new();
        for (service, path) in parsed {
            if service.is_new() {
                unsaved.push((service, path));
                continue;
            }
            if let Some(other) = index.files.get(&service.id) {
                warn!(
                    service_id = service.id,
                    path = %path.display(),
                    other = %other.display(),
                    "duplicate service id, later file wins"
                );
            }
            index.insert(service, path);
        }
        for (mut service, path) in unsaved {
            let reused = previous
                .id_for_path(&path)
                .filter(|id| !index.services.contains_key(id));
            service.id = match reused.map_or_else(|| next_id(index.services.keys()), Ok) {
                Ok(id) => id,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping definition without an id");
                    continue;
                }
            };
            debug!(service_id = service.id, path = %path.display(), "assigned id to definition without one");
            index.insert(service, path);
        }
        drop(previous);

        Ok(index)
    }

    async fn rescan(&self) -> RegistryResult<Vec<RegisteredService>> {
        let index = self.scan().await?;
        let services: Vec<_> = index.services.values().cloned().collect();
        *self.index.write() = index;
        info!(path = %self.location.display(), count = services.len(), "loaded service definitions");
        Ok(services)
    }

    async fn write_atomically(&self, path: &Path, body: Vec<u8>) -> RegistryResult<()> {
        let dir = self.location.clone();
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> RegistryResult<()> {
            let mut file =
                tempfile::NamedTempFile::new_in(&dir).map_err(|e| RegistryError::io(&dir, e))?;
            file.write_all(&body)
                .and_then(|()| file.as_file().sync_all())
                .map_err(|e| RegistryError::io(&target, e))?;
            file.persist(&target)
                .map_err(|e| RegistryError::io(&target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| RegistryError::io(path, std::io::Error::other(e)))?
    }
}

#[async_trait]
impl ServiceRegistryDao for JsonServiceRegistryDao {
    async fn save(&self, mut service: RegisteredService) -> RegistryResult<RegisteredService> {
        service.validate()?;
        let _guard = self.mutation.lock().await;

        if service.is_new() {
            service.id = next_id(self.index.read().services.keys())?;
        }
        let path = self.file_path_for(&service)?;

        let (previous_path, owner) = {
            let index = self.index.read();
            (index.files.get(&service.id).cloned(), index.id_for_path(&path))
        };
        if let Some(owner) = owner.filter(|owner| *owner != service.id) {
            warn!(
                service_id = service.id,
                owner,
                path = %path.display(),
                "service name already persisted by another service"
            );
            return Err(RegistryError::InvalidName(service.name.clone()));
        }

        let body = serde_json::to_vec_pretty(&service).map_err(|e| RegistryError::parse(&path, e))?;
        self.write_atomically(&path, body).await?;

        if let Some(old) = previous_path.filter(|old| *old != path) {
            match tokio::fs::remove_file(&old).await {
                Ok(()) => debug!(path = %old.display(), "removed definition of renamed service"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RegistryError::io(old, e)),
            }
        }

        info!(service_id = service.id, service_name = %service.name, path = %path.display(), "saved service definition");

        if let Err(e) = self.rescan().await {
            warn!(error = %e, "rescan after save failed, indexing saved service only");
            self.index.write().insert(service.clone(), path);
        }
        Ok(service)
    }

    async fn delete(&self, service: &RegisteredService) -> RegistryResult<bool> {
        let _guard = self.mutation.lock().await;

        let indexed = self.index.read().files.get(&service.id).cloned();
        let path = match indexed {
            Some(path) => path,
            None => self.file_path_for(service)?,
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(RegistryError::io(path, e)),
        }
        info!(service_id = service.id, path = %path.display(), "deleted service definition");

        if let Err(e) = self.rescan().await {
            warn!(error = %e, "rescan after delete failed, dropping deleted service only");
            self.index.write().remove(service.id);
        }
        Ok(true)
    }

    async fn load(&self) -> RegistryResult<Vec<RegisteredService>> {
        let _guard = self.mutation.lock().await;
        self.rescan().await
    }

    async fn find_service_by_id(&self, id: i64) -> RegistryResult<Option<RegisteredService>> {
        Ok(self.cached_service(id))
    }

    fn indexed_services(&self) -> Option<Vec<RegisteredService>> {
        Some(self.index.read().services.values().cloned().collect())
    }
}

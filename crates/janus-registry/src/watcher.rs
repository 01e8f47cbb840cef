//! Hot reload of a service definition directory.
//!
//! [`ServiceDirectoryWatcher`] runs as a background task. It observes
//! create, modify and delete events on the directory backing a
//! [`JsonServiceRegistryDao`] and keeps the DAO index and the
//! [`ServicesManager`] snapshot in step with the files on disk.
//!
//! # Event handling
//!
//! Events are coalesced per file over a short debounce window, and each
//! file is acted on once per burst. What happens is decided by the state of
//! the file once the burst settles:
//!
//! | File state | Action |
//! |------------|--------|
//! | created | load the file, warn if its id was already taken, refresh |
//! | modified | load the file, refresh only if the definition changed |
//! | gone | full directory load, refresh |
//!
//! Failures while handling one event are logged and the loop carries on.
//! If the directory itself disappears the task ends with
//! [`RegistryError::WatchDirectoryGone`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use janus_registry::{
//!     JsonServiceRegistryDao, ServiceDirectoryWatcher, ServicesManager, ShutdownSignal,
//! };
//!
//! # async fn example() -> Result<(), janus_registry::RegistryError> {
//! let dao = Arc::new(JsonServiceRegistryDao::new("/etc/janus/services")?);
//! let manager = Arc::new(ServicesManager::new(dao.clone()));
//! manager.reload().await?;
//!
//! let shutdown = ShutdownSignal::new();
//! let task = ServiceDirectoryWatcher::new(dao, manager).spawn(shutdown.clone());
//!
//! shutdown.trigger();
//! let _ = task.await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use janus_telemetry::metrics;
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::dao::ServiceRegistryDao;
use crate::directory::{ApplyOutcome, JsonServiceRegistryDao};
use crate::error::{RegistryError, RegistryResult};
use crate::manager::ServicesManager;
use crate::shutdown::ShutdownSignal;

/// Default window over which events for the same file are coalesced.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

const EVENT_BUFFER: usize = 256;

type EventReceiver = mpsc::Receiver<Result<Event, notify::Error>>;

/// Kind of change to a service definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created.
    Created,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
}

impl FileChangeKind {
    /// Map a raw notification to a change kind.
    ///
    /// Reads and metadata-only access are ignored so that the watcher's own
    /// scans do not feed back into it.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                Some(Self::Modified)
            }
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }

    /// Metric label.
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// Changes collected over one debounce window, keyed by file.
#[derive(Debug, Default)]
struct PendingChanges {
    // path -> whether a create was seen in this burst
    files: BTreeMap<PathBuf, bool>,
}

impl PendingChanges {
    fn record(&mut self, event: &Event, dao: &JsonServiceRegistryDao) {
        let Some(kind) = FileChangeKind::from_event_kind(&event.kind) else {
            return;
        };
        for path in &event.paths {
            // events may carry canonicalized paths; key them under the DAO root
            let Some(name) = path.file_name() else {
                continue;
            };
            let path = dao.location().join(name);
            if !dao.is_service_file(&path) {
                continue;
            }
            let created = self.files.entry(path).or_insert(false);
            *created |= kind == FileChangeKind::Created;
        }
    }

    fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Settle each file to a single change based on what is on disk now.
    fn settle(self) -> Vec<(PathBuf, FileChangeKind)> {
        self.files
            .into_iter()
            .map(|(path, created)| {
                let kind = match (path.is_file(), created) {
                    (true, true) => FileChangeKind::Created,
                    (true, false) => FileChangeKind::Modified,
                    (false, _) => FileChangeKind::Deleted,
                };
                (path, kind)
            })
            .collect()
    }
}

/// Background task keeping the registry in step with a service directory.
#[derive(Debug)]
pub struct ServiceDirectoryWatcher {
    dao: Arc<JsonServiceRegistryDao>,
    manager: Arc<ServicesManager>,
    debounce: Duration,
}

impl ServiceDirectoryWatcher {
    /// Create a watcher for the directory behind `dao`.
    ///
    /// `manager` must be backed by the same DAO.
    pub fn new(dao: Arc<JsonServiceRegistryDao>, manager: Arc<ServicesManager>) -> Self {
        Self {
            dao,
            manager,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Run the watcher on a new task.
    ///
    /// The watch is established on that task; use [`start`](Self::start) to
    /// be sure no change is missed from the moment this returns.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<RegistryResult<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Establish the watch now, then run the event loop on a new task.
    ///
    /// Changes made after this returns are observed, so it can be called
    /// before the initial load.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Watch`] if the watch cannot be established.
    pub fn start(self, shutdown: ShutdownSignal) -> RegistryResult<JoinHandle<RegistryResult<()>>> {
        let (watcher, rx) = self.register()?;
        Ok(tokio::spawn(async move {
            self.event_loop(watcher, rx, shutdown).await
        }))
    }

    /// Watch until shutdown is triggered or the directory disappears.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Watch`] if the watch cannot be established
    /// and [`RegistryError::WatchDirectoryGone`] if the directory is removed.
    pub async fn run(&self, shutdown: ShutdownSignal) -> RegistryResult<()> {
        let (watcher, rx) = self.register()?;
        self.event_loop(watcher, rx, shutdown).await
    }

    fn register(&self) -> RegistryResult<(RecommendedWatcher, EventReceiver)> {
        let location = self.dao.location();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            // only fails once the event loop has stopped
            let _ = tx.blocking_send(res);
        })
        .map_err(|e| RegistryError::Watch(format!("failed to create watcher: {e}")))?;
        watcher
            .watch(location, RecursiveMode::NonRecursive)
            .map_err(|e| RegistryError::Watch(format!("failed to watch {}: {e}", location.display())))?;

        info!(path = %location.display(), debounce_ms = self.debounce.as_millis() as u64, "watching service directory");
        Ok((watcher, rx))
    }

    // `_watcher` keeps the notify registration alive for the loop's lifetime
    async fn event_loop(
        &self,
        _watcher: RecommendedWatcher,
        mut rx: EventReceiver,
        shutdown: ShutdownSignal,
    ) -> RegistryResult<()> {
        let location = self.dao.location().to_path_buf();
        let mut stop = shutdown.recv();
        loop {
            let first = tokio::select! {
                () = &mut stop => {
                    info!(path = %location.display(), "service directory watcher stopped");
                    return Ok(());
                }
                res = rx.recv() => res,
            };
            let Some(first) = first else {
                return Err(RegistryError::Watch("event channel closed".to_string()));
            };

            let mut pending = PendingChanges::default();
            self.collect(first, &mut pending);
            let deadline = Instant::now() + self.debounce;
            while let Ok(Some(res)) = timeout_at(deadline, rx.recv()).await {
                self.collect(res, &mut pending);
            }

            // a vanished directory is fatal; leave the last good snapshot alone
            if !location.is_dir() {
                error!(path = %location.display(), "service directory removed, hot reload stopped");
                return Err(RegistryError::WatchDirectoryGone(location));
            }

            if !pending.is_empty() {
                self.apply(pending).await;
            }
        }
    }

    fn collect(&self, res: Result<Event, notify::Error>, pending: &mut PendingChanges) {
        match res {
            Ok(event) => pending.record(&event, &self.dao),
            Err(e) => warn!(error = %e, "directory watch reported an error"),
        }
    }

    async fn apply(&self, pending: PendingChanges) {
        let mut changed = false;
        let mut deleted = Vec::new();

        for (path, kind) in pending.settle() {
            metrics::record_watcher_event(kind.as_label());
            match kind {
                FileChangeKind::Deleted => deleted.push(path),
                FileChangeKind::Created | FileChangeKind::Modified => {
                    changed |= self.apply_file(&path, kind).await;
                }
            }
        }

        if !deleted.is_empty() {
            changed |= self.apply_deletions(&deleted).await;
        }

        if changed {
            if let Err(e) = self.manager.refresh().await {
                warn!(error = %e, "failed to refresh services after directory change");
            }
        }
    }

    async fn apply_file(&self, path: &Path, kind: FileChangeKind) -> bool {
        match self.dao.apply_file(path).await {
            Ok(ApplyOutcome::Unchanged(id)) => {
                debug!(service_id = id, path = %path.display(), "service definition unchanged");
                false
            }
            Ok(ApplyOutcome::Replaced { id, collision }) if collision || kind == FileChangeKind::Created => {
                warn!(
                    service_id = id,
                    path = %path.display(),
                    "service id already registered, newer definition overwrites it"
                );
                true
            }
            Ok(outcome) => {
                info!(service_id = outcome.id(), path = %path.display(), change = kind.as_label(), "applied service definition");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to apply service definition");
                false
            }
        }
    }

    async fn apply_deletions(&self, deleted: &[PathBuf]) -> bool {
        match self.dao.load().await {
            Ok(services) => {
                info!(count = services.len(), "reloaded service directory after deletion");
                true
            }
            Err(e) => {
                // the rest of the directory is unreadable; still honor the deletions
                warn!(error = %e, "reload after deletion failed, dropping deleted files only");
                let mut changed = false;
                for path in deleted {
                    if let Some(id) = self.dao.forget_file(path).await {
                        info!(service_id = id, path = %path.display(), "removed deleted service definition");
                        changed = true;
                    }
                }
                changed
            }
        }
    }
}

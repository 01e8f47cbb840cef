//! Janus Registry - Concurrent Service Registry and Persistence
//!
//! This crate keeps the set of [`RegisteredService`]s that the identity
//! provider serves lookups from, and keeps it consistent with a store.
//!
//! # Overview
//!
//! - [`ServiceRegistryDao`] - persistence contract, with an in-memory
//!   ([`InMemoryServiceRegistryDao`]) and a JSON directory
//!   ([`JsonServiceRegistryDao`]) backend
//! - [`ServicesManager`] - lock-free lookups over an atomically swapped
//!   [`ServicesSnapshot`]; writes are serialized
//! - [`ServiceDirectoryWatcher`] - hot reload of a service directory
//! - [`ReloadScheduler`] - periodic full reload
//! - [`ShutdownSignal`] - cooperative stop for the background tasks
//!
//! # Architecture
//!
//! ```text
//!        request tasks                      admin / background
//!   find_service_by(url) ──┐          save / delete / reload / refresh
//!                          ▼                          │ (one writer)
//!               ArcSwap<ServicesSnapshot> ◄───────────┤
//!                                                     ▼
//!                                          ServiceRegistryDao
//!                                                     ▲
//!                       ServiceDirectoryWatcher ──────┘ apply_file / load
//! ```
//!
//! [`RegisteredService`]: janus_services::RegisteredService

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dao;
pub mod directory;
pub mod error;
pub mod manager;
pub mod memory;
pub mod scheduler;
pub mod shutdown;
pub mod watcher;

// Re-exports for convenience
pub use dao::{LoadFailurePolicy, ServiceRegistryDao};
pub use directory::{ApplyOutcome, JsonServiceRegistryDao, DEFAULT_EXTENSION};
pub use error::{RegistryError, RegistryResult};
pub use manager::{ServicesManager, ServicesSnapshot};
pub use memory::InMemoryServiceRegistryDao;
pub use scheduler::ReloadScheduler;
pub use shutdown::{ShutdownReceiver, ShutdownSignal};
pub use watcher::{FileChangeKind, ServiceDirectoryWatcher, DEFAULT_DEBOUNCE};

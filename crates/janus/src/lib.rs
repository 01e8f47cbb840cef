//! # Janus
//!
//! **Service registry and attribute release engine for SSO identity providers**
//!
//! Janus decides which applications may use single sign-on and what each of
//! them learns about the user:
//!
//! - **Service Registry** – Services matched by Ant or regex patterns, evaluated in a fixed order
//! - **Access Strategies** – Enabled flags, SSO participation, access windows and required attributes
//! - **Attribute Release** – Allow-lists, renaming, value filters and pseudonymous usernames
//! - **Consent Tracking** – Records which services a principal authorized
//! - **Hot Reload** – Directory watching and periodic reload without blocking lookups
//!
//! ## Quick Start
//!
//! ```no_run
//! use janus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), JanusError> {
//!     let config = ConfigLoader::new()
//!         .with_production()
//!         .with_optional_file("janus.toml")?
//!         .with_env_prefix("JANUS")
//!         .load()?;
//!
//!     let runtime = Runtime::bootstrap(config).await?;
//!
//!     let principal = Principal::new("casuser").attribute("uid", "casuser");
//!     match runtime.evaluate("https://app.example.org/login", &principal, CredentialUse::SsoSession, None) {
//!         Ok(release) => println!("release {:?} as {}", release.attributes, release.username),
//!         Err(refusal) => println!("refused: {}", refusal.code()),
//!     }
//!
//!     runtime.shutdown().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → ServicesManager (lock-free snapshot) → AccessStrategy → ReleasePolicy → Release
//!                  ↑
//!    JsonServiceRegistryDao ← ServiceDirectoryWatcher / ReloadScheduler
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod decision;
mod error;
mod runtime;

// Re-export service model types
pub use janus_services as services;

// Re-export persistence and reload types
pub use janus_registry as registry;

// Re-export configuration types
pub use janus_config as config;

// Re-export logging and metrics
pub use janus_telemetry as telemetry;

pub use decision::{Refusal, Release};
pub use error::{JanusError, JanusResult};
pub use janus_config::{ConfigLoader, JanusConfig};
pub use runtime::Runtime;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use janus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{JanusError, JanusResult, Refusal, Release, Runtime};

    // Re-export configuration
    pub use janus_config::{BackendKind, ConfigLoader, JanusConfig};

    // Re-export the service model
    pub use janus_services::{
        AccessDenied, AccessStrategy, AttributeReleasePolicy, AttributeValue, Attributes,
        ConsentStrategy, CredentialUse, Principal, RegisteredService, ServicePattern,
    };

    // Re-export the registry
    pub use janus_registry::{
        LoadFailurePolicy, ServiceRegistryDao, ServicesManager, ShutdownSignal,
    };
}

//! Janus Services - Registered Service Model and Policies
//!
//! This crate defines the relying-party model of the Janus identity provider
//! and the per-request policies evaluated against it.
//!
//! # Overview
//!
//! For each request the surrounding protocol layer:
//! - finds the [`RegisteredService`] whose [`ServicePattern`] matches the
//!   candidate URL (see `janus-registry`)
//! - asks its [`AccessStrategy`] whether the service may proceed
//! - asks its [`AttributeReleasePolicy`] which attributes to disclose, and
//!   optionally a [`ConsentStrategy`] whether the principal must be prompted
//!
//! # Architecture
//!
//! ```text
//!   candidate URL ──► ServicePattern::matches ──► RegisteredService
//!                                                   │
//!                        ┌──────────────────────────┼───────────────────────┐
//!                        ▼                          ▼                       ▼
//!                 AccessStrategy          AttributeReleasePolicy       ProxyPolicy
//!             (enabled / SSO / attrs)   repository ► strategy ► filter
//! ```
//!
//! Everything here is pure and CPU-only; nothing performs I/O.
//!
//! # Example
//!
//! ```
//! use janus_services::{AccessRequest, AccessStrategy, RegisteredService, ServicePattern};
//! use janus_services::{AccessDenied, Principal};
//!
//! let service = RegisteredService::builder("A", ServicePattern::ant("https://a.test/*")?)
//!     .evaluation_order(10)
//!     .access_strategy(AccessStrategy::new().with_sso_enabled(false))
//!     .build()?;
//!
//! let principal = Principal::new("casuser");
//! assert!(service.matches("https://a.test/login"));
//! assert_eq!(
//!     service.authorize(&AccessRequest::sso(&principal.attributes)),
//!     Err(AccessDenied::SsoDisabled)
//! );
//! assert!(service.authorize(&AccessRequest::fresh(&principal.attributes)).is_ok());
//! # Ok::<(), janus_services::ServiceError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod consent;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod principal;
pub mod proxy;
pub mod release;
pub mod repository;
pub mod service;
pub mod username;

// Re-exports for convenience
pub use access::{AccessDenied, AccessRequest, AccessStrategy, CredentialUse, RequiredAttributes};
pub use consent::{ConsentStrategy, InMemoryConsentStore};
pub use error::{ServiceError, ServiceResult};
pub use filter::{AttributeFilter, RegexAttributeFilter};
pub use matcher::{AntPattern, PatternKind, RegexPattern, ServicePattern};
pub use principal::{AttributeValue, Attributes, Principal};
pub use proxy::{ProxyCallbackPattern, ProxyPolicy};
pub use release::{
    AttributeReleasePolicy, ReleaseStrategy, ReleaseStrategyKind, ReturnAll, ReturnAllowed,
    ReturnMapped,
};
pub use repository::{
    CachingAttributesRepository, PrincipalAttributeSource, PrincipalAttributesRepository,
};
pub use service::{
    sort_by_evaluation_order, LogoutType, RegisteredService, RegisteredServiceBuilder,
    INITIAL_IDENTIFIER_VALUE,
};
pub use username::{PersistentIdGenerator, UsernameProvider};

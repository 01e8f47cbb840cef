//! Username attribute providers.
//!
//! Decide which identifier a service receives for the authenticated principal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::principal::Principal;

const SEPARATOR: &[u8] = b"!";

/// Produces the username released to a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameProvider {
    /// The principal's canonical id.
    Default,
    /// The first value of a principal attribute, falling back to the id.
    PrincipalAttribute {
        /// Attribute name.
        attribute: String,
    },
    /// A pseudonymous identifier stable for one service and principal.
    Anonymous(PersistentIdGenerator),
}

impl UsernameProvider {
    /// Resolve the username for `principal` at the service whose match
    /// pattern is `service_pattern`.
    pub fn resolve_username(&self, principal: &Principal, service_pattern: &str) -> String {
        match self {
            Self::Default => principal.id.clone(),
            Self::PrincipalAttribute { attribute } => principal
                .attributes
                .get(attribute)
                .and_then(|v| v.first())
                .map_or_else(|| principal.id.clone(), str::to_string),
            Self::Anonymous(generator) => generator.generate(&principal.id, service_pattern),
        }
    }
}

/// Generates persistent pseudonymous ids.
///
/// The id is `base64(sha1(service ! principal ! salt))`, so it never changes
/// for a given service and principal but differs across services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentIdGenerator {
    salt: String,
}

impl PersistentIdGenerator {
    /// Create a generator with the given salt.
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Generate the id for a principal at a service.
    pub fn generate(&self, principal_id: &str, service: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(service.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(principal_id.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(self.salt.as_bytes());
        STANDARD.encode(hasher.finalize())
    }
}

//! Per-request outcome of service lookup, authorization and release.

use janus_services::{AccessDenied, Attributes, RegisteredService};
use thiserror::Error;

/// What a matched, authorized service receives for a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// The matched service.
    pub service: RegisteredService,
    /// Username released to the service.
    pub username: String,
    /// Attributes released to the service.
    pub attributes: Attributes,
    /// `true` if the principal must still be asked for consent.
    pub consent_required: bool,
}

/// Why a request was refused.
///
/// Each cause stays distinct so callers can report it precisely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Refusal {
    /// No registered service matches the candidate.
    #[error("no registered service matches the request")]
    UnknownService,

    /// The matched service denied access.
    #[error("service {service_id} denied access: {reason}")]
    Denied {
        /// Matched service id.
        service_id: i64,
        /// Denial kind.
        reason: AccessDenied,
    },
}

impl Refusal {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownService => "UNKNOWN_SERVICE",
            Self::Denied { reason, .. } => reason.code(),
        }
    }
}

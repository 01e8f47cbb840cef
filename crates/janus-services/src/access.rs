//! Service access strategy.
//!
//! The access strategy decides whether a matched service may proceed before
//! any ticket is issued. It evaluates three independent gates, in order:
//!
//! 1. **Enablement**: `enabled`, plus an optional access window.
//! 2. **SSO participation**: `sso_enabled` only restricts reuse of an existing
//!    SSO session; presenting fresh credentials is unaffected.
//! 3. **Principal attributes**: `required_attributes` with ALL/ANY key
//!    aggregation.
//!
//! # Attribute gate semantics
//!
//! With `require_all_attributes = true` every required key must be present on
//! the principal, but only *one* present key needs an intersecting value. This
//! asymmetry is the documented behavior and is preserved exactly:
//!
//! ```text
//! required  = { dept: {eng, ops}, role: {admin} }, require_all = true
//! principal = { dept: eng, role: guest }           → allowed (dept intersects)
//! principal = { dept: finance, role: guest }       → denied
//! principal = { dept: eng }                        → denied (role missing)
//! ```
//!
//! Evaluation is pure and never touches the registry.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::principal::Attributes;

/// Required attribute name mapped to its allowed values.
pub type RequiredAttributes = IndexMap<String, BTreeSet<String>>;

/// Why access to a service was denied.
///
/// Each kind is distinct so callers can report the precise cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    /// The service is administratively disabled.
    #[error("service disabled")]
    ServiceDisabled,

    /// The current time is outside the service's access window.
    #[error("service is outside its access window")]
    OutsideAccessWindow,

    /// The service does not participate in SSO session reuse.
    #[error("SSO participation disabled")]
    SsoDisabled,

    /// The principal lacks the attributes the service requires.
    #[error("principal attributes do not satisfy service requirements")]
    UnsatisfiedAttributes,
}

impl AccessDenied {
    /// Stable machine-readable code for the denial.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ServiceDisabled => "SERVICE_DISABLED",
            Self::OutsideAccessWindow => "SERVICE_ACCESS_WINDOW",
            Self::SsoDisabled => "SSO_DISABLED",
            Self::UnsatisfiedAttributes => "UNSATISFIED_ATTRIBUTES",
        }
    }
}

/// How the caller is authenticating for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialUse {
    /// Credentials were presented with this request.
    #[default]
    Fresh,
    /// An existing SSO session is being reused.
    SsoSession,
}

/// Input for a full access decision.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// The principal's resolved attributes.
    pub attributes: &'a Attributes,
    /// Whether credentials are fresh or an SSO session is reused.
    pub credentials: CredentialUse,
    /// Evaluation instant for access windows.
    pub now: DateTime<Utc>,
}

impl<'a> AccessRequest<'a> {
    /// Request with fresh credentials evaluated now.
    pub fn fresh(attributes: &'a Attributes) -> Self {
        Self {
            attributes,
            credentials: CredentialUse::Fresh,
            now: Utc::now(),
        }
    }

    /// Request reusing an SSO session evaluated now.
    pub fn sso(attributes: &'a Attributes) -> Self {
        Self {
            attributes,
            credentials: CredentialUse::SsoSession,
            now: Utc::now(),
        }
    }

    /// Override the evaluation instant.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Authorization gate attached to a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStrategy {
    /// Global off-switch.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether an existing SSO session may be reused for this service.
    #[serde(default = "default_true")]
    pub sso_enabled: bool,

    /// ALL (`true`) vs ANY (`false`) key-presence aggregation.
    #[serde(default = "default_true")]
    pub require_all_attributes: bool,

    /// Required attribute names and their allowed values.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub required_attributes: RequiredAttributes,

    /// Access is denied before this instant, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_date_time: Option<DateTime<Utc>>,

    /// Access is denied after this instant, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_date_time: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Default for AccessStrategy {
    fn default() -> Self {
        Self {
            enabled: true,
            sso_enabled: true,
            require_all_attributes: true,
            required_attributes: RequiredAttributes::new(),
            starting_date_time: None,
            ending_date_time: None,
        }
    }
}

impl AccessStrategy {
    /// Create a strategy that allows everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the SSO participation flag.
    pub fn with_sso_enabled(mut self, sso_enabled: bool) -> Self {
        self.sso_enabled = sso_enabled;
        self
    }

    /// Set ALL/ANY key aggregation.
    pub fn with_require_all_attributes(mut self, require_all: bool) -> Self {
        self.require_all_attributes = require_all;
        self
    }

    /// Require an attribute to hold one of the given values.
    pub fn require_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict access to a time window. Either bound may be open.
    pub fn with_access_window(
        mut self,
        starting: Option<DateTime<Utc>>,
        ending: Option<DateTime<Utc>>,
    ) -> Self {
        self.starting_date_time = starting;
        self.ending_date_time = ending;
        self
    }

    /// Whether the service may be used at all right now.
    pub fn is_service_access_allowed(&self) -> bool {
        self.is_service_access_allowed_at(Utc::now())
    }

    /// Whether the service may be used at all at `now`.
    pub fn is_service_access_allowed_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.is_within_window(now)
    }

    /// Whether an existing SSO session may be reused.
    pub fn is_service_access_allowed_for_sso(&self) -> bool {
        self.sso_enabled
    }

    /// Evaluate the principal-attribute gate.
    pub fn does_principal_have_attributes_to_access(&self, attributes: &Attributes) -> bool {
        let required = &self.required_attributes;
        if required.is_empty() {
            return true;
        }
        if attributes.is_empty() || attributes.len() < required.len() {
            return false;
        }

        let present: Vec<(&String, &BTreeSet<String>)> = required
            .iter()
            .filter(|(name, _)| attributes.contains_key(name.as_str()))
            .collect();

        if self.require_all_attributes && present.len() < required.len() {
            debug!(
                required = required.len(),
                present = present.len(),
                "principal is missing required attribute keys"
            );
            return false;
        }

        for (name, allowed) in present {
            let Some(value) = attributes.get(name.as_str()) else {
                continue;
            };
            if value.values().iter().any(|v| allowed.contains(v)) {
                debug!(attribute = %name, "principal satisfies required attribute");
                return true;
            }
        }
        false
    }

    /// Run all three gates in order and report the first denial.
    pub fn authorize(&self, request: &AccessRequest<'_>) -> Result<(), AccessDenied> {
        if !self.enabled {
            return Err(AccessDenied::ServiceDisabled);
        }
        if !self.is_within_window(request.now) {
            return Err(AccessDenied::OutsideAccessWindow);
        }
        if request.credentials == CredentialUse::SsoSession && !self.sso_enabled {
            return Err(AccessDenied::SsoDisabled);
        }
        if !self.does_principal_have_attributes_to_access(request.attributes) {
            return Err(AccessDenied::UnsatisfiedAttributes);
        }
        Ok(())
    }

    fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        if self.starting_date_time.is_some_and(|start| now < start) {
            return false;
        }
        if self.ending_date_time.is_some_and(|end| now > end) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::AttributeValue;
    use chrono::Duration;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn dept_role_strategy() -> AccessStrategy {
        AccessStrategy::new()
            .with_require_all_attributes(true)
            .require_attribute("dept", ["eng", "ops"])
            .require_attribute("role", ["admin"])
    }

    #[test]
    fn test_empty_requirements_allow_anyone() {
        let strategy = AccessStrategy::new();
        assert!(strategy.does_principal_have_attributes_to_access(&Attributes::new()));
    }

    #[test]
    fn test_all_keys_present_one_value_match_allows() {
        let principal = attrs(&[("dept", "eng".into()), ("role", "guest".into())]);
        assert!(dept_role_strategy().does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_no_value_intersection_denies() {
        let principal = attrs(&[("dept", "finance".into()), ("role", "guest".into())]);
        assert!(!dept_role_strategy().does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_missing_required_key_denies() {
        let principal = attrs(&[("dept", "eng".into()), ("mail", "a@b.com".into())]);
        assert!(!dept_role_strategy().does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_fewer_attributes_than_requirements_denies() {
        let strategy = dept_role_strategy().with_require_all_attributes(false);
        let principal = attrs(&[("dept", "eng".into())]);
        assert!(!strategy.does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_empty_principal_denied_when_requirements_exist() {
        assert!(!dept_role_strategy().does_principal_have_attributes_to_access(&Attributes::new()));
    }

    #[test]
    fn test_any_mode_tolerates_missing_key() {
        let strategy = dept_role_strategy().with_require_all_attributes(false);
        let principal = attrs(&[("dept", "ops".into()), ("mail", "a@b.com".into())]);
        assert!(strategy.does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_multi_valued_attribute_intersection() {
        let strategy = AccessStrategy::new().require_attribute("groups", ["staff"]);
        let principal = attrs(&[("groups", vec!["students", "staff"].into())]);
        assert!(strategy.does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_value_comparison_is_case_sensitive() {
        let strategy = AccessStrategy::new().require_attribute("dept", ["eng"]);
        let principal = attrs(&[("dept", "ENG".into())]);
        assert!(!strategy.does_principal_have_attributes_to_access(&principal));
    }

    #[test]
    fn test_disabled_service_denied_first() {
        let strategy = AccessStrategy::new().with_enabled(false).with_sso_enabled(false);
        let empty = Attributes::new();
        assert_eq!(
            strategy.authorize(&AccessRequest::sso(&empty)),
            Err(AccessDenied::ServiceDisabled)
        );
        assert!(!strategy.is_service_access_allowed());
    }

    #[test]
    fn test_sso_flag_only_affects_session_reuse() {
        let strategy = AccessStrategy::new().with_sso_enabled(false);
        let empty = Attributes::new();
        assert_eq!(
            strategy.authorize(&AccessRequest::sso(&empty)),
            Err(AccessDenied::SsoDisabled)
        );
        assert_eq!(strategy.authorize(&AccessRequest::fresh(&empty)), Ok(()));
    }

    #[test]
    fn test_attribute_denial_kind() {
        let principal = attrs(&[("dept", "finance".into()), ("role", "guest".into())]);
        assert_eq!(
            dept_role_strategy().authorize(&AccessRequest::fresh(&principal)),
            Err(AccessDenied::UnsatisfiedAttributes)
        );
    }

    #[test]
    fn test_access_window() {
        let now = Utc::now();
        let strategy = AccessStrategy::new()
            .with_access_window(Some(now - Duration::hours(1)), Some(now + Duration::hours(1)));
        assert!(strategy.is_service_access_allowed_at(now));
        assert!(!strategy.is_service_access_allowed_at(now + Duration::hours(2)));

        let empty = Attributes::new();
        assert_eq!(
            strategy.authorize(&AccessRequest::fresh(&empty).at(now - Duration::hours(2))),
            Err(AccessDenied::OutsideAccessWindow)
        );
    }

    #[test]
    fn test_denial_codes_are_distinct() {
        let codes = [
            AccessDenied::ServiceDisabled.code(),
            AccessDenied::OutsideAccessWindow.code(),
            AccessDenied::SsoDisabled.code(),
            AccessDenied::UnsatisfiedAttributes.code(),
        ];
        let unique: BTreeSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_serde_defaults() {
        let strategy: AccessStrategy = serde_json::from_str("{}").unwrap();
        assert_eq!(strategy, AccessStrategy::default());

        let strategy: AccessStrategy = serde_json::from_str(
            r#"{"ssoEnabled": false, "requiredAttributes": {"dept": ["eng"]}}"#,
        )
        .unwrap();
        assert!(!strategy.sso_enabled);
        assert!(strategy.required_attributes["dept"].contains("eng"));
    }
}

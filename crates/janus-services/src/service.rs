//! The registered service model.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::access::{AccessDenied, AccessRequest, AccessStrategy};
use crate::error::{ServiceError, ServiceResult};
use crate::matcher::ServicePattern;
use crate::principal::{Attributes, Principal};
use crate::proxy::ProxyPolicy;
use crate::release::AttributeReleasePolicy;
use crate::repository::PrincipalAttributeSource;
use crate::username::{PersistentIdGenerator, UsernameProvider};

/// Id carried by a service that has never been saved.
pub const INITIAL_IDENTIFIER_VALUE: i64 = i64::MAX;

/// How single logout notifies the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogoutType {
    /// Server-to-server logout request.
    #[default]
    BackChannel,
    /// Browser-mediated logout request.
    FrontChannel,
}

/// A relying party allowed to authenticate through the identity provider.
///
/// Services are values: the registry hands out clones, and updates go through
/// a save of a modified copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredService {
    /// Numeric id, [`INITIAL_IDENTIFIER_VALUE`] until first saved.
    #[serde(default = "default_id")]
    pub id: i64,

    /// Display name, also used to name persisted files.
    pub name: String,

    /// Pattern matched against candidate service URLs.
    pub service_id: ServicePattern,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// UI theme tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Lower values are evaluated first.
    #[serde(default)]
    pub evaluation_order: i32,

    /// Principal attribute released as the username; the principal id when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_attribute: Option<String>,

    /// Release a pseudonymous identifier instead of the principal id.
    #[serde(default)]
    pub anonymous_access: bool,

    /// Authentication handlers that must have succeeded.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required_handlers: BTreeSet<String>,

    /// Single logout notification style.
    #[serde(default)]
    pub logout_type: LogoutType,

    /// Logout notification endpoint, when it differs from the service URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,

    /// Authorization gate.
    #[serde(default)]
    pub access_strategy: AccessStrategy,

    /// Attribute release policy.
    #[serde(default)]
    pub attribute_release_policy: AttributeReleasePolicy,

    /// Proxy authorization.
    #[serde(default)]
    pub proxy_policy: ProxyPolicy,
}

fn default_id() -> i64 {
    INITIAL_IDENTIFIER_VALUE
}

impl RegisteredService {
    /// Start building a service.
    pub fn builder(name: impl Into<String>, service_id: ServicePattern) -> RegisteredServiceBuilder {
        RegisteredServiceBuilder::new(name, service_id)
    }

    /// Check structural validity.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::invalid_service("name must not be blank"));
        }
        if self.username_attribute.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(ServiceError::invalid_service(format!(
                "service '{}' has a blank username attribute",
                self.name
            )));
        }
        Ok(())
    }

    /// Returns `true` if the service has not been assigned an id yet.
    pub fn is_new(&self) -> bool {
        self.id == INITIAL_IDENTIFIER_VALUE
    }

    /// Returns `true` if `candidate` matches this service's pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        self.service_id.matches(candidate)
    }

    /// Returns `true` if the service is enabled.
    pub fn is_enabled(&self) -> bool {
        self.access_strategy.is_service_access_allowed()
    }

    /// Returns `true` if the service participates in SSO session reuse.
    pub fn is_sso_enabled(&self) -> bool {
        self.access_strategy.is_service_access_allowed_for_sso()
    }

    /// Evaluate the access strategy for a request.
    pub fn authorize(&self, request: &AccessRequest<'_>) -> Result<(), AccessDenied> {
        self.access_strategy.authorize(request)
    }

    /// Attributes released to this service for `principal`.
    pub fn release_attributes(
        &self,
        principal: &Principal,
        source: Option<&dyn PrincipalAttributeSource>,
    ) -> Attributes {
        self.attribute_release_policy.get_attributes_from(principal, source)
    }

    /// The username provider implied by this service's settings.
    ///
    /// Anonymous access takes precedence over a configured username attribute.
    pub fn username_provider(&self, anonymous_salt: &str) -> UsernameProvider {
        if self.anonymous_access {
            return UsernameProvider::Anonymous(PersistentIdGenerator::new(anonymous_salt));
        }
        match self.username_attribute.as_deref().map(str::trim) {
            Some(attribute) if !attribute.is_empty() => UsernameProvider::PrincipalAttribute {
                attribute: attribute.to_string(),
            },
            _ => UsernameProvider::Default,
        }
    }

    /// The username released to this service for `principal`.
    pub fn resolve_username(&self, principal: &Principal, anonymous_salt: &str) -> String {
        self.username_provider(anonymous_salt)
            .resolve_username(principal, self.service_id.as_str())
    }

    /// Total evaluation order: order, then case-insensitive name, then
    /// pattern, then id.
    pub fn evaluation_cmp(&self, other: &Self) -> Ordering {
        self.evaluation_order
            .cmp(&other.evaluation_order)
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
            .then_with(|| self.service_id.as_str().cmp(other.service_id.as_str()))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort services into evaluation order.
pub fn sort_by_evaluation_order(services: &mut [RegisteredService]) {
    services.sort_by(RegisteredService::evaluation_cmp);
}

/// Builder for [`RegisteredService`].
#[derive(Debug, Clone)]
pub struct RegisteredServiceBuilder {
    service: RegisteredService,
}

impl RegisteredServiceBuilder {
    /// Create a builder with defaults for everything but name and pattern.
    pub fn new(name: impl Into<String>, service_id: ServicePattern) -> Self {
        Self {
            service: RegisteredService {
                id: INITIAL_IDENTIFIER_VALUE,
                name: name.into(),
                service_id,
                description: None,
                theme: None,
                evaluation_order: 0,
                username_attribute: None,
                anonymous_access: false,
                required_handlers: BTreeSet::new(),
                logout_type: LogoutType::default(),
                logout_url: None,
                access_strategy: AccessStrategy::default(),
                attribute_release_policy: AttributeReleasePolicy::default(),
                proxy_policy: ProxyPolicy::default(),
            },
        }
    }

    /// Set the id.
    pub fn id(mut self, id: i64) -> Self {
        self.service.id = id;
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.service.description = Some(description.into());
        self
    }

    /// Set the theme.
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.service.theme = Some(theme.into());
        self
    }

    /// Set the evaluation order.
    pub fn evaluation_order(mut self, order: i32) -> Self {
        self.service.evaluation_order = order;
        self
    }

    /// Set the username attribute.
    pub fn username_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.service.username_attribute = Some(attribute.into());
        self
    }

    /// Enable pseudonymous usernames.
    pub fn anonymous_access(mut self, anonymous: bool) -> Self {
        self.service.anonymous_access = anonymous;
        self
    }

    /// Add a required authentication handler.
    pub fn required_handler(mut self, handler: impl Into<String>) -> Self {
        self.service.required_handlers.insert(handler.into());
        self
    }

    /// Set the logout type.
    pub fn logout_type(mut self, logout_type: LogoutType) -> Self {
        self.service.logout_type = logout_type;
        self
    }

    /// Set the logout URL.
    pub fn logout_url(mut self, url: impl Into<String>) -> Self {
        self.service.logout_url = Some(url.into());
        self
    }

    /// Set the access strategy.
    pub fn access_strategy(mut self, strategy: AccessStrategy) -> Self {
        self.service.access_strategy = strategy;
        self
    }

    /// Set the attribute release policy.
    pub fn attribute_release_policy(mut self, policy: AttributeReleasePolicy) -> Self {
        self.service.attribute_release_policy = policy;
        self
    }

    /// Set the proxy policy.
    pub fn proxy_policy(mut self, policy: ProxyPolicy) -> Self {
        self.service.proxy_policy = policy;
        self
    }

    /// Validate and build.
    pub fn build(self) -> ServiceResult<RegisteredService> {
        self.service.validate()?;
        Ok(self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ant(p: &str) -> ServicePattern {
        ServicePattern::ant(p).unwrap()
    }

    fn named(name: &str, order: i32, pattern: &str) -> RegisteredService {
        RegisteredService::builder(name, ant(pattern))
            .evaluation_order(order)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let svc = named("App", 0, "https://app.test/**");
        assert!(svc.is_new());
        assert!(svc.is_enabled());
        assert!(svc.is_sso_enabled());
        assert_eq!(svc.logout_type, LogoutType::BackChannel);
        assert_eq!(svc.proxy_policy, ProxyPolicy::Refuse);
    }

    #[test]
    fn test_blank_name_rejected() {
        let result = RegisteredService::builder("  ", ant("https://x.test/*")).build();
        assert!(matches!(result, Err(ServiceError::InvalidService(_))));
    }

    #[test]
    fn test_evaluation_order_ties() {
        let mut services = vec![
            named("beta", 1, "https://b.test/*"),
            named("Alpha", 1, "https://c.test/*"),
            named("zeta", 0, "https://z.test/*"),
            named("alpha", 1, "https://a.test/*"),
        ];
        sort_by_evaluation_order(&mut services);
        let order: Vec<_> = services
            .iter()
            .map(|s| (s.name.as_str(), s.service_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("zeta", "https://z.test/*"),
                ("alpha", "https://a.test/*"),
                ("Alpha", "https://c.test/*"),
                ("beta", "https://b.test/*"),
            ]
        );
    }

    #[test]
    fn test_username_provider_selection() {
        let base = named("app", 0, "https://app.test/**");
        assert_eq!(base.username_provider("s"), UsernameProvider::Default);

        let mut attr = base.clone();
        attr.username_attribute = Some("mail".into());
        assert_eq!(
            attr.username_provider("s"),
            UsernameProvider::PrincipalAttribute {
                attribute: "mail".into()
            }
        );

        attr.anonymous_access = true;
        assert!(matches!(attr.username_provider("s"), UsernameProvider::Anonymous(_)));
    }

    #[test]
    fn test_anonymous_username_differs_per_service() {
        let principal = Principal::new("casuser");
        let a = RegisteredService::builder("a", ant("https://a.test/**"))
            .anonymous_access(true)
            .build()
            .unwrap();
        let b = RegisteredService::builder("b", ant("https://b.test/**"))
            .anonymous_access(true)
            .build()
            .unwrap();

        let ua = a.resolve_username(&principal, "salt");
        assert_eq!(ua, a.resolve_username(&principal, "salt"));
        assert_ne!(ua, b.resolve_username(&principal, "salt"));
        assert_ne!(ua, "casuser");
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let json = r#"{
            "name": "Portal",
            "serviceId": {"type": "regex", "pattern": "^https://portal\\.test/.*$"},
            "evaluationOrder": 5,
            "logoutType": "FRONT_CHANNEL"
        }"#;
        let svc: RegisteredService = serde_json::from_str(json).unwrap();
        assert!(svc.is_new());
        assert_eq!(svc.evaluation_order, 5);
        assert_eq!(svc.logout_type, LogoutType::FrontChannel);
        assert!(svc.matches("https://portal.test/home"));
        assert!(svc.is_enabled());
    }

    #[test]
    fn test_deserialize_rejects_bad_regex() {
        let json = r#"{"name": "Bad", "serviceId": {"type": "regex", "pattern": "("}}"#;
        assert!(serde_json::from_str::<RegisteredService>(json).is_err());
    }

    #[test]
    fn test_json_round_trip_preserves_variant() {
        let svc = RegisteredService::builder("r", ServicePattern::regex_with_case("^https://x\\.test/.*$", true).unwrap())
            .id(7)
            .description("regex service")
            .build()
            .unwrap();
        let json = serde_json::to_string_pretty(&svc).unwrap();
        let back: RegisteredService = serde_json::from_str(&json).unwrap();
        assert_eq!(back, svc);
        assert!(back.matches("HTTPS://X.TEST/A"));
    }
}

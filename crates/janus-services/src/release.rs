//! Attribute release policies.
//!
//! A policy turns the principal's resolved attributes into the set disclosed
//! to a service:
//!
//! 1. resolve the attribute bag through the [`PrincipalAttributesRepository`]
//! 2. select or rename a subset with the terminal [`ReleaseStrategy`]
//! 3. pass the result through the optional [`AttributeFilter`]
//!
//! # Example
//!
//! ```
//! use janus_services::{AttributeReleasePolicy, Principal};
//!
//! let policy = AttributeReleasePolicy::return_allowed(["mail", "cn"]);
//! let principal = Principal::new("casuser")
//!     .attribute("mail", "a@b.com")
//!     .attribute("cn", "A B")
//!     .attribute("phone", "555");
//!
//! let released = policy.get_attributes(&principal);
//! assert_eq!(released.len(), 2);
//! assert!(!released.contains_key("phone"));
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filter::AttributeFilter;
use crate::principal::{Attributes, Principal};
use crate::repository::{PrincipalAttributeSource, PrincipalAttributesRepository};

/// Terminal selection step of a release policy.
pub trait ReleaseStrategy {
    /// Select the attributes to release from the resolved bag.
    fn attributes_internal(&self, resolved: &Attributes) -> Attributes;
}

/// Releases every resolved attribute unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnAll;

impl ReleaseStrategy for ReturnAll {
    fn attributes_internal(&self, resolved: &Attributes) -> Attributes {
        resolved.clone()
    }
}

/// Releases the attributes named in an allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnAllowed {
    /// Attribute names that may be released.
    #[serde(default)]
    pub allowed_attributes: Vec<String>,
}

impl ReleaseStrategy for ReturnAllowed {
    fn attributes_internal(&self, resolved: &Attributes) -> Attributes {
        self.allowed_attributes
            .iter()
            .filter_map(|name| resolved.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}

/// Releases allow-listed attributes under new names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnMapped {
    /// Source attribute name to released name.
    #[serde(default)]
    pub allowed_attributes: IndexMap<String, String>,
}

impl ReleaseStrategy for ReturnMapped {
    fn attributes_internal(&self, resolved: &Attributes) -> Attributes {
        self.allowed_attributes
            .iter()
            .filter_map(|(source, target)| {
                resolved.get(source).map(|v| (target.clone(), v.clone()))
            })
            .collect()
    }
}

/// The closed set of terminal strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReleaseStrategyKind {
    /// See [`ReturnAll`].
    ReturnAll,
    /// See [`ReturnAllowed`].
    ReturnAllowed(ReturnAllowed),
    /// See [`ReturnMapped`].
    ReturnMapped(ReturnMapped),
}

impl Default for ReleaseStrategyKind {
    /// An empty allow-list: nothing is released until configured.
    fn default() -> Self {
        Self::ReturnAllowed(ReturnAllowed::default())
    }
}

impl ReleaseStrategy for ReleaseStrategyKind {
    fn attributes_internal(&self, resolved: &Attributes) -> Attributes {
        match self {
            Self::ReturnAll => ReturnAll.attributes_internal(resolved),
            Self::ReturnAllowed(s) => s.attributes_internal(resolved),
            Self::ReturnMapped(s) => s.attributes_internal(resolved),
        }
    }
}

/// Attribute release policy attached to a registered service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeReleasePolicy {
    /// Terminal selection strategy.
    #[serde(default)]
    pub strategy: ReleaseStrategyKind,

    /// Final post-processing filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_filter: Option<AttributeFilter>,

    /// How the principal's attributes are resolved.
    #[serde(default)]
    pub principal_attributes_repository: PrincipalAttributesRepository,

    /// Whether the credential password may be released.
    #[serde(default)]
    pub authorized_to_release_credential_password: bool,

    /// Whether the proxy-granting ticket may be released.
    #[serde(default)]
    pub authorized_to_release_proxy_granting_ticket: bool,
}

impl AttributeReleasePolicy {
    /// Create a policy with the given strategy.
    pub fn new(strategy: ReleaseStrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Release every attribute.
    pub fn return_all() -> Self {
        Self::new(ReleaseStrategyKind::ReturnAll)
    }

    /// Release the named attributes.
    pub fn return_allowed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ReleaseStrategyKind::ReturnAllowed(ReturnAllowed {
            allowed_attributes: names.into_iter().map(Into::into).collect(),
        }))
    }

    /// Release attributes under new names, given `(source, target)` pairs.
    pub fn return_mapped<I, S, T>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self::new(ReleaseStrategyKind::ReturnMapped(ReturnMapped {
            allowed_attributes: mapping
                .into_iter()
                .map(|(s, t)| (s.into(), t.into()))
                .collect(),
        }))
    }

    /// Set the post-processing filter.
    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.attribute_filter = Some(filter);
        self
    }

    /// Set the attributes repository.
    pub fn with_repository(mut self, repository: PrincipalAttributesRepository) -> Self {
        self.principal_attributes_repository = repository;
        self
    }

    /// Attributes to release for `principal`, using its captured attributes.
    pub fn get_attributes(&self, principal: &Principal) -> Attributes {
        self.get_attributes_from(principal, None)
    }

    /// Attributes to release for `principal`, refreshing from `source` when
    /// the repository consults one.
    pub fn get_attributes_from(
        &self,
        principal: &Principal,
        source: Option<&dyn PrincipalAttributeSource>,
    ) -> Attributes {
        let resolved = self.principal_attributes_repository.resolve(principal, source);
        let selected = self.strategy.attributes_internal(&resolved);
        let released = match &self.attribute_filter {
            Some(filter) => filter.filter(selected),
            None => selected,
        };
        debug!(
            principal = %principal.id,
            resolved = resolved.len(),
            released = released.len(),
            "evaluated attribute release"
        );
        released
    }
}

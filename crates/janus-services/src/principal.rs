//! Authenticated principals and their attribute bags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resolved attributes keyed by attribute name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single attribute value, either scalar or multi-valued.
///
/// Serialized untagged, so `"eng"` and `["eng", "ops"]` both round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A scalar value.
    Single(String),
    /// A multi-valued attribute.
    Multiple(Vec<String>),
}

impl AttributeValue {
    /// Returns the value normalized to its elements.
    ///
    /// A scalar becomes a one-element slice.
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        }
    }

    /// Returns `true` if any element equals `candidate` (case-sensitive).
    pub fn contains(&self, candidate: &str) -> bool {
        self.values().iter().any(|v| v == candidate)
    }

    /// Returns the first element, if any.
    pub fn first(&self) -> Option<&str> {
        self.values().first().map(String::as_str)
    }

    /// Returns `true` if the value carries no elements.
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Canonical principal identifier.
    pub id: String,
    /// Attributes resolved at authentication time.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Principal {
    /// Create a principal with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    /// Create a principal with the given attributes.
    pub fn with_attributes(id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Add one attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

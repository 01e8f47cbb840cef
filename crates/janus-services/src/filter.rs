//! Final post-processing filters for released attributes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::principal::{AttributeValue, Attributes};

/// A filter applied to the output of a release strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeFilter {
    /// Keep only attribute values matching a regular expression.
    Regex(RegexAttributeFilter),
}

impl AttributeFilter {
    /// Apply the filter.
    pub fn filter(&self, attributes: Attributes) -> Attributes {
        match self {
            Self::Regex(f) => f.filter(attributes),
        }
    }
}

/// Keeps attribute values that contain a match for `pattern`.
///
/// Multi-valued attributes keep their matching elements; attributes left with
/// no matching value are dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RegexFilterRecord", into = "RegexFilterRecord")]
pub struct RegexAttributeFilter {
    pattern: Regex,
}

impl RegexAttributeFilter {
    /// Compile a filter.
    pub fn new(pattern: &str) -> ServiceResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| ServiceError::invalid_pattern(pattern, e))?;
        Ok(Self { pattern })
    }

    /// The pattern source.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Apply the filter.
    pub fn filter(&self, attributes: Attributes) -> Attributes {
        attributes
            .into_iter()
            .filter_map(|(name, value)| {
                let kept = match value {
                    AttributeValue::Single(v) => {
                        self.pattern.is_match(&v).then_some(AttributeValue::Single(v))
                    }
                    AttributeValue::Multiple(values) => {
                        let kept: Vec<String> = values
                            .into_iter()
                            .filter(|v| self.pattern.is_match(v))
                            .collect();
                        (!kept.is_empty()).then_some(AttributeValue::Multiple(kept))
                    }
                };
                if kept.is_none() {
                    debug!(attribute = %name, pattern = %self.pattern, "attribute removed by filter");
                }
                kept.map(|v| (name, v))
            })
            .collect()
    }
}

impl PartialEq for RegexAttributeFilter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str()
    }
}

impl Eq for RegexAttributeFilter {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegexFilterRecord {
    pattern: String,
}

impl TryFrom<RegexFilterRecord> for RegexAttributeFilter {
    type Error = ServiceError;

    fn try_from(record: RegexFilterRecord) -> Result<Self, Self::Error> {
        Self::new(&record.pattern)
    }
}

impl From<RegexAttributeFilter> for RegexFilterRecord {
    fn from(filter: RegexAttributeFilter) -> Self {
        Self {
            pattern: filter.pattern.as_str().to_string(),
        }
    }
}

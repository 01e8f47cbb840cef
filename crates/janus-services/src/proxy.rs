//! Proxy authorization policy.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Whether a service may obtain proxy-granting tickets, and for which
/// callback URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyPolicy {
    /// Proxying is not allowed.
    #[default]
    Refuse,
    /// Proxying is allowed for callback URLs matching the pattern.
    RegexMatching(ProxyCallbackPattern),
}

impl ProxyPolicy {
    /// Allow proxying for callbacks matching `pattern`.
    pub fn regex(pattern: &str) -> ServiceResult<Self> {
        ProxyCallbackPattern::new(pattern).map(Self::RegexMatching)
    }

    /// Returns `true` if the service may proxy at all.
    pub fn is_allowed_to_proxy(&self) -> bool {
        matches!(self, Self::RegexMatching(_))
    }

    /// Returns `true` if `callback_url` is an authorized proxy callback.
    pub fn is_allowed_proxy_callback_url(&self, callback_url: &str) -> bool {
        match self {
            Self::Refuse => false,
            Self::RegexMatching(pattern) => pattern.matches(callback_url),
        }
    }
}

/// Full-match callback URL pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CallbackRecord", into = "CallbackRecord")]
pub struct ProxyCallbackPattern {
    source: String,
    compiled: Regex,
}

impl ProxyCallbackPattern {
    /// Compile a callback pattern.
    pub fn new(pattern: &str) -> ServiceResult<Self> {
        let compiled = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| ServiceError::invalid_pattern(pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            compiled,
        })
    }

    /// The pattern source.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn matches(&self, url: &str) -> bool {
        !url.is_empty() && self.compiled.is_match(url)
    }
}

impl PartialEq for ProxyCallbackPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ProxyCallbackPattern {}

#[derive(Serialize, Deserialize)]
struct CallbackRecord {
    pattern: String,
}

impl TryFrom<CallbackRecord> for ProxyCallbackPattern {
    type Error = ServiceError;

    fn try_from(record: CallbackRecord) -> Result<Self, Self::Error> {
        Self::new(&record.pattern)
    }
}

impl From<ProxyCallbackPattern> for CallbackRecord {
    fn from(pattern: ProxyCallbackPattern) -> Self {
        Self {
            pattern: pattern.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuse_by_default() {
        let policy = ProxyPolicy::default();
        assert!(!policy.is_allowed_to_proxy());
        assert!(!policy.is_allowed_proxy_callback_url("https://a.test/cb"));
    }

    #[test]
    fn test_regex_callback() {
        let policy = ProxyPolicy::regex(r"https://a\.test/.*").unwrap();
        assert!(policy.is_allowed_to_proxy());
        assert!(policy.is_allowed_proxy_callback_url("https://a.test/cb"));
        assert!(!policy.is_allowed_proxy_callback_url("https://evil.test/?https://a.test/"));
    }

    #[test]
    fn test_invalid_callback_pattern() {
        assert!(matches!(
            ProxyPolicy::regex("("),
            Err(ServiceError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_serde() {
        let json = r#"{"type":"regex_matching","pattern":"https://a\\.test/.*"}"#;
        let policy: ProxyPolicy = serde_json::from_str(json).unwrap();
        assert!(policy.is_allowed_proxy_callback_url("https://a.test/x"));
        assert_eq!(serde_json::to_string(&policy).unwrap(), json);

        let refuse: ProxyPolicy = serde_json::from_str(r#"{"type":"refuse"}"#).unwrap();
        assert_eq!(refuse, ProxyPolicy::Refuse);
    }
}

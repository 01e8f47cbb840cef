//! Service identifier matching.
//!
//! A registered service claims candidate service URLs through a
//! [`ServicePattern`]. Two variants exist:
//!
//! - [`ServicePattern::Ant`]: Ant-style path globs, case-insensitive.
//!   `?` matches one character within a path segment, `*` any run within a
//!   segment, and `**` any run across segments.
//! - [`ServicePattern::Regex`]: a regular expression that must match the whole
//!   candidate, with an optional case-insensitive flag.
//!
//! Both variants compile to a [`Regex`] once, at construction. An invalid
//! pattern is rejected there with [`ServiceError::InvalidPattern`].
//!
//! The serialized form is tagged by an explicit `type` field:
//!
//! ```json
//! { "type": "regex", "pattern": "^https://example\\.org/.*$", "caseInsensitive": true }
//! ```

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Discriminator naming the matching variant of a service pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Ant-style glob.
    Ant,
    /// Regular expression.
    Regex,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ant => f.write_str("ant"),
            Self::Regex => f.write_str("regex"),
        }
    }
}

/// A compiled service-identifier pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternRecord", into = "PatternRecord")]
pub enum ServicePattern {
    /// Ant-style path glob.
    Ant(AntPattern),
    /// Full-match regular expression.
    Regex(RegexPattern),
}

impl ServicePattern {
    /// Compile an Ant-style pattern.
    pub fn ant(pattern: impl Into<String>) -> ServiceResult<Self> {
        AntPattern::new(pattern).map(Self::Ant)
    }

    /// Compile a case-sensitive regular expression.
    pub fn regex(pattern: impl Into<String>) -> ServiceResult<Self> {
        RegexPattern::new(pattern, false).map(Self::Regex)
    }

    /// Compile a regular expression with an explicit case-sensitivity flag.
    pub fn regex_with_case(
        pattern: impl Into<String>,
        case_insensitive: bool,
    ) -> ServiceResult<Self> {
        RegexPattern::new(pattern, case_insensitive).map(Self::Regex)
    }

    /// Returns `true` if the candidate service identifier is claimed by this pattern.
    ///
    /// An empty candidate never matches.
    pub fn matches(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        match self {
            Self::Ant(p) => p.matches(candidate),
            Self::Regex(p) => p.matches(candidate),
        }
    }

    /// The pattern source as written.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ant(p) => &p.source,
            Self::Regex(p) => &p.source,
        }
    }

    /// The matching variant.
    pub fn kind(&self) -> PatternKind {
        match self {
            Self::Ant(_) => PatternKind::Ant,
            Self::Regex(_) => PatternKind::Regex,
        }
    }
}

impl PartialEq for ServicePattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ant(a), Self::Ant(b)) => a.source == b.source,
            (Self::Regex(a), Self::Regex(b)) => {
                a.source == b.source && a.case_insensitive == b.case_insensitive
            }
            _ => false,
        }
    }
}

impl Eq for ServicePattern {}

impl fmt::Display for ServicePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_str())
    }
}

/// Ant-style glob compiled to an anchored regular expression.
#[derive(Debug, Clone)]
pub struct AntPattern {
    source: String,
    compiled: Regex,
}

impl AntPattern {
    /// Compile an Ant-style pattern. Matching is case-insensitive.
    pub fn new(pattern: impl Into<String>) -> ServiceResult<Self> {
        let source = pattern.into();
        if source.trim().is_empty() {
            return Err(ServiceError::invalid_pattern(source, "pattern must not be blank"));
        }
        let translated = translate_ant(&source.to_lowercase());
        let compiled =
            Regex::new(&translated).map_err(|e| ServiceError::invalid_pattern(&source, e))?;
        Ok(Self { source, compiled })
    }

    /// Returns `true` if the lower-cased candidate matches.
    pub fn matches(&self, candidate: &str) -> bool {
        self.compiled.is_match(&candidate.to_lowercase())
    }

    /// The pattern as written.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Regular expression that must match the entire candidate.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    source: String,
    case_insensitive: bool,
    compiled: Regex,
}

impl RegexPattern {
    /// Compile a regular expression.
    pub fn new(pattern: impl Into<String>, case_insensitive: bool) -> ServiceResult<Self> {
        let source = pattern.into();
        if source.trim().is_empty() {
            return Err(ServiceError::invalid_pattern(source, "pattern must not be blank"));
        }
        let compiled = RegexBuilder::new(&format!("^(?:{source})$"))
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ServiceError::invalid_pattern(&source, e))?;
        Ok(Self {
            source,
            case_insensitive,
            compiled,
        })
    }

    /// Returns `true` if the whole candidate matches.
    pub fn matches(&self, candidate: &str) -> bool {
        self.compiled.is_match(candidate)
    }

    /// The pattern as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether matching ignores case.
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

/// Translate an Ant glob into an anchored regex.
///
/// `/**` at the end also matches the bare prefix, and `/**/` also matches a
/// single `/`, so `https://a.test/**` matches `https://a.test`.
fn translate_ant(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '/' if chars.get(i + 1) == Some(&'*') && chars.get(i + 2) == Some(&'*') => {
                match chars.get(i + 3) {
                    None => {
                        out.push_str("(?:/.*)?");
                        i += 3;
                    }
                    Some('/') => {
                        out.push_str("/(?:.*/)?");
                        i += 4;
                    }
                    Some(_) => {
                        out.push('/');
                        i += 1;
                    }
                }
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                out.push_str(".*");
                i += 2;
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}

/// Serialized shape of a [`ServicePattern`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PatternRecord {
    Ant {
        pattern: String,
    },
    Regex {
        pattern: String,
        #[serde(default, rename = "caseInsensitive")]
        case_insensitive: bool,
    },
}

impl TryFrom<PatternRecord> for ServicePattern {
    type Error = ServiceError;

    fn try_from(record: PatternRecord) -> Result<Self, Self::Error> {
        match record {
            PatternRecord::Ant { pattern } => Self::ant(pattern),
            PatternRecord::Regex {
                pattern,
                case_insensitive,
            } => Self::regex_with_case(pattern, case_insensitive),
        }
    }
}

impl From<ServicePattern> for PatternRecord {
    fn from(pattern: ServicePattern) -> Self {
        match pattern {
            ServicePattern::Ant(p) => Self::Ant { pattern: p.source },
            ServicePattern::Regex(p) => Self::Regex {
                pattern: p.source,
                case_insensitive: p.case_insensitive,
            },
        }
    }
}

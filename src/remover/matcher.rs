//! Predicate evaluation against a precompiled byte pattern.

use std::fmt;

use regex::bytes::Regex;

use crate::error::ConfigError;

/// A compiled match pattern. Matches anywhere in the subject, not only the
/// whole subject.
#[derive(Clone)]
pub struct Matcher {
    regex: Regex,
}

impl Matcher {
    /// Compile `pattern`. A bad pattern is a configuration error.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, subject: &[u8]) -> bool {
        self.regex.is_match(subject)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.as_str()).finish()
    }
}

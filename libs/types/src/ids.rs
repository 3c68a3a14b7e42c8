//! Identifier types for priced instruments
//!
//! Instrument names travel through every line of input and output, so the
//! type refuses the one character that would break the comma-delimited
//! record format.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Instrument identifier (e.g. "INSTRUMENT1")
///
/// Non-empty, no commas, no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentName(String);

impl InstrumentName {
    /// Create a new InstrumentName from a string
    ///
    /// # Panics
    /// Panics if the name is empty, contains a comma, or is not trimmed
    pub fn new(name: impl Into<String>) -> Self {
        let s = name.into();
        assert!(Self::is_valid(&s), "InstrumentName must be non-empty, trimmed and comma-free");
        Self(s)
    }

    /// Try to create an InstrumentName, returning None if invalid
    pub fn try_new(name: impl Into<String>) -> Option<Self> {
        let s = name.into();
        if Self::is_valid(&s) {
            Some(Self(s))
        } else {
            None
        }
    }

    /// Get the name string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        !s.is_empty() && !s.contains(',') && s.trim() == s
    }
}

impl fmt::Display for InstrumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for InstrumentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for InstrumentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

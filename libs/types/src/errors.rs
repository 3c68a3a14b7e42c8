//! Error types for record parsing
//!
//! Parse failures are data, not control flow: the parser wraps them into
//! an invalid outcome together with the raw line.

use thiserror::Error;

/// Why a raw line could not be turned into a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no line to parse")]
    MissingLine,

    #[error("expected 3 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("field '{field}' is empty")]
    EmptyField { field: &'static str },

    #[error("invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    #[error("invalid price '{value}': {reason}")]
    InvalidPrice { value: String, reason: String },
}

/// Why a date field is not a protocol date
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("expected dd-Mon-yyyy")]
    Shape,

    #[error(transparent)]
    Calendar(#[from] chrono::ParseError),
}

impl ParseError {
    /// Short label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::MissingLine => "missing_line",
            ParseError::FieldCount { .. } => "field_count",
            ParseError::EmptyField { .. } => "empty_field",
            ParseError::InvalidDate { .. } => "invalid_date",
            ParseError::InvalidPrice { .. } => "invalid_price",
        }
    }
}

//! Fault-isolating record parser
//!
//! Turns a raw line into either a valid record or the raw line paired with
//! the reason it was rejected. Nothing raised here ever escapes as control
//! flow; malformed input is data routed to the error channel.

use types::errors::ParseError;
use types::ids::InstrumentName;
use types::numeric::parse_decimal;
use types::record::{parse_date, Record};

/// A line that failed to parse, kept verbatim for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLine {
    pub raw: String,
    pub error: ParseError,
}

/// Result of parsing one raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Valid(Record),
    Invalid(InvalidLine),
}

impl ParseOutcome {
    pub fn into_valid(self) -> Option<Record> {
        match self {
            ParseOutcome::Valid(record) => Some(record),
            ParseOutcome::Invalid(_) => None,
        }
    }

    pub fn into_invalid(self) -> Option<InvalidLine> {
        match self {
            ParseOutcome::Valid(_) => None,
            ParseOutcome::Invalid(invalid) => Some(invalid),
        }
    }
}

/// Parse `name, dd-Mon-yyyy, price`, tolerating whitespace around commas.
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    let &[name, date, price] = fields.as_slice() else {
        return Err(ParseError::FieldCount { found: fields.len() });
    };

    let name = InstrumentName::try_new(name).ok_or(ParseError::EmptyField { field: "name" })?;
    if date.is_empty() {
        return Err(ParseError::EmptyField { field: "date" });
    }
    if price.is_empty() {
        return Err(ParseError::EmptyField { field: "price" });
    }

    let date = parse_date(date).map_err(|err| ParseError::InvalidDate {
        value: date.to_string(),
        reason: err.to_string(),
    })?;
    let price = parse_decimal(price).map_err(|err| ParseError::InvalidPrice {
        value: price.to_string(),
        reason: err.to_string(),
    })?;

    Ok(Record::new(name, date, price))
}

/// Parse a possibly absent line into an outcome. Never fails.
pub fn parse_line(line: Option<&str>) -> ParseOutcome {
    let Some(line) = line else {
        return ParseOutcome::Invalid(InvalidLine {
            raw: String::new(),
            error: ParseError::MissingLine,
        });
    };

    match parse_record(line) {
        Ok(record) => ParseOutcome::Valid(record),
        Err(error) => ParseOutcome::Invalid(InvalidLine {
            raw: line.to_string(),
            error,
        }),
    }
}

//! Instrument price observations
//!
//! A record is one `name,dd-Mon-yyyy,price` line of the feed. Identity is
//! the (name, date) pair: two observations of the same instrument on the
//! same day are the same logical record whatever their prices.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DateError;
use crate::ids::InstrumentName;

/// Fixed day-month-year format of the line protocol, e.g. `01-Jan-1997`.
pub const DATE_FORMAT: &str = "%d-%b-%Y";

/// Format a date the way the line protocol writes it.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a date in the line protocol format.
///
/// chrono's `%d`/`%b`/`%Y` accept single-digit days, any month case and
/// signed or short years, so the exact shape is checked first.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateError> {
    if !has_date_shape(value.as_bytes()) {
        return Err(DateError::Shape);
    }
    Ok(NaiveDate::parse_from_str(value, DATE_FORMAT)?)
}

/// `dd-Mon-yyyy`: two digits, capitalised three-letter month, four digits.
fn has_date_shape(b: &[u8]) -> bool {
    let &[d1, d2, b'-', m1, m2, m3, b'-', y1, y2, y3, y4] = b else {
        return false;
    };
    [d1, d2, y1, y2, y3, y4].iter().all(u8::is_ascii_digit)
        && m1.is_ascii_uppercase()
        && m2.is_ascii_lowercase()
        && m3.is_ascii_lowercase()
}

/// A single instrument price observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    name: InstrumentName,
    date: NaiveDate,
    price: Decimal,
}

impl Record {
    pub fn new(name: InstrumentName, date: NaiveDate, price: Decimal) -> Self {
        Self { name, date, price }
    }

    pub fn name(&self) -> &InstrumentName {
        &self.name
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    /// New record with `multiplier × price`, same name and date.
    ///
    /// Returns None if the product overflows the decimal range.
    pub fn multiply(&self, multiplier: Decimal) -> Option<Self> {
        let price = multiplier.checked_mul(self.price)?;
        Some(Self {
            name: self.name.clone(),
            date: self.date,
            price,
        })
    }

    /// Render as a protocol line (without the trailing newline).
    pub fn to_line(&self) -> String {
        format!("{},{},{}", self.name, format_date(self.date), self.price)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.date == other.date
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.date.hash(state);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({},{},{})", self.name, self.date, self.price)
    }
}

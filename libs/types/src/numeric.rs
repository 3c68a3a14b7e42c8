//! Exact decimal helpers for prices and multipliers
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Division runs in a fixed decimal64 context: 16 significant digits,
//! half-even rounding.

use rust_decimal::{Decimal, RoundingStrategy};

/// Significant digits kept by [`divide`].
pub const DIVISION_SIGNIFICANT_DIGITS: u32 = 16;

/// Parse an exact decimal.
///
/// Plain notation is tried first; scientific notation (`1.5E3`) is accepted
/// as a fallback. Inputs that cannot be represented without loss are rejected
/// rather than rounded.
pub fn parse_decimal(value: &str) -> Result<Decimal, rust_decimal::Error> {
    match Decimal::from_str_exact(value) {
        Ok(d) => Ok(d),
        Err(err) if value.contains(|c: char| c == 'e' || c == 'E') => {
            Decimal::from_scientific(value).map_err(|_| err)
        }
        Err(err) => Err(err),
    }
}

/// Divide in the decimal64 context.
///
/// Returns None on division by zero or overflow.
pub fn divide(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    numerator
        .checked_div(denominator)?
        .round_sf_with_strategy(DIVISION_SIGNIFICANT_DIGITS, RoundingStrategy::MidpointNearestEven)
}
